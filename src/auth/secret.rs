//! Secret handling for bearer tokens, database passwords, and connection URIs.

// self
use crate::_prelude::*;

/// Placeholder substituted for secret material in every `Debug`/`Display`
/// rendering across the broker.
pub const REDACTED: &str = "<redacted>";

/// Wrapper holding secret material the broker passes around: identity bearer
/// tokens, exchanged database passwords, and composed connection URIs.
///
/// Formatting never reveals the inner value; reading it requires an explicit
/// [`expose`](Self::expose) call at the site that hands it to a transport.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner secret value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&REDACTED).finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(REDACTED)
	}
}
