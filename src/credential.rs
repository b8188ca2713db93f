//! Immutable database credentials and the fetcher seam.

// self
use crate::{
	_prelude::*,
	auth::{REDACTED, TokenSecret},
};

/// Short-lived database password plus the expiry instant the issuing server
/// stated for it.
///
/// Credentials are never mutated: a refresh produces a replacement value and
/// the previous one is discarded. The expiry is stored exactly as returned by
/// the server; safety margins are applied by the consumer, not here.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	/// Opaque password value; callers must avoid logging it.
	pub token: TokenSecret,
	/// Instant after which the server rejects the token.
	pub expires_at: OffsetDateTime,
}
impl Credential {
	/// Creates a credential from a secret and its server-stated expiry.
	pub fn new(token: TokenSecret, expires_at: OffsetDateTime) -> Self {
		Self { token, expires_at }
	}

	/// Returns `true` while the credential remains comfortably usable: the
	/// given safety buffer must still fit between `instant` and the expiry.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, buffer: Duration) -> bool {
		instant < self.expires_at - buffer
	}

	/// Returns `true` once the expiry instant has been reached.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("token", &REDACTED)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Boxed future returned by [`CredentialSource::fetch`].
pub type CredentialFuture<'a> = Pin<Box<dyn Future<Output = Result<Credential>> + 'a + Send>>;

/// Contract for anything able to produce a fresh database credential.
///
/// The HTTP fetcher is the production implementation; tests substitute canned
/// sources. Implementations perform no caching and no retries: every call is
/// one upstream round trip, and policy lives in the token manager.
pub trait CredentialSource
where
	Self: Send + Sync,
{
	/// Obtains a brand-new credential from the upstream issuer.
	fn fetch(&self) -> CredentialFuture<'_>;
}
