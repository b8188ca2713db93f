//! Authentication mode selection.
//!
//! The mode is resolved once from settings and threaded through the fetcher,
//! instead of re-deriving "is this local dev" at every call site. Local
//! development is recognized by the absence of a secret store: a deployment
//! with a vault configured always authenticates as a confidential client.

// self
use crate::{_prelude::*, settings::Settings};

/// How the broker authenticates against the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
	/// A pre-configured long-lived secret is used directly as the bearer token.
	StaticToken,
	/// A bearer token is acquired from the identity provider.
	Federated {
		/// `true` for the interactively-cached developer identity, `false`
		/// for the confidential-client (service-principal) identity.
		local: bool,
	},
}
impl AuthMode {
	/// Resolves the mode from settings.
	///
	/// A static token is only honored in a local-development context; in a
	/// vaulted deployment a stray `DB_STATIC_TOKEN` is ignored rather than
	/// silently weakening the auth path.
	pub fn resolve(settings: &Settings) -> Self {
		if settings.local_development() && settings.db_static_token.is_some() {
			return Self::StaticToken;
		}

		Self::Federated { local: settings.local_development() }
	}

	/// Returns `true` when this mode represents a developer-machine context.
	pub fn is_local(&self) -> bool {
		matches!(self, Self::StaticToken | Self::Federated { local: true })
	}

	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::StaticToken => "static_token",
			Self::Federated { local: true } => "federated_local",
			Self::Federated { local: false } => "federated_client",
		}
	}
}
impl Display for AuthMode {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
