//! Broker-level error types shared across identity, exchange, and pool supervision.

// std
use std::path::PathBuf;
// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used where failures are carried as opaque sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// SQLSTATE the server emits when it rejects the presented password.
///
/// This is the only database error that triggers pool recovery; every other
/// code passes through to the caller untouched.
pub const AUTH_REJECTED_SQLSTATE: &str = "28P01";

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// The identity provider could not issue a bearer token.
	#[error(transparent)]
	Identity(#[from] IdentityError),
	/// The credential-issuing endpoint rejected or mangled the exchange.
	#[error(transparent)]
	Exchange(#[from] ExchangeError),
	/// Database failure surfaced by sqlx, passed through unchanged.
	#[error(transparent)]
	Database(#[from] sqlx::Error),
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required environment key is absent.
	#[error("Required configuration `{key}` is not set.")]
	Missing {
		/// Environment key name.
		key: &'static str,
	},
	/// An environment key is present but unusable.
	#[error("Configuration `{key}` is invalid: {message}.")]
	Invalid {
		/// Environment key name.
		key: &'static str,
		/// Human-readable description of the problem.
		message: String,
	},
	/// Environment extraction failed.
	#[error("Unable to read configuration from the environment.")]
	Extract(#[from] figment::Error),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}

/// Failures to obtain a bearer token from the identity provider.
///
/// Never retried internally; each message names the attempted path and the
/// remediation so an operator can act on it.
#[derive(Debug, ThisError)]
pub enum IdentityError {
	/// No cached developer login exists on disk.
	#[error(
		"No cached developer login was found at {}; sign in with the workspace CLI or set DB_STATIC_TOKEN.",
		path.display()
	)]
	NoInteractiveSession {
		/// Token cache path that was probed.
		path: PathBuf,
	},
	/// The cached developer login has expired.
	#[error("The cached developer login expired at {expired_at}; sign in with the workspace CLI again.")]
	SessionExpired {
		/// Expiry instant recorded in the cache.
		expired_at: OffsetDateTime,
	},
	/// The cached developer login belongs to a different tenant.
	#[error("The cached developer login is for tenant `{found}`, but DB_TENANT_ID is `{expected}`.")]
	TenantMismatch {
		/// Tenant the configuration demands.
		expected: String,
		/// Tenant recorded in the cache.
		found: String,
	},
	/// The token cache file exists but could not be read or parsed.
	#[error("Unable to read the developer token cache at {}: {message}.", path.display())]
	CacheUnreadable {
		/// Token cache path that was probed.
		path: PathBuf,
		/// Human-readable error payload.
		message: String,
	},
	/// Neither the secret store nor the environment yielded a client secret.
	#[error(
		"No client secret is available for the confidential-client login: secret store {store:?} \
		 was unreadable and DB_CLIENT_SECRET is unset."
	)]
	MissingClientSecret {
		/// Secret store name that was attempted, when configured.
		store: Option<String>,
	},
	/// The identity provider's token endpoint returned a non-success status.
	#[error("Identity token endpoint returned {status}: {body}.")]
	TokenEndpoint {
		/// HTTP status code.
		status: u16,
		/// Response body text, for diagnostics.
		body: String,
	},
	/// The identity provider responded with malformed JSON.
	#[error("Identity token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Underlying HTTP transport failure, including timeouts.
	#[error("Network error occurred while calling the identity provider.")]
	Transport {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl IdentityError {
	/// Wraps a transport-specific network error.
	pub fn transport(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Transport { source: Box::new(src) }
	}
}

/// Failures of the credential-exchange call that trades a bearer token for a
/// database password.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// The credential endpoint returned a non-success status.
	#[error("Credential endpoint returned {status}: {body}.")]
	Endpoint {
		/// HTTP status code.
		status: u16,
		/// Response body text, for diagnostics.
		body: String,
	},
	/// The credential endpoint responded with malformed JSON.
	#[error("Credential endpoint returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The response body carried an empty `token` field.
	#[error("Credential endpoint returned an empty token.")]
	MissingToken,
	/// The stated expiration could not be parsed as RFC 3339.
	#[error("Credential endpoint returned an unparseable expiration `{value}`.")]
	InvalidExpiration {
		/// Raw `expiration_time` value from the response.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: time::error::Parse,
	},
	/// Underlying HTTP transport failure, including timeouts.
	#[error("Network error occurred while calling the credential endpoint.")]
	Transport {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl ExchangeError {
	/// Wraps a transport-specific network error.
	pub fn transport(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Transport { source: Box::new(src) }
	}
}

/// Returns `true` when a sqlx error is the server's invalid-password rejection.
///
/// Connectivity failures, timeouts, and query errors all return `false`; they
/// must not trigger pool recovery.
pub fn is_auth_rejected(error: &sqlx::Error) -> bool {
	match error {
		sqlx::Error::Database(db) => db.code().is_some_and(|code| code == AUTH_REJECTED_SQLSTATE),
		_ => false,
	}
}
