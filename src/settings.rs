//! Environment-driven configuration for the broker.
//!
//! Every recognized key is read once into a [`Settings`] value at process
//! start; nothing in the crate consults the environment afterwards. Required
//! coordinates are validated lazily through accessors that name the missing
//! key, so a misconfigured process fails fast with an actionable message
//! instead of falling back to an insecure mode.

// std
use std::{path::PathBuf, time::Duration as StdDuration};
// crates.io
use figment::{
	Figment,
	providers::Env,
};
// self
use crate::{_prelude::*, auth::REDACTED, error::ConfigError};

/// Environment keys recognized by [`Settings::from_env`].
pub const ENV_KEYS: &[&str] = &[
	"USE_MANAGED_DB",
	"DB_WORKSPACE_URL",
	"DB_TENANT_ID",
	"DB_HOSTNAME",
	"DB_DATABASE_NAME",
	"DB_INSTANCE_NAME",
	"DB_STATIC_TOKEN",
	"PGUSER",
	"DB_CLIENT_ID",
	"DB_CLIENT_SECRET",
	"SECRET_STORE_NAME",
	"PGSCHEMA",
	"DB_SCHEMA",
	"DB_TOKEN_CACHE",
	"DB_PORT",
	"DB_POOL_MAX",
	"DB_ACQUIRE_TIMEOUT_SECS",
	"DB_HTTP_TIMEOUT_SECS",
];

/// Broker configuration captured from the environment.
#[derive(Clone, Deserialize)]
pub struct Settings {
	/// Enables the managed-credential subsystem; when `false` the broker is
	/// inert and callers should use a plain connection string.
	#[serde(default)]
	pub use_managed_db: bool,
	/// Base URL of the identity/credential-issuing workspace.
	#[serde(default)]
	pub db_workspace_url: Option<Url>,
	/// Identity-provider tenant for federated auth.
	#[serde(default)]
	pub db_tenant_id: Option<String>,
	/// Target database hostname.
	#[serde(default)]
	pub db_hostname: Option<String>,
	/// Target database name.
	#[serde(default)]
	pub db_database_name: Option<String>,
	/// Managed instance name passed to the credential exchange.
	#[serde(default)]
	pub db_instance_name: Option<String>,
	/// Local-dev static credential; bypasses federated identity.
	#[serde(default)]
	pub db_static_token: Option<String>,
	/// Developer identity, also used to derive the schema name.
	#[serde(default)]
	pub pguser: Option<String>,
	/// Confidential-client identifier for production federated auth.
	#[serde(default)]
	pub db_client_id: Option<String>,
	/// Plain-environment fallback for the confidential-client secret.
	#[serde(default)]
	pub db_client_secret: Option<String>,
	/// Secret-store location holding the confidential-client secret.
	#[serde(default)]
	pub secret_store_name: Option<String>,
	/// Explicit schema override, highest precedence.
	#[serde(default)]
	pub pgschema: Option<String>,
	/// Managed-service-specific schema override.
	#[serde(default)]
	pub db_schema: Option<String>,
	/// Path of the workspace CLI's developer token cache.
	#[serde(default)]
	pub db_token_cache: Option<PathBuf>,
	/// Target database port.
	#[serde(default = "default_port")]
	pub db_port: u16,
	/// Connection pool size ceiling.
	#[serde(default = "default_pool_max")]
	pub db_pool_max: u32,
	/// Seconds to wait for a pooled connection before giving up.
	#[serde(default = "default_acquire_timeout_secs")]
	pub db_acquire_timeout_secs: u64,
	/// Timeout in seconds applied to identity and exchange HTTP calls.
	#[serde(default = "default_http_timeout_secs")]
	pub db_http_timeout_secs: u64,
}
impl Settings {
	/// Reads all recognized keys from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Figment::new().merge(Env::raw().only(ENV_KEYS)).extract().map_err(ConfigError::from)
	}

	/// Returns `true` when the managed-credential subsystem is enabled.
	pub fn managed(&self) -> bool {
		self.use_managed_db
	}

	/// Returns `true` for a local-development context, recognized by the
	/// absence of a configured secret store.
	pub fn local_development(&self) -> bool {
		self.secret_store_name.is_none()
	}

	/// Workspace base URL, required for any federated or exchange call.
	pub fn workspace_url(&self) -> Result<&Url, ConfigError> {
		self.db_workspace_url.as_ref().ok_or(ConfigError::Missing { key: "DB_WORKSPACE_URL" })
	}

	/// Identity-provider tenant identifier.
	pub fn tenant_id(&self) -> Result<&str, ConfigError> {
		self.db_tenant_id.as_deref().ok_or(ConfigError::Missing { key: "DB_TENANT_ID" })
	}

	/// Target database hostname.
	pub fn hostname(&self) -> Result<&str, ConfigError> {
		self.db_hostname.as_deref().ok_or(ConfigError::Missing { key: "DB_HOSTNAME" })
	}

	/// Target database name.
	pub fn database_name(&self) -> Result<&str, ConfigError> {
		self.db_database_name.as_deref().ok_or(ConfigError::Missing { key: "DB_DATABASE_NAME" })
	}

	/// Managed instance name used by the credential exchange.
	pub fn instance_name(&self) -> Result<&str, ConfigError> {
		self.db_instance_name.as_deref().ok_or(ConfigError::Missing { key: "DB_INSTANCE_NAME" })
	}

	/// Confidential-client identifier.
	pub fn client_id(&self) -> Result<&str, ConfigError> {
		self.db_client_id.as_deref().ok_or(ConfigError::Missing { key: "DB_CLIENT_ID" })
	}

	/// Username embedded in connection strings: the developer identity in
	/// local development, the service/client identifier everywhere else.
	pub fn connect_username(&self) -> Result<&str, ConfigError> {
		match self.pguser.as_deref() {
			Some(user) if self.local_development() => Ok(user),
			_ => self.client_id(),
		}
	}

	/// Path of the developer token cache, defaulting to the workspace CLI's
	/// location under the user's home directory.
	pub fn developer_token_cache(&self) -> PathBuf {
		self.db_token_cache.clone().unwrap_or_else(|| {
			PathBuf::from(std::env::var_os("HOME").unwrap_or_default())
				.join(".config/pglease/token-cache.json")
		})
	}

	/// Timeout applied to every identity and exchange HTTP call.
	pub fn http_timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.db_http_timeout_secs)
	}

	/// Timeout for acquiring a pooled connection.
	pub fn acquire_timeout(&self) -> StdDuration {
		StdDuration::from_secs(self.db_acquire_timeout_secs)
	}
}
impl Debug for Settings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Settings")
			.field("use_managed_db", &self.use_managed_db)
			.field("db_workspace_url", &self.db_workspace_url)
			.field("db_tenant_id", &self.db_tenant_id)
			.field("db_hostname", &self.db_hostname)
			.field("db_database_name", &self.db_database_name)
			.field("db_instance_name", &self.db_instance_name)
			.field("db_static_token", &self.db_static_token.as_ref().map(|_| REDACTED))
			.field("pguser", &self.pguser)
			.field("db_client_id", &self.db_client_id)
			.field("db_client_secret", &self.db_client_secret.as_ref().map(|_| REDACTED))
			.field("secret_store_name", &self.secret_store_name)
			.field("pgschema", &self.pgschema)
			.field("db_schema", &self.db_schema)
			.field("db_token_cache", &self.db_token_cache)
			.field("db_port", &self.db_port)
			.field("db_pool_max", &self.db_pool_max)
			.field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
			.field("db_http_timeout_secs", &self.db_http_timeout_secs)
			.finish()
	}
}
impl Default for Settings {
	fn default() -> Self {
		Self {
			use_managed_db: false,
			db_workspace_url: None,
			db_tenant_id: None,
			db_hostname: None,
			db_database_name: None,
			db_instance_name: None,
			db_static_token: None,
			pguser: None,
			db_client_id: None,
			db_client_secret: None,
			secret_store_name: None,
			pgschema: None,
			db_schema: None,
			db_token_cache: None,
			db_port: default_port(),
			db_pool_max: default_pool_max(),
			db_acquire_timeout_secs: default_acquire_timeout_secs(),
			db_http_timeout_secs: default_http_timeout_secs(),
		}
	}
}

/// Serde default for [`Settings::db_port`].
fn default_port() -> u16 {
	5432
}

/// Serde default for [`Settings::db_pool_max`].
fn default_pool_max() -> u32 {
	10
}

/// Serde default for [`Settings::db_acquire_timeout_secs`].
fn default_acquire_timeout_secs() -> u64 {
	5
}

/// Serde default for [`Settings::db_http_timeout_secs`].
fn default_http_timeout_secs() -> u64 {
	30
}
