//! Credential fetching: one identity acquisition plus one workspace exchange
//! per call.
//!
//! The fetcher is stateless. It performs no caching and no retries;
//! every invocation is exactly one bearer-token acquisition (skipped entirely
//! on the static-token path) followed by one credential-exchange call, and
//! both failure kinds propagate to the caller untouched. Refresh policy lives
//! in [`TokenManager`](crate::manager::TokenManager).

pub mod exchange;
pub mod identity;

pub use exchange::*;
pub use identity::*;

// std
#[cfg(feature = "reqwest")] use std::path::PathBuf;
// self
use crate::{_prelude::*, error::ConfigError};
#[cfg(feature = "reqwest")]
use crate::{
	auth::{AuthMode, TokenSecret},
	credential::{Credential, CredentialFuture, CredentialSource},
	obs::{self, FlowKind},
	settings::Settings,
};

/// Appends a slash-separated path to the workspace base URL, preserving any
/// base path the workspace carries.
pub fn workspace_endpoint(workspace: &Url, path: &str) -> Result<Url, ConfigError> {
	let mut url = workspace.clone();

	{
		let mut segments = url.path_segments_mut().map_err(|()| ConfigError::Invalid {
			key: "DB_WORKSPACE_URL",
			message: "cannot be a base URL".into(),
		})?;

		segments.pop_if_empty();

		for segment in path.split('/') {
			segments.push(segment);
		}
	}

	Ok(url)
}

/// Reqwest-backed [`CredentialSource`] implementing both identity paths and
/// the workspace credential exchange.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct HttpCredentialFetcher {
	client: ReqwestClient,
	settings: Arc<Settings>,
	mode: AuthMode,
	secret_mount: PathBuf,
}
#[cfg(feature = "reqwest")]
impl HttpCredentialFetcher {
	/// Creates a fetcher with its own HTTP client, carrying the configured
	/// call timeout. The auth mode is resolved once, here.
	pub fn new(settings: Arc<Settings>) -> Result<Self> {
		let client = ReqwestClient::builder()
			.timeout(settings.http_timeout())
			.build()
			.map_err(ConfigError::http_client_build)?;

		Ok(Self::with_client(client, settings))
	}

	/// Creates a fetcher that reuses a caller-provided HTTP client.
	pub fn with_client(client: ReqwestClient, settings: Arc<Settings>) -> Self {
		let mode = AuthMode::resolve(&settings);

		Self { client, settings, mode, secret_mount: PathBuf::from(identity::SECRET_MOUNT_ROOT) }
	}

	/// Overrides the secret-store mount root.
	pub fn with_secret_mount(mut self, mount: impl Into<PathBuf>) -> Self {
		self.secret_mount = mount.into();

		self
	}

	/// Auth mode this fetcher resolved at construction.
	pub fn mode(&self) -> AuthMode {
		self.mode
	}

	async fn bearer_token(&self) -> Result<TokenSecret> {
		match self.mode {
			AuthMode::StaticToken => {
				let token = self
					.settings
					.db_static_token
					.as_deref()
					.ok_or(ConfigError::Missing { key: "DB_STATIC_TOKEN" })?;

				Ok(TokenSecret::new(token))
			},
			AuthMode::Federated { local: true } => identity::developer_token(
				&self.settings.developer_token_cache(),
				self.settings.db_tenant_id.as_deref(),
				OffsetDateTime::now_utc(),
			)
			.map_err(Error::from),
			AuthMode::Federated { local: false } =>
				identity::confidential_token(&self.client, &self.settings, &self.secret_mount)
					.await,
		}
	}

	async fn fetch_credential(&self) -> Result<Credential> {
		let bearer =
			obs::observe(FlowKind::Identity, "bearer_token", self.bearer_token()).await?;
		let workspace = self.settings.workspace_url()?;
		let instance = self.settings.instance_name()?;

		obs::observe(
			FlowKind::Exchange,
			"request_credential",
			exchange::request_credential(&self.client, workspace, instance, &bearer),
		)
		.await
	}
}
#[cfg(feature = "reqwest")]
impl CredentialSource for HttpCredentialFetcher {
	fn fetch(&self) -> CredentialFuture<'_> {
		Box::pin(self.fetch_credential())
	}
}
