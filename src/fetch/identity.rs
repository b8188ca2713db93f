//! Bearer-token acquisition for the federated identity paths.
//!
//! Local development uses the workspace CLI's interactively-cached login; a
//! vaulted deployment authenticates as a confidential client with a secret
//! read from a mounted secret store, falling back (with a logged warning) to
//! `DB_CLIENT_SECRET`.

// std
use std::{fs, path::Path};
// crates.io
use time::format_description::well_known::Rfc3339;
// self
use crate::{_prelude::*, auth::TokenSecret, error::IdentityError, obs};
#[cfg(feature = "reqwest")]
use crate::{fetch, settings::Settings};

/// Token endpoint path for the confidential-client (service-principal) login,
/// relative to the workspace base URL.
pub const OIDC_TOKEN_PATH: &str = "oidc/v1/token";
/// Scope requested for workspace API access.
pub const OIDC_SCOPE: &str = "all-apis";
/// Default mount root for secret-store volumes.
pub const SECRET_MOUNT_ROOT: &str = "/var/run/secrets";

/// On-disk shape of the workspace CLI's developer token cache.
#[derive(Clone, Debug, Deserialize)]
pub struct DeveloperTokenCache {
	/// Tenant the login belongs to, when the CLI recorded one.
	pub tenant_id: Option<String>,
	/// Cached bearer token.
	pub access_token: String,
	/// RFC 3339 expiry of the cached login.
	pub expiry: String,
}
impl DeveloperTokenCache {
	fn into_bearer(
		self,
		path: &Path,
		expected_tenant: Option<&str>,
		now: OffsetDateTime,
	) -> Result<TokenSecret, IdentityError> {
		let expiry =
			OffsetDateTime::parse(&self.expiry, &Rfc3339).map_err(|e| {
				IdentityError::CacheUnreadable {
					path: path.to_owned(),
					message: format!("invalid expiry `{}`: {e}", self.expiry),
				}
			})?;

		match (expected_tenant, self.tenant_id.as_deref()) {
			(Some(expected), Some(found)) if expected != found =>
				Err(IdentityError::TenantMismatch {
					expected: expected.to_owned(),
					found: found.to_owned(),
				}),
			_ if now >= expiry => Err(IdentityError::SessionExpired { expired_at: expiry }),
			_ => Ok(TokenSecret::new(self.access_token)),
		}
	}
}

/// Loads the interactively-cached developer login and validates it against
/// the configured tenant and the clock.
pub fn developer_token(
	path: &Path,
	expected_tenant: Option<&str>,
	now: OffsetDateTime,
) -> Result<TokenSecret, IdentityError> {
	if !path.exists() {
		return Err(IdentityError::NoInteractiveSession { path: path.to_owned() });
	}

	let bytes = fs::read(path).map_err(|e| IdentityError::CacheUnreadable {
		path: path.to_owned(),
		message: e.to_string(),
	})?;
	let cache: DeveloperTokenCache = {
		let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(deserializer).map_err(|e| {
			IdentityError::CacheUnreadable { path: path.to_owned(), message: e.to_string() }
		})?
	};

	cache.into_bearer(path, expected_tenant, now)
}

/// Resolves the confidential-client secret: the mounted secret store first,
/// then the plain-environment fallback with a logged warning.
pub fn client_secret(
	store: Option<&str>,
	client_id: &str,
	env_fallback: Option<&str>,
	mount: &Path,
) -> Result<TokenSecret, IdentityError> {
	if let Some(store) = store {
		let path = mount.join(store).join(client_id);

		match fs::read_to_string(&path) {
			Ok(contents) => {
				let trimmed = contents.trim();

				if !trimmed.is_empty() {
					return Ok(TokenSecret::new(trimmed));
				}

				obs::warn_secret_store_fallback(store, "secret file is empty");
			},
			Err(error) => obs::warn_secret_store_fallback(store, &error.to_string()),
		}
	}

	match env_fallback {
		Some(secret) if !secret.is_empty() => Ok(TokenSecret::new(secret)),
		_ => Err(IdentityError::MissingClientSecret { store: store.map(str::to_owned) }),
	}
}

/// Successful token-endpoint response body.
#[derive(Clone, Debug, Deserialize)]
pub struct OidcTokenResponse {
	/// Issued bearer token.
	pub access_token: String,
}

/// Performs the confidential-client login against the workspace token
/// endpoint.
#[cfg(feature = "reqwest")]
pub async fn confidential_token(
	client: &ReqwestClient,
	settings: &Settings,
	mount: &Path,
) -> Result<TokenSecret> {
	let workspace = settings.workspace_url()?;
	let client_id = settings.client_id()?;
	let secret = client_secret(
		settings.secret_store_name.as_deref(),
		client_id,
		settings.db_client_secret.as_deref(),
		mount,
	)?;
	let url = fetch::workspace_endpoint(workspace, OIDC_TOKEN_PATH)?;
	let response = client
		.post(url)
		.basic_auth(client_id, Some(secret.expose()))
		.form(&[("grant_type", "client_credentials"), ("scope", OIDC_SCOPE)])
		.send()
		.await
		.map_err(IdentityError::transport)?;
	let status = response.status();
	let bytes = response.bytes().await.map_err(IdentityError::transport)?;

	if !status.is_success() {
		return Err(IdentityError::TokenEndpoint {
			status: status.as_u16(),
			body: String::from_utf8_lossy(&bytes).into_owned(),
		}
		.into());
	}

	let token: OidcTokenResponse = {
		let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);

		serde_path_to_error::deserialize(deserializer)
			.map_err(|source| IdentityError::TokenResponseParse { source })?
	};

	Ok(TokenSecret::new(token.access_token))
}

#[cfg(test)]
mod tests {
	// std
	use std::io::Write;
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn write_cache(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
		let path = dir.path().join("token-cache.json");
		let mut file = fs::File::create(&path).expect("Cache fixture should be writable.");

		file.write_all(contents.as_bytes()).expect("Cache fixture should be written.");

		path
	}

	#[test]
	fn developer_token_round_trips_a_valid_cache() {
		let dir = tempfile::tempdir().expect("Temp dir should be created.");
		let path = write_cache(
			&dir,
			r#"{"tenant_id":"t-1","access_token":"cached-bearer","expiry":"2030-01-01T00:00:00Z"}"#,
		);
		let token = developer_token(&path, Some("t-1"), macros::datetime!(2025-06-01 00:00 UTC))
			.expect("Valid cache should yield a bearer token.");

		assert_eq!(token.expose(), "cached-bearer");
	}

	#[test]
	fn missing_cache_maps_to_no_interactive_session() {
		let dir = tempfile::tempdir().expect("Temp dir should be created.");
		let path = dir.path().join("absent.json");
		let error = developer_token(&path, None, OffsetDateTime::now_utc())
			.expect_err("A missing cache should be rejected.");

		assert!(matches!(error, IdentityError::NoInteractiveSession { .. }));
	}

	#[test]
	fn expired_cache_is_rejected_with_the_expiry_instant() {
		let dir = tempfile::tempdir().expect("Temp dir should be created.");
		let path = write_cache(
			&dir,
			r#"{"tenant_id":null,"access_token":"old","expiry":"2020-01-01T00:00:00Z"}"#,
		);
		let error = developer_token(&path, None, macros::datetime!(2025-06-01 00:00 UTC))
			.expect_err("An expired cache should be rejected.");

		assert!(matches!(
			error,
			IdentityError::SessionExpired { expired_at } if expired_at == macros::datetime!(2020-01-01 00:00 UTC),
		));
	}

	#[test]
	fn tenant_mismatch_is_rejected() {
		let dir = tempfile::tempdir().expect("Temp dir should be created.");
		let path = write_cache(
			&dir,
			r#"{"tenant_id":"other","access_token":"x","expiry":"2030-01-01T00:00:00Z"}"#,
		);
		let error = developer_token(&path, Some("expected"), OffsetDateTime::now_utc())
			.expect_err("A tenant mismatch should be rejected.");

		assert!(matches!(
			error,
			IdentityError::TenantMismatch { expected, found } if expected == "expected" && found == "other",
		));
	}

	#[test]
	fn malformed_cache_names_the_file() {
		let dir = tempfile::tempdir().expect("Temp dir should be created.");
		let path = write_cache(&dir, "not json");
		let error = developer_token(&path, None, OffsetDateTime::now_utc())
			.expect_err("A malformed cache should be rejected.");

		assert!(matches!(error, IdentityError::CacheUnreadable { .. }));
		assert!(error.to_string().contains("token-cache.json"));
	}

	#[test]
	fn client_secret_prefers_the_mounted_store() {
		let mount = tempfile::tempdir().expect("Temp dir should be created.");
		let store_dir = mount.path().join("prod-vault");

		fs::create_dir_all(&store_dir).expect("Store dir should be created.");
		fs::write(store_dir.join("client-1"), "mounted-secret\n")
			.expect("Secret file should be written.");

		let secret = client_secret(Some("prod-vault"), "client-1", Some("env-secret"), mount.path())
			.expect("Mounted secret should win.");

		assert_eq!(secret.expose(), "mounted-secret");
	}

	#[test]
	fn client_secret_falls_back_to_the_environment() {
		let mount = tempfile::tempdir().expect("Temp dir should be created.");
		let secret = client_secret(Some("prod-vault"), "client-1", Some("env-secret"), mount.path())
			.expect("Environment fallback should apply when the store is unreadable.");

		assert_eq!(secret.expose(), "env-secret");
	}

	#[test]
	fn client_secret_fails_when_no_path_yields_a_value() {
		let mount = tempfile::tempdir().expect("Temp dir should be created.");
		let error = client_secret(Some("prod-vault"), "client-1", None, mount.path())
			.expect_err("Secret resolution should fail with no store and no fallback.");

		assert!(matches!(error, IdentityError::MissingClientSecret { store: Some(s) } if s == "prod-vault"));
	}
}
