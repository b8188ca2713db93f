//! The credential-exchange call: trade a bearer token for a short-lived
//! database password.

// crates.io
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::{REDACTED, TokenSecret},
	credential::Credential,
	error::ExchangeError,
};
#[cfg(feature = "reqwest")] use crate::fetch;

/// Credential-issuing endpoint path, relative to the workspace base URL.
pub const CREDENTIALS_PATH: &str = "api/2.0/database/credentials";

/// Request body for the credential exchange.
#[derive(Clone, Debug, Serialize)]
pub struct ExchangeRequest {
	/// Managed instances the credential must be valid for.
	pub instance_names: Vec<String>,
	/// Fresh idempotency identifier for this exchange.
	pub request_id: String,
}
impl ExchangeRequest {
	/// Builds a request for one instance with a fresh identifier.
	pub fn new(instance: impl Into<String>) -> Self {
		Self { instance_names: vec![instance.into()], request_id: Uuid::new_v4().to_string() }
	}
}

/// Successful credential-exchange response body.
#[derive(Clone, Deserialize)]
pub struct ExchangeResponse {
	/// Issued database password.
	pub token: String,
	/// Server-stated RFC 3339 expiration.
	pub expiration_time: String,
}
impl ExchangeResponse {
	/// Parses a response body, reporting the failing JSON path on mismatch.
	pub fn parse(bytes: &[u8]) -> Result<Self, ExchangeError> {
		let deserializer = &mut serde_json::Deserializer::from_slice(bytes);

		serde_path_to_error::deserialize(deserializer)
			.map_err(|source| ExchangeError::ResponseParse { source })
	}

	/// Validates the body and converts it into a [`Credential`].
	///
	/// The expiry is taken exactly as stated by the server; no local padding
	/// is applied here.
	pub fn into_credential(self) -> Result<Credential, ExchangeError> {
		if self.token.is_empty() {
			return Err(ExchangeError::MissingToken);
		}

		let expires_at = OffsetDateTime::parse(&self.expiration_time, &Rfc3339).map_err(
			|source| ExchangeError::InvalidExpiration { value: self.expiration_time.clone(), source },
		)?;

		Ok(Credential::new(TokenSecret::new(self.token), expires_at))
	}
}
impl Debug for ExchangeResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExchangeResponse")
			.field("token", &REDACTED)
			.field("expiration_time", &self.expiration_time)
			.finish()
	}
}

/// Performs the exchange call against the workspace.
#[cfg(feature = "reqwest")]
pub async fn request_credential(
	client: &ReqwestClient,
	workspace: &Url,
	instance: &str,
	bearer: &TokenSecret,
) -> Result<Credential> {
	let url = fetch::workspace_endpoint(workspace, CREDENTIALS_PATH)?;
	let request = ExchangeRequest::new(instance);
	let response = client
		.post(url)
		.bearer_auth(bearer.expose())
		.json(&request)
		.send()
		.await
		.map_err(ExchangeError::transport)?;
	let status = response.status();
	let bytes = response.bytes().await.map_err(ExchangeError::transport)?;

	if !status.is_success() {
		return Err(ExchangeError::Endpoint {
			status: status.as_u16(),
			body: String::from_utf8_lossy(&bytes).into_owned(),
		}
		.into());
	}

	Ok(ExchangeResponse::parse(&bytes)?.into_credential()?)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn request_ids_are_fresh_per_exchange() {
		let first = ExchangeRequest::new("instance-a");
		let second = ExchangeRequest::new("instance-a");

		assert_eq!(first.instance_names, vec!["instance-a".to_owned()]);
		assert_ne!(first.request_id, second.request_id);
	}

	#[test]
	fn response_parses_and_converts() {
		let body = br#"{"token":"db-password","expiration_time":"2025-06-01T12:00:00Z"}"#;
		let credential = ExchangeResponse::parse(body)
			.expect("Well-formed body should parse.")
			.into_credential()
			.expect("Well-formed body should convert.");

		assert_eq!(credential.token.expose(), "db-password");
		assert_eq!(credential.expires_at, macros::datetime!(2025-06-01 12:00 UTC));
	}

	#[test]
	fn missing_token_field_is_a_parse_error_with_a_path() {
		let body = br#"{"expiration_time":"2025-06-01T12:00:00Z"}"#;
		let error = ExchangeResponse::parse(body).expect_err("A missing field should fail.");

		assert!(matches!(error, ExchangeError::ResponseParse { .. }));
	}

	#[test]
	fn empty_token_is_rejected() {
		let body = br#"{"token":"","expiration_time":"2025-06-01T12:00:00Z"}"#;
		let error = ExchangeResponse::parse(body)
			.expect("Body should parse.")
			.into_credential()
			.expect_err("An empty token should be rejected.");

		assert!(matches!(error, ExchangeError::MissingToken));
	}

	#[test]
	fn unparseable_expiration_is_rejected() {
		let body = br#"{"token":"t","expiration_time":"next tuesday"}"#;
		let error = ExchangeResponse::parse(body)
			.expect("Body should parse.")
			.into_credential()
			.expect_err("A junk expiration should be rejected.");

		assert!(matches!(error, ExchangeError::InvalidExpiration { value, .. } if value == "next tuesday"));
	}

	#[test]
	fn response_debug_redacts_the_token() {
		let response = ExchangeResponse::parse(
			br#"{"token":"db-password","expiration_time":"2025-06-01T12:00:00Z"}"#,
		)
		.expect("Body should parse.");
		let rendered = format!("{response:?}");

		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains("db-password"));
	}
}
