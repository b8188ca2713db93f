//! The token manager: single source of truth for the current database
//! password, refreshing proactively and coalescing concurrent refreshes.

// crates.io
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	credential::{Credential, CredentialSource},
	obs::{self, FlowKind},
	settings::Settings,
};

/// Safety margin subtracted from a credential's expiry before it is treated
/// as stale.
///
/// Comfortably larger than expected call latency plus clock skew, so a token
/// handed to a caller is never used at the very edge of expiry.
pub const REFRESH_BUFFER: Duration = Duration::minutes(5);

/// Characters percent-encoded when a value is embedded in a connection URI
/// component; everything outside the RFC 3986 unreserved set.
const URI_COMPONENT: &AsciiSet =
	&NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Caches at most one credential and hands out currently valid tokens,
/// fetching a replacement before the cached one expires.
///
/// The cache slot is the manager's only mutable state. It is replaced whole
/// on refresh and cleared whole on invalidation, never mutated in place, so
/// concurrent readers always observe a complete credential. Concurrent
/// refreshes coalesce on a singleflight guard; fetch failures propagate to
/// callers unchanged and are never retried here.
pub struct TokenManager {
	source: Arc<dyn CredentialSource>,
	settings: Arc<Settings>,
	slot: RwLock<Option<Credential>>,
	refresh_guard: AsyncMutex<()>,
}
impl TokenManager {
	/// Creates a manager over the provided credential source.
	pub fn new(settings: Arc<Settings>, source: Arc<dyn CredentialSource>) -> Self {
		Self {
			source,
			settings,
			slot: RwLock::new(None),
			refresh_guard: AsyncMutex::new(()),
		}
	}

	/// Returns a token valid at the time it is returned.
	///
	/// A cached credential is reused while `now < expires_at -
	/// REFRESH_BUFFER`; otherwise one fetch replaces the slot and concurrent
	/// callers piggy-back on it.
	pub async fn get_token(&self) -> Result<TokenSecret> {
		if let Some(token) = self.cached_fresh(OffsetDateTime::now_utc()) {
			return Ok(token);
		}

		obs::observe(FlowKind::Refresh, "get_token", self.refresh()).await
	}

	/// Composes the full connection URI for the target database, embedding a
	/// currently valid token as the password.
	///
	/// Every component is percent-encoded and encrypted transport is
	/// mandatory. The returned value contains the password, hence the
	/// [`TokenSecret`] wrapper.
	pub async fn connection_string(&self) -> Result<TokenSecret> {
		let token = self.get_token().await?;
		let username = self.settings.connect_username()?;
		let host = self.settings.hostname()?;
		let database = self.settings.database_name()?;
		let uri = format!(
			"postgresql://{}:{}@{}:{}/{}?sslmode=require",
			encode(username),
			encode(token.expose()),
			encode(host),
			self.settings.db_port,
			encode(database),
		);

		Ok(TokenSecret::new(uri))
	}

	/// Unconditionally discards the cached credential. Idempotent.
	pub fn clear_cache(&self) {
		*self.slot.write() = None;
	}

	fn cached_fresh(&self, now: OffsetDateTime) -> Option<TokenSecret> {
		self.slot
			.read()
			.as_ref()
			.filter(|credential| credential.is_fresh_at(now, REFRESH_BUFFER))
			.map(|credential| credential.token.clone())
	}

	async fn refresh(&self) -> Result<TokenSecret> {
		let _singleflight = self.refresh_guard.lock().await;

		// A concurrent caller may have refreshed the slot while this one
		// waited on the guard.
		if let Some(token) = self.cached_fresh(OffsetDateTime::now_utc()) {
			return Ok(token);
		}

		let credential = self.source.fetch().await?;
		let token = credential.token.clone();

		*self.slot.write() = Some(credential);

		Ok(token)
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("settings", &self.settings)
			.field("slot", &self.slot.read())
			.finish()
	}
}

fn encode(value: &str) -> String {
	utf8_percent_encode(value, URI_COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
	// crates.io
	use percent_encoding::percent_decode_str;
	// self
	use super::*;
	use crate::_preludet::{CountingSource, managed_settings};

	fn manager_with_counter() -> (TokenManager, Arc<CountingSource>) {
		let source = Arc::new(CountingSource::default());
		let manager = TokenManager::new(
			Arc::new(managed_settings()),
			source.clone() as Arc<dyn CredentialSource>,
		);

		(manager, source)
	}

	struct SequenceSource {
		credentials: parking_lot::Mutex<Vec<Credential>>,
	}
	impl SequenceSource {
		fn new(credentials: Vec<Credential>) -> Self {
			Self { credentials: parking_lot::Mutex::new(credentials) }
		}
	}
	impl CredentialSource for SequenceSource {
		fn fetch(&self) -> crate::credential::CredentialFuture<'_> {
			let credential = self.credentials.lock().remove(0);

			Box::pin(async move { Ok(credential) })
		}
	}

	#[tokio::test]
	async fn cache_hit_returns_without_fetching_again() {
		let (manager, source) = manager_with_counter();
		let first = manager.get_token().await.expect("First token should be fetched.");
		let second = manager.get_token().await.expect("Second token should be cached.");

		assert_eq!(first.expose(), second.expose());
		assert_eq!(source.calls(), 1);
	}

	#[tokio::test]
	async fn stale_cache_is_replaced_and_never_returned_again() {
		let expired = Credential::new(
			TokenSecret::new("expired"),
			OffsetDateTime::now_utc() - Duration::seconds(1),
		);
		let fresh = Credential::new(
			TokenSecret::new("fresh"),
			OffsetDateTime::now_utc() + Duration::hours(1),
		);
		let manager = TokenManager::new(
			Arc::new(managed_settings()),
			Arc::new(SequenceSource::new(vec![expired, fresh])),
		);
		let first = manager.get_token().await.expect("Seeding fetch should succeed.");

		// The first fetch yields an already-expired credential; the next call
		// must replace it rather than hand it out.
		assert_eq!(first.expose(), "expired");

		let second = manager.get_token().await.expect("Refetch should succeed.");

		assert_eq!(second.expose(), "fresh");

		let third = manager.get_token().await.expect("Cached token should be returned.");

		assert_eq!(third.expose(), "fresh");
	}

	#[tokio::test]
	async fn inside_the_buffer_counts_as_stale() {
		let nearly_expired = Credential::new(
			TokenSecret::new("nearly-expired"),
			OffsetDateTime::now_utc() + Duration::minutes(4),
		);
		let fresh = Credential::new(
			TokenSecret::new("fresh"),
			OffsetDateTime::now_utc() + Duration::hours(1),
		);
		let manager = TokenManager::new(
			Arc::new(managed_settings()),
			Arc::new(SequenceSource::new(vec![nearly_expired, fresh])),
		);

		manager.get_token().await.expect("Seeding fetch should succeed.");

		let refreshed = manager.get_token().await.expect("Proactive refresh should succeed.");

		assert_eq!(refreshed.expose(), "fresh");
	}

	#[tokio::test]
	async fn clear_cache_forces_a_refetch_and_is_idempotent() {
		let (manager, source) = manager_with_counter();

		manager.get_token().await.expect("First token should be fetched.");
		manager.clear_cache();
		manager.clear_cache();
		manager.get_token().await.expect("Post-clear token should be fetched.");

		assert_eq!(source.calls(), 2);
	}

	#[tokio::test]
	async fn concurrent_stale_callers_coalesce_into_one_fetch() {
		let (manager, source) = manager_with_counter();
		let (first, second) = tokio::join!(manager.get_token(), manager.get_token());

		assert_eq!(
			first.expect("First concurrent call should succeed.").expose(),
			second.expect("Second concurrent call should succeed.").expose(),
		);
		assert_eq!(source.calls(), 1);
	}

	#[tokio::test]
	async fn connection_string_round_trips_its_components() {
		let settings = Settings {
			pguser: Some("a@b.com".into()),
			..managed_settings()
		};
		let source = Arc::new(SequenceSource::new(vec![Credential::new(
			TokenSecret::new("t#1/2"),
			OffsetDateTime::now_utc() + Duration::hours(1),
		)]));
		let manager = TokenManager::new(Arc::new(settings), source);
		let uri = manager.connection_string().await.expect("URI composition should succeed.");
		let uri = uri.expose();

		assert!(uri.starts_with("postgresql://a%40b.com:t%231%2F2@"));
		assert!(uri.ends_with("/app?sslmode=require"));

		let userinfo = uri
			.strip_prefix("postgresql://")
			.and_then(|rest| rest.split('@').next())
			.expect("URI should carry a userinfo section.");
		let (user, password) =
			userinfo.split_once(':').expect("Userinfo should carry user and password.");

		assert_eq!(
			percent_decode_str(user).decode_utf8().expect("Username should decode."),
			"a@b.com",
		);
		assert_eq!(
			percent_decode_str(password).decode_utf8().expect("Password should decode."),
			"t#1/2",
		);
	}

	#[test]
	fn debug_never_leaks_the_cached_token() {
		let (manager, _source) = manager_with_counter();

		*manager.slot.write() = Some(Credential::new(
			TokenSecret::new("super-secret"),
			OffsetDateTime::now_utc() + Duration::hours(1),
		));

		let rendered = format!("{manager:?}");

		assert!(!rendered.contains("super-secret"));
	}
}
