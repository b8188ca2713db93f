//! The connection pool supervisor: owns the single live pool, builds it with
//! a fresh credential, and recovers from token-expiry-driven authentication
//! failures without crashing the process.

pub mod factory;

pub use factory::*;

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{self, BoxError},
	manager::TokenManager,
	obs::{self, FlowKind},
	schema,
	settings::Settings,
};

/// Boxed future returned by [`PoolFactory::build`].
pub type PoolBuildFuture<'a, P> = Pin<Box<dyn Future<Output = Result<P>> + 'a + Send>>;
/// Boxed future returned by [`PoolFactory::retire`].
pub type PoolRetireFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;

/// Everything a factory needs to construct one pool.
#[derive(Clone, Debug)]
pub struct PoolSpec {
	/// Full connection URI, password included.
	pub uri: TokenSecret,
	/// Schema pinned as the session search path on every new connection.
	pub schema: String,
	/// Pool size ceiling.
	pub max_connections: u32,
	/// Timeout for acquiring a pooled connection.
	pub acquire_timeout: StdDuration,
}

/// Pool construction contract implemented by database backends.
///
/// The supervisor is generic over this seam so recovery behavior can be
/// exercised without a live server.
pub trait PoolFactory
where
	Self: 'static + Send + Sync,
{
	/// Pool handle type produced by this factory. Handles are cheap clones of
	/// one shared pool, as with sqlx's `PgPool`.
	type Pool: Clone + Send + Sync + 'static;

	/// Constructs a pool per the provided spec.
	fn build<'a>(&'a self, spec: &'a PoolSpec) -> PoolBuildFuture<'a, Self::Pool>;

	/// Drains and closes a superseded pool. Failures are logged by the
	/// supervisor, never raised.
	fn retire(&self, pool: Self::Pool) -> PoolRetireFuture;
}

#[derive(Clone)]
struct CurrentPool<P> {
	generation: u64,
	pool: P,
}

/// Owns the live pool and replaces it when the server rejects the password.
///
/// At most one pool is current at any instant, tracked with a generation
/// counter. The current slot is only ever replaced whole, so a reader never
/// observes a half-built pool, and once a newer generation is current no
/// subsequently issued operation reaches the old pool. Recovery runs under a
/// singleflight guard: concurrent authentication failures against the same
/// generation collapse into one rebuild, and the losers reuse the winner's
/// pool.
pub struct PoolSupervisor<F>
where
	F: PoolFactory,
{
	manager: Arc<TokenManager>,
	factory: F,
	settings: Arc<Settings>,
	current: RwLock<Option<CurrentPool<F::Pool>>>,
	rebuild_guard: AsyncMutex<()>,
}
impl<F> PoolSupervisor<F>
where
	F: PoolFactory,
{
	/// Creates a supervisor; the first pool is built on first use.
	pub fn new(settings: Arc<Settings>, manager: Arc<TokenManager>, factory: F) -> Self {
		Self {
			manager,
			factory,
			settings,
			current: RwLock::new(None),
			rebuild_guard: AsyncMutex::new(()),
		}
	}

	/// Returns the current live pool, building it on first use.
	pub async fn pool(&self) -> Result<F::Pool> {
		self.current_or_build().await.map(|current| current.pool)
	}

	/// Runs `operation` against the current pool, recovering exactly once if
	/// the server rejects the password.
	///
	/// Only the invalid-password rejection triggers recovery; every other
	/// failure, and a second failure after the rebuilt pool, propagates
	/// unchanged. There is no unbounded retry loop.
	pub async fn execute_with_retry<T, Op, Fut>(&self, operation: Op) -> Result<T>
	where
		Op: Fn(F::Pool) -> Fut,
		Fut: Future<Output = Result<T, sqlx::Error>> + Send,
	{
		let current = self.current_or_build().await?;

		match operation(current.pool.clone()).await {
			Ok(value) => Ok(value),
			Err(e) if error::is_auth_rejected(&e) => {
				let fresh = obs::observe(
					FlowKind::Rebuild,
					"execute_with_retry",
					self.rebuild_after(current.generation),
				)
				.await?;

				operation(fresh).await.map_err(Error::from)
			},
			Err(e) => Err(e.into()),
		}
	}

	/// Drains and closes the current pool and clears the cached credential.
	/// Safe to call more than once; later calls are no-ops.
	pub async fn close(&self) {
		let _guard = self.rebuild_guard.lock().await;
		let retired = self.current.write().take();

		if let Some(current) = retired {
			let outcome = self.factory.retire(current.pool).await;

			if let Err(e) = outcome {
				obs::warn_pool_retire_failure(&e.to_string());
			}
		}

		self.manager.clear_cache();
	}

	async fn current_or_build(&self) -> Result<CurrentPool<F::Pool>> {
		if let Some(current) = self.current.read().clone() {
			return Ok(current);
		}

		let _guard = self.rebuild_guard.lock().await;

		// Another caller may have initialized the pool while this one waited.
		if let Some(current) = self.current.read().clone() {
			return Ok(current);
		}

		let pool = self.build_pool().await?;
		let current = CurrentPool { generation: 1, pool };

		*self.current.write() = Some(current.clone());

		Ok(current)
	}

	/// Recovery sequence: invalidate the cached credential, build a
	/// replacement pool, designate it current, and retire the old pool in
	/// the background.
	async fn rebuild_after(&self, observed_generation: u64) -> Result<F::Pool> {
		let _guard = self.rebuild_guard.lock().await;
		// A concurrent recovery may already have swapped in a newer pool
		// while this caller waited on the guard; reuse it.
		let newer = self
			.current
			.read()
			.clone()
			.filter(|current| current.generation > observed_generation);

		if let Some(current) = newer {
			return Ok(current.pool);
		}

		self.manager.clear_cache();

		let pool = self.build_pool().await?;
		let retired = {
			let mut slot = self.current.write();
			let old = slot.take();

			*slot =
				Some(CurrentPool { generation: observed_generation + 1, pool: pool.clone() });

			old
		};

		if let Some(old) = retired {
			let retirement = self.factory.retire(old.pool);

			// Teardown must never hold up new work; operations already in
			// flight on the old pool finish or fail on their own.
			tokio::spawn(async move {
				if let Err(e) = retirement.await {
					obs::warn_pool_retire_failure(&e.to_string());
				}
			});
		}

		Ok(pool)
	}

	async fn build_pool(&self) -> Result<F::Pool> {
		let uri = self.manager.connection_string().await?;
		let spec = PoolSpec {
			uri,
			schema: schema::resolve(&self.settings),
			max_connections: self.settings.db_pool_max,
			acquire_timeout: self.settings.acquire_timeout(),
		};

		self.factory.build(&spec).await
	}
}
impl<F> Debug for PoolSupervisor<F>
where
	F: PoolFactory,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let generation = self.current.read().as_ref().map(|current| current.generation);

		f.debug_struct("PoolSupervisor")
			.field("settings", &self.settings)
			.field("generation", &generation)
			.finish()
	}
}
