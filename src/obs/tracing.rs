// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("pglease.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Warns that the secret store could not be read and the broker fell back to
/// the plain-environment client secret. The fallback is a weaker secret
/// handling path, so it must be visible in logs.
pub fn warn_secret_store_fallback(store: &str, error: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(store, error, "falling back to DB_CLIENT_SECRET");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (store, error);
	}
}

/// Warns that retiring a superseded connection pool failed. Retirement errors
/// are logged, never raised; the replacement pool is already serving work.
pub fn warn_pool_retire_failure(error: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(error, "failed to close a retired connection pool");
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn warn_helpers_noop_without_tracing() {
		warn_secret_store_fallback("store", "unreachable");
		warn_pool_retire_failure("already closed");
	}

	#[cfg(feature = "tracing")]
	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
