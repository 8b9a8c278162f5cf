// self
use crate::{_prelude::*, obs::LifecycleKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedLifecycle<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedLifecycle<F> = F;

/// A span builder used by lifecycle operations.
#[derive(Clone, Debug)]
pub struct LifecycleSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl LifecycleSpan {
	/// Creates a new span tagged with the provided lifecycle kind + stage.
	pub fn new(kind: LifecycleKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("lease_broker.lifecycle", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedLifecycle<Fut>
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

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_passes_the_future_through() {
		let span = LifecycleSpan::new(LifecycleKind::Renew, "instrument_passes_the_future_through");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
