// std
use std::sync::atomic::{AtomicU64, Ordering};

// self
use crate::obs::{LifecycleKind, LifecycleOutcome};

/// Records a lifecycle outcome via the global metrics recorder (when enabled).
pub fn record_lifecycle_outcome(kind: LifecycleKind, outcome: LifecycleOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"lease_broker_lifecycle_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Thread-safe counters for renewal attempts, shared by the lease registry and session manager.
#[derive(Debug, Default)]
pub struct RenewalMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
}
impl RenewalMetrics {
	/// Returns the total number of renewal attempts.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of successful renewals.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed renewals.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}
}
