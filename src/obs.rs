//! Optional observability helpers for lifecycle operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `lease_broker.lifecycle` with the `op`
//!   (lifecycle operation) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `lease_broker_lifecycle_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Lifecycle operations observed by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
	/// Authentication pipeline execution.
	Login,
	/// Lease or session token renewal.
	Renew,
	/// Initial or rotating secret fetch.
	Fetch,
	/// Secret rotation after lease expiry.
	Rotate,
	/// Lease or token revocation.
	Revoke,
}
impl LifecycleKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LifecycleKind::Login => "login",
			LifecycleKind::Renew => "renew",
			LifecycleKind::Fetch => "fetch",
			LifecycleKind::Rotate => "rotate",
			LifecycleKind::Revoke => "revoke",
		}
	}
}
impl Display for LifecycleKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleOutcome {
	/// Entry to a lifecycle operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller or reported as an event.
	Failure,
}
impl LifecycleOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LifecycleOutcome::Attempt => "attempt",
			LifecycleOutcome::Success => "success",
			LifecycleOutcome::Failure => "failure",
		}
	}
}
impl Display for LifecycleOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
