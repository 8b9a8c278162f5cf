//! Recurring-trigger plumbing shared by the lease registry and the session manager.
//!
//! There is no fixed-interval timer anywhere in the broker: each scheduled task computes its
//! own next fire time from the most recent server-granted lease duration and re-submits itself
//! as a fresh one-shot work item after it completes.

// self
use crate::_prelude::*;

/// Renewal timing knobs consumed from external configuration.
///
/// `expiry_threshold` is the safety margin subtracted from a lease duration to decide when to
/// renew or rotate before actual expiry; it must stay smaller than the shortest expected lease
/// duration or renewals never fire meaningfully. `min_renewal` floors the computed delay so
/// short leases cannot hammer the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenewalSettings {
	min_renewal: Duration,
	expiry_threshold: Duration,
}
impl RenewalSettings {
	/// Creates settings after validating both durations are non-negative.
	pub fn new(min_renewal: Duration, expiry_threshold: Duration) -> Result<Self> {
		if min_renewal.is_negative() {
			return Err(Error::illegal_state("minimum renewal interval must not be negative"));
		}
		if expiry_threshold.is_negative() {
			return Err(Error::illegal_state("expiry threshold must not be negative"));
		}

		Ok(Self { min_renewal, expiry_threshold })
	}

	/// Returns the minimum interval between renewals.
	pub fn min_renewal(&self) -> Duration {
		self.min_renewal
	}

	/// Returns the safety margin subtracted from lease durations.
	pub fn expiry_threshold(&self) -> Duration {
		self.expiry_threshold
	}

	/// Computes when an entity with the provided lease duration is due.
	///
	/// A lease already inside its expiry window is reported as [`DueTime::Expired`]; renewing
	/// it would be meaningless. Otherwise the delay is
	/// `max(min_renewal, lease_duration - expiry_threshold)`.
	pub fn due_time(&self, lease_duration: Duration) -> DueTime {
		if lease_duration <= self.expiry_threshold {
			return DueTime::Expired;
		}

		DueTime::In((lease_duration - self.expiry_threshold).max(self.min_renewal))
	}
}
impl Default for RenewalSettings {
	fn default() -> Self {
		Self { min_renewal: Duration::seconds(10), expiry_threshold: Duration::seconds(60) }
	}
}

/// Outcome of the due-time computation for a lease duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DueTime {
	/// The entity should fire after the provided delay.
	In(Duration),
	/// The entity is already within its expiry window.
	Expired,
}

/// Cancellation handle for a single scheduled one-shot task.
///
/// One handle exists per tracked entity at any time; scheduling a replacement swaps the handle
/// under the entity's own lock, and dropping the old handle cancels it. Cancellation is
/// cooperative: a task already past its cancellation check runs to completion, while a task
/// cancelled before firing performs no action when its delay elapses.
pub(crate) struct TaskHandle {
	cancelled: Arc<AtomicBool>,
	handle: tokio::task::JoinHandle<()>,
}
impl TaskHandle {
	/// Spawns `work` to run after `delay`, returning the handle that can cancel it.
	pub fn spawn<Fut>(delay: Duration, work: Fut) -> Self
	where
		Fut: Future<Output = ()> + Send + 'static,
	{
		let cancelled = Arc::new(AtomicBool::new(false));
		let flag = cancelled.clone();
		let handle = tokio::spawn(async move {
			tokio::time::sleep(delay.unsigned_abs()).await;

			if flag.load(Ordering::Acquire) {
				return;
			}

			work.await;
		});

		Self { cancelled, handle }
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::Release);
		self.handle.abort();
	}
}
impl Drop for TaskHandle {
	fn drop(&mut self) {
		// A running task retires its own handle before scheduling a successor, so aborting here
		// would cut it down mid-flight; the flag alone keeps a pending task from firing.
		self.cancelled.store(true, Ordering::Release);
	}
}
impl Debug for TaskHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TaskHandle")
			.field("cancelled", &self.cancelled.load(Ordering::Acquire))
			.finish()
	}
}
