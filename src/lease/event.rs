//! Lease lifecycle events and the synchronous listener broadcast.

// self
use crate::{
	_prelude::*,
	lease::domain::{Lease, RequestedSecret, SecretData},
};

/// Lifecycle event emitted by the lease registry.
///
/// Events fire synchronously from the task performing the transition; listeners that block
/// significantly delay the scheduler.
#[derive(Clone, Debug)]
pub enum LeaseEvent {
	/// Secret data became available, either from the initial fetch or after a rotation.
	Created {
		/// Tracked secret the event belongs to.
		secret: RequestedSecret,
		/// Lease granted by the service.
		lease: Lease,
		/// Fetched data snapshot.
		data: SecretData,
	},
	/// An existing lease was extended in place.
	Renewed {
		/// Tracked secret the event belongs to.
		secret: RequestedSecret,
		/// Lease as granted by the renewal.
		lease: Lease,
	},
	/// A lease ran out or entered its expiry window.
	Expired {
		/// Tracked secret the event belongs to.
		secret: RequestedSecret,
		/// The lease that expired.
		lease: Lease,
	},
	/// A rotating secret finished replacing its data; follows the paired Expired/Created events.
	Rotated {
		/// Tracked secret the event belongs to.
		secret: RequestedSecret,
		/// Lease granted by the rotating fetch.
		lease: Lease,
	},
	/// Fired before a best-effort revocation call.
	BeforeRevocation {
		/// Tracked secret the event belongs to.
		secret: RequestedSecret,
		/// Lease about to be revoked.
		lease: Lease,
	},
	/// Fired after a revocation call, regardless of its outcome.
	AfterRevocation {
		/// Tracked secret the event belongs to.
		secret: RequestedSecret,
		/// Lease the revocation targeted.
		lease: Lease,
	},
	/// A fetch, renewal, or rotation failed; the failure is terminal for that lease.
	Error {
		/// Tracked secret the event belongs to.
		secret: RequestedSecret,
		/// Lease context at failure time; [`Lease::none()`] for initial fetches.
		lease: Lease,
		/// The reported failure.
		error: Arc<Error>,
	},
}
impl LeaseEvent {
	/// Returns the tracked secret the event belongs to.
	pub fn secret(&self) -> &RequestedSecret {
		match self {
			LeaseEvent::Created { secret, .. }
			| LeaseEvent::Renewed { secret, .. }
			| LeaseEvent::Expired { secret, .. }
			| LeaseEvent::Rotated { secret, .. }
			| LeaseEvent::BeforeRevocation { secret, .. }
			| LeaseEvent::AfterRevocation { secret, .. }
			| LeaseEvent::Error { secret, .. } => secret,
		}
	}

	/// Returns the lease context carried by the event.
	pub fn lease(&self) -> &Lease {
		match self {
			LeaseEvent::Created { lease, .. }
			| LeaseEvent::Renewed { lease, .. }
			| LeaseEvent::Expired { lease, .. }
			| LeaseEvent::Rotated { lease, .. }
			| LeaseEvent::BeforeRevocation { lease, .. }
			| LeaseEvent::AfterRevocation { lease, .. }
			| LeaseEvent::Error { lease, .. } => lease,
		}
	}
}

/// Observer of lease lifecycle events.
pub trait LeaseListener: Send + Sync {
	/// Called synchronously for every lifecycle transition.
	fn on_lease_event(&self, event: &LeaseEvent);
}
impl<F> LeaseListener for F
where
	F: Fn(&LeaseEvent) + Send + Sync,
{
	fn on_lease_event(&self, event: &LeaseEvent) {
		self(event)
	}
}
