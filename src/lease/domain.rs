//! Lease domain model: server-granted leases and requested secrets.

// self
use crate::{_prelude::*, error::LeaseError};

/// Secret payload snapshot returned by the service.
pub type SecretData = serde_json::Map<String, Json>;

/// Server-granted TTL handle for a secret-fetch response.
///
/// `Lease::none()` is the sentinel for secrets fetched without server-side expiry tracking.
/// A lease can also carry a duration without an identifier, which is how rotating generic
/// secrets announce their refresh cadence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lease {
	lease_id: Option<String>,
	lease_duration: Duration,
	renewable: bool,
}
impl Lease {
	/// Returns the sentinel for responses without any lease.
	pub fn none() -> Self {
		Self::default()
	}

	/// Creates a lease from an identifier, duration, and renewability flag.
	pub fn of(lease_id: impl Into<String>, lease_duration: Duration, renewable: bool) -> Self {
		Self { lease_id: Some(lease_id.into()), lease_duration, renewable }
	}

	/// Creates an identifier-less lease carrying only a duration.
	pub fn from_duration(lease_duration: Duration) -> Self {
		Self { lease_id: None, lease_duration, renewable: false }
	}

	/// Returns the lease identifier, when the server issued one.
	pub fn lease_id(&self) -> Option<&str> {
		self.lease_id.as_deref()
	}

	/// Returns the granted TTL.
	pub fn lease_duration(&self) -> Duration {
		self.lease_duration
	}

	/// Returns `true` if the lease can be renewed by its identifier.
	pub fn is_renewable(&self) -> bool {
		self.renewable && self.lease_id.is_some()
	}

	/// Returns `true` if the server issued a lease identifier.
	pub fn has_lease_id(&self) -> bool {
		self.lease_id.is_some()
	}
}

/// Lifecycle mode requested for a tracked secret path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LeaseMode {
	/// Renew the lease in place before it expires.
	Renew,
	/// Re-fetch the secret once its lease (or announced cadence) elapses.
	Rotate,
}

/// A secret path registered with the lease registry, together with its lifecycle mode.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestedSecret {
	path: String,
	mode: LeaseMode,
}
impl RequestedSecret {
	/// Requests a secret whose lease should be renewed.
	pub fn renewable(path: impl Into<String>) -> Self {
		Self { path: path.into(), mode: LeaseMode::Renew }
	}

	/// Requests a secret that should be rotated by re-fetching.
	pub fn rotating(path: impl Into<String>) -> Self {
		Self { path: path.into(), mode: LeaseMode::Rotate }
	}

	/// Returns the secret path.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Returns the requested lifecycle mode.
	pub fn mode(&self) -> LeaseMode {
		self.mode
	}
}
impl Display for RequestedSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self.mode {
			LeaseMode::Renew => write!(f, "{} (renewable)", self.path),
			LeaseMode::Rotate => write!(f, "{} (rotating)", self.path),
		}
	}
}

/// Wire shape shared by secret reads and lease renewals.
#[derive(Debug, Deserialize)]
pub(crate) struct LeaseResponse {
	#[serde(default)]
	pub lease_id: Option<String>,
	#[serde(default)]
	pub renewable: bool,
	#[serde(default)]
	pub lease_duration: u64,
	#[serde(default)]
	pub data: Option<SecretData>,
}
impl LeaseResponse {
	pub fn parse(body: &Json) -> Result<Self, LeaseError> {
		serde_path_to_error::deserialize(body.clone())
			.map_err(|source| LeaseError::MalformedLease { source })
	}

	pub fn lease(&self) -> Lease {
		let duration = Duration::seconds(self.lease_duration.min(i64::MAX as u64) as i64);

		match &self.lease_id {
			Some(id) => Lease::of(id.clone(), duration, self.renewable),
			None if self.lease_duration > 0 => Lease::from_duration(duration),
			None => Lease::none(),
		}
	}
}
