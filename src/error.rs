//! Broker-level error types shared across the pipeline, lease registry, and session manager.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// A named authentication step failed.
	#[error(transparent)]
	Pipeline(#[from] PipelineError),
	/// Transport failure (DNS, TCP, TLS, I/O).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// A lease fetch/renew/rotate/revoke call failed.
	#[error(transparent)]
	Lease(#[from] LeaseError),

	/// Caller misuse, e.g. reading secret data that was never fetched.
	#[error("Illegal state: {reason}.")]
	IllegalState {
		/// Description of the misuse.
		reason: String,
	},
}
impl Error {
	/// Builds an [`Error::IllegalState`] from a reason string.
	pub fn illegal_state(reason: impl Into<String>) -> Self {
		Self::IllegalState { reason: reason.into() }
	}
}

/// Failure of a single node while interpreting an authentication step graph.
///
/// Every variant names the failing step and the pipeline state observed when the step ran so
/// login failures can be attributed without re-running the flow.
#[derive(Debug, ThisError)]
pub enum PipelineError {
	/// A request step received a non-2xx response.
	#[error("Step `{step}` in state `{state}` failed with status {status} and body {body}.")]
	Request {
		/// Description of the failing request step.
		step: String,
		/// Pipeline state at failure time.
		state: String,
		/// HTTP status code returned by the service.
		status: u16,
		/// Response body returned by the service.
		body: String,
	},
	/// A supplier, map, or tap step returned an error.
	#[error("Step `{step}` in state `{state}` failed.")]
	Step {
		/// Description of the failing step.
		step: String,
		/// Pipeline state at failure time.
		state: String,
		/// Error raised by the step's callback.
		#[source]
		source: BoxError,
	},
	/// The terminal step produced a login response without a usable token.
	#[error("Login response did not contain a well-formed token.")]
	MalformedToken {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Failure of a lease lifecycle call against the secret service.
#[derive(Debug, ThisError)]
pub enum LeaseError {
	/// Initial or rotating secret fetch was rejected.
	#[error("Secret fetch for `{path}` failed with status {status} and body {body}.")]
	Fetch {
		/// Requested secret path.
		path: String,
		/// HTTP status code returned by the service.
		status: u16,
		/// Response body returned by the service.
		body: String,
	},
	/// Lease renewal was rejected.
	#[error("Lease renewal for `{path}` failed with status {status} and body {body}.")]
	Renewal {
		/// Requested secret path.
		path: String,
		/// HTTP status code returned by the service.
		status: u16,
		/// Response body returned by the service.
		body: String,
	},
	/// Lease revocation was rejected; revocation is best effort and the error is reported once.
	#[error("Lease revocation for `{path}` failed with status {status}.")]
	Revocation {
		/// Requested secret path.
		path: String,
		/// HTTP status code returned by the service.
		status: u16,
	},
	/// The service answered with a body the lease parser could not understand.
	#[error("Lease response was malformed.")]
	MalformedLease {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Transport-level failures (network, IO, credential supply).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the secret service.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the secret service.")]
	Io(#[from] std::io::Error),
	/// A token source could not supply a credential for an authorized request.
	#[error("Token source failed to supply a credential.")]
	TokenSource {
		/// Login or renewal failure reported by the token source.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a token-source failure raised while authorizing a request.
	pub fn token_source(src: Error) -> Self {
		Self::TokenSource { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for TransportError {
	fn from(e: reqwest::Error) -> Self {
		Self::network(e)
	}
}
