//! Rust's turnkey secret-lease broker - declarative login pipelines, self-rescheduling lease
//! renewal, and lifecycle observability in one crate built for production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod error;
pub mod http;
pub mod lease;
pub mod obs;
pub mod schedule;
pub mod session;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// self
	use crate::http::{
		SecretTransport, TransportError, TransportFuture, TransportRequest, TransportResponse,
	};

	/// Scripted transport that replays canned responses in registration order.
	///
	/// Every dispatched request is recorded so tests can assert ordering and payloads without a
	/// live server.
	#[derive(Default)]
	pub struct StubTransport {
		responses: Mutex<Vec<Result<TransportResponse, TransportError>>>,
		requests: Mutex<Vec<TransportRequest>>,
	}
	impl StubTransport {
		/// Queues a successful response with the provided status and JSON body.
		pub fn respond(self, status: u16, body: Json) -> Self {
			self.responses.lock().push(Ok(TransportResponse { status, body }));

			self
		}

		/// Queues a transport-level failure.
		pub fn fail(self, error: TransportError) -> Self {
			self.responses.lock().push(Err(error));

			self
		}

		/// Returns the requests dispatched so far.
		pub fn requests(&self) -> Vec<TransportRequest> {
			self.requests.lock().clone()
		}
	}
	impl SecretTransport for StubTransport {
		fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				self.requests.lock().push(request);

				let mut responses = self.responses.lock();

				if responses.is_empty() {
					return Err(TransportError::Io(std::io::Error::other(
						"StubTransport ran out of scripted responses.",
					)));
				}

				responses.remove(0)
			})
		}
	}

	/// Builds a login response body in the shape returned by the secret service.
	pub fn login_response(token: &str, renewable: bool, lease_duration: u64) -> Json {
		serde_json::json!({
			"auth": {
				"client_token": token,
				"renewable": renewable,
				"lease_duration": lease_duration,
			}
		})
	}

	/// Builds a secret-read response body carrying an optional lease.
	pub fn secret_response(
		lease_id: Option<&str>,
		renewable: bool,
		lease_duration: u64,
		data: Json,
	) -> Json {
		serde_json::json!({
			"lease_id": lease_id,
			"renewable": renewable,
			"lease_duration": lease_duration,
			"data": data,
		})
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::{
			Arc,
			atomic::{AtomicBool, Ordering},
		},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::Client as ReqwestClient;
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value as Json;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
