//! Login session manager: on-demand login, scheduled self-renewal, and self-revocation.
//!
//! [`SessionManager`] owns one login credential obtained from an [`AuthSteps`] pipeline.
//! Concurrent token requests while no valid credential exists collapse into a single login
//! (the losers of the race reuse the winner's token), and renewable credentials are renewed
//! in the background ahead of expiry using the same due-time computation as the lease
//! registry. Implementing [`TokenSource`] lets an
//! [`AuthorizedTransport`](crate::http::AuthorizedTransport) stamp every secret request with
//! the session's current token.

// self
use crate::{
	_prelude::*,
	auth::{AuthMethod, AuthSteps, AuthStepsExecutor, LoginToken},
	error::LeaseError,
	http::{SecretTransport, TOKEN_HEADER, TokenFuture, TokenSource, TransportRequest},
	obs::{self, LifecycleKind, LifecycleOutcome, LifecycleSpan, RenewalMetrics},
	schedule::{DueTime, RenewalSettings, TaskHandle},
};

/// Lifecycle event emitted by the session manager.
///
/// Events fire synchronously; listeners that block delay the session machinery.
#[derive(Clone, Debug)]
pub enum SessionEvent {
	/// A login pipeline produced a fresh credential.
	LoggedIn {
		/// Whether the credential can be renewed in place.
		renewable: bool,
		/// Time-to-live granted at login.
		ttl: Duration,
	},
	/// The credential was renewed in place.
	Renewed {
		/// Time-to-live granted by the renewal.
		ttl: Duration,
	},
	/// The credential entered its expiry window and was dropped; the next access re-logs-in.
	Expired,
	/// The credential was revoked and dropped.
	Revoked,
	/// A background renewal or revocation failed.
	Error {
		/// The reported failure.
		error: Arc<Error>,
	},
}

/// Observer of session lifecycle events.
pub trait SessionListener: Send + Sync {
	/// Called synchronously for every session transition.
	fn on_session_event(&self, event: &SessionEvent);
}
impl<F> SessionListener for F
where
	F: Fn(&SessionEvent) + Send + Sync,
{
	fn on_session_event(&self, event: &SessionEvent) {
		self(event)
	}
}

/// Manages one login session on top of an authentication pipeline.
///
/// Cheap to clone; clones share the credential, which is how the background renewal task
/// operates on the same session.
pub struct SessionManager<C>
where
	C: ?Sized + SecretTransport,
{
	inner: Arc<SessionInner<C>>,
}
impl<C> SessionManager<C>
where
	C: ?Sized + SecretTransport,
{
	/// Creates a manager that logs in through the provided pipeline.
	pub fn new(steps: AuthSteps, transport: impl Into<Arc<C>>) -> Self {
		Self {
			inner: Arc::new(SessionInner {
				steps,
				transport: transport.into(),
				settings: RwLock::new(RenewalSettings::default()),
				listeners: RwLock::new(Vec::new()),
				login_guard: AsyncMutex::new(()),
				state: Mutex::new(SessionState::default()),
				metrics: Arc::new(RenewalMetrics::default()),
			}),
		}
	}

	/// Creates a manager from a declarative authentication method.
	pub fn from_method(method: &impl AuthMethod, transport: impl Into<Arc<C>>) -> Self {
		Self::new(method.steps(), transport)
	}

	/// Returns the current renewal timing knobs.
	pub fn renewal_settings(&self) -> RenewalSettings {
		*self.inner.settings.read()
	}

	/// Replaces the renewal timing knobs; a renewal already scheduled keeps its delay.
	pub fn set_renewal_settings(&self, settings: RenewalSettings) {
		*self.inner.settings.write() = settings;
	}

	/// Returns the shared renewal counters.
	pub fn metrics(&self) -> Arc<RenewalMetrics> {
		self.inner.metrics.clone()
	}

	/// Registers a session listener; events are delivered synchronously.
	pub fn add_session_listener(&self, listener: Arc<dyn SessionListener>) {
		self.inner.listeners.write().push(listener);
	}

	/// Returns the session credential, logging in first when none is valid.
	///
	/// Concurrent callers while no valid credential exists perform exactly one login between
	/// them; everyone observes the same token.
	pub async fn token(&self) -> Result<LoginToken> {
		if let Some(token) = self.cached_token() {
			return Ok(token);
		}

		let _guard = self.inner.login_guard.lock().await;

		// Another caller may have logged in while this one waited for the guard.
		if let Some(token) = self.cached_token() {
			return Ok(token);
		}

		let executor =
			AuthStepsExecutor::new(self.inner.steps.clone(), self.inner.transport.clone());
		let token = executor.login().await?;

		self.inner.state.lock().token = Some(token.clone());
		self.schedule_renewal(&token);
		self.publish(SessionEvent::LoggedIn { renewable: token.is_renewable(), ttl: token.ttl() });

		Ok(token)
	}

	/// Revokes the session credential best-effort and drops it.
	///
	/// Revoking a session without a credential is a no-op.
	pub async fn revoke(&self) {
		const KIND: LifecycleKind = LifecycleKind::Revoke;

		let (token, task) = {
			let mut state = self.inner.state.lock();

			(state.token.take(), state.task.take())
		};

		if let Some(task) = task {
			task.cancel();
		}

		let Some(token) = token else { return };
		let span = LifecycleSpan::new(KIND, "revoke");

		obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Attempt);

		let request = TransportRequest::post("auth/token/revoke-self", [] as [&str; 0])
			.with_header(TOKEN_HEADER, token.expose());
		let outcome = match span.instrument(self.inner.transport.send(request)).await {
			Ok(response) if response.is_success() => Ok(()),
			Ok(response) => Err(Error::from(LeaseError::Revocation {
				path: "auth/token/revoke-self".into(),
				status: response.status,
			})),
			Err(e) => Err(e.into()),
		};

		match outcome {
			Ok(()) => obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Success),
			// Revocation is best effort; the failure is reported once and never retried.
			Err(e) => {
				obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure);
				self.publish(SessionEvent::Error { error: Arc::new(e) });
			},
		}

		self.publish(SessionEvent::Revoked);
	}

	/// Renews the current credential in place, returning the renewed grant.
	///
	/// Failures drop the credential and propagate to the caller, so the next
	/// [`token`](Self::token) call logs in from scratch; the scheduled background task
	/// publishes them as [`SessionEvent::Error`] instead, since it has no caller.
	pub async fn renew(&self) -> Result<LoginToken> {
		const KIND: LifecycleKind = LifecycleKind::Renew;

		let token = {
			let state = self.inner.state.lock();

			state.token.clone()
		};
		let Some(token) = token else {
			return Err(Error::illegal_state("there is no session credential to renew"));
		};
		let span = LifecycleSpan::new(KIND, "renew");

		self.inner.metrics.record_attempt();
		obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Attempt);

		let request = TransportRequest::post("auth/token/renew-self", [] as [&str; 0])
			.with_header(TOKEN_HEADER, token.expose());
		let outcome = match span.instrument(self.inner.transport.send(request)).await {
			Ok(response) if response.is_success() =>
				LoginToken::from_login_response(&response.body)
					.map_err(Error::from)
					.map(|parsed| token.renewed(parsed.ttl(), parsed.is_renewable())),
			Ok(response) => Err(LeaseError::Renewal {
				path: "auth/token/renew-self".into(),
				status: response.status,
				body: response.body_text(),
			}
			.into()),
			Err(e) => Err(e.into()),
		};
		let renewed = match outcome {
			Ok(renewed) => renewed,
			Err(e) => {
				self.inner.metrics.record_failure();
				obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure);
				self.inner.state.lock().token = None;

				return Err(e);
			},
		};

		self.inner.metrics.record_success();
		obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Success);

		let settings = *self.inner.settings.read();

		match settings.due_time(renewed.ttl()) {
			// The renewed grant is already inside the expiry window; drop it instead of
			// hammering the service with renewals that cannot outrun the threshold.
			DueTime::Expired =>
				if self.inner.state.lock().token.take().is_some() {
					self.publish(SessionEvent::Expired);
				},
			DueTime::In(_) => {
				{
					let mut state = self.inner.state.lock();

					// A revoke may have raced this renewal; a revoked credential stays gone.
					if state.token.is_none() {
						return Ok(renewed);
					}

					state.token = Some(renewed.clone());
				}

				self.publish(SessionEvent::Renewed { ttl: renewed.ttl() });
				self.schedule_renewal(&renewed);
			},
		}

		Ok(renewed)
	}

	fn cached_token(&self) -> Option<LoginToken> {
		self.inner
			.state
			.lock()
			.token
			.clone()
			.filter(|token| !token.is_expired_at(OffsetDateTime::now_utc()))
	}

	fn schedule_renewal(&self, token: &LoginToken) {
		if !token.is_renewable() || token.ttl().is_zero() {
			return;
		}

		let DueTime::In(delay) = self.inner.settings.read().due_time(token.ttl()) else { return };
		let manager = self.clone();
		let task = TaskHandle::spawn(
			delay,
			// Boxed so the renewal future can schedule its own successor.
			Box::pin(async move {
				manager.inner.state.lock().task.take();

				// The credential may have been revoked between scheduling and firing.
				if manager.inner.state.lock().token.is_none() {
					return;
				}
				if let Err(e) = manager.renew().await {
					manager.publish(SessionEvent::Error { error: Arc::new(e) });
				}
			}) as Pin<Box<dyn Future<Output = ()> + Send>>,
		);

		self.inner.state.lock().task = Some(task);
	}

	fn publish(&self, event: SessionEvent) {
		let listeners = self.inner.listeners.read().clone();

		for listener in listeners {
			listener.on_session_event(&event);
		}
	}
}
#[cfg(test)]
impl<C> SessionManager<C>
where
	C: ?Sized + SecretTransport,
{
	fn has_renewal_task(&self) -> bool {
		self.inner.state.lock().task.is_some()
	}
}
impl<C> Clone for SessionManager<C>
where
	C: ?Sized + SecretTransport,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<C> Debug for SessionManager<C>
where
	C: ?Sized + SecretTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("logged_in", &self.inner.state.lock().token.is_some())
			.finish()
	}
}
impl<C> TokenSource for SessionManager<C>
where
	C: ?Sized + SecretTransport,
{
	fn token_secret(&self) -> TokenFuture<'_> {
		Box::pin(async move { Ok(self.token().await?.token().secret().clone()) })
	}
}

struct SessionInner<C>
where
	C: ?Sized + SecretTransport,
{
	steps: AuthSteps,
	settings: RwLock<RenewalSettings>,
	listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
	login_guard: AsyncMutex<()>,
	state: Mutex<SessionState>,
	metrics: Arc<RenewalMetrics>,
	transport: Arc<C>,
}

#[derive(Default)]
struct SessionState {
	token: Option<LoginToken>,
	task: Option<TaskHandle>,
}
