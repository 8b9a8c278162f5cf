//! Self-rescheduling lease registry for requested secrets.
//!
//! [`SecretLeaseContainer`] tracks registered secret paths, fetches them on start, and keeps
//! at most one outstanding background task per secret. Renewable leases are extended in place
//! ahead of expiry; rotating secrets are re-fetched once their lease (or announced cadence)
//! elapses. There is no fixed-interval poller: every task computes its next fire time from the
//! most recent server-granted lease duration.

pub mod domain;
pub mod event;

// self
use crate::{
	_prelude::*,
	error::LeaseError,
	http::{SecretTransport, TransportRequest},
	lease::{
		domain::{Lease, LeaseMode, LeaseResponse, RequestedSecret, SecretData},
		event::{LeaseEvent, LeaseListener},
	},
	obs::{self, LifecycleKind, LifecycleOutcome, LifecycleSpan, RenewalMetrics},
	schedule::{DueTime, RenewalSettings, TaskHandle},
};

/// Externally observable state of a tracked secret.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SecretStatus {
	/// Registered but not fetched yet.
	#[default]
	Pending,
	/// Data is available and no renewable lease is attached.
	Stable,
	/// Data is available under an active renewable lease.
	Leased,
	/// The lease ran out or entered its expiry window.
	Expired,
	/// The last fetch, renewal, or rotation failed; the failure is terminal for this lease.
	Failed,
}

/// Lease registry driving renewal and rotation of requested secrets.
///
/// The container is cheap to clone and shares its state across clones, which is how spawned
/// background tasks keep operating on the same registry. Lifecycle transitions are published
/// synchronously to every registered [`LeaseListener`].
pub struct SecretLeaseContainer<C>
where
	C: ?Sized + SecretTransport,
{
	inner: Arc<ContainerInner<C>>,
}
impl<C> SecretLeaseContainer<C>
where
	C: ?Sized + SecretTransport,
{
	/// Creates a stopped container on top of the provided transport.
	///
	/// The transport is expected to be authorized already, e.g. an
	/// [`AuthorizedTransport`](crate::http::AuthorizedTransport) riding on a session manager.
	pub fn new(transport: impl Into<Arc<C>>) -> Self {
		Self {
			inner: Arc::new(ContainerInner {
				transport: transport.into(),
				settings: RwLock::new(RenewalSettings::default()),
				listeners: RwLock::new(Vec::new()),
				entries: Mutex::new(HashMap::new()),
				started: AtomicBool::new(false),
				metrics: Arc::new(RenewalMetrics::default()),
			}),
		}
	}

	/// Returns the current renewal timing knobs.
	pub fn renewal_settings(&self) -> RenewalSettings {
		*self.inner.settings.read()
	}

	/// Replaces the renewal timing knobs; tasks already scheduled keep their original delay.
	pub fn set_renewal_settings(&self, settings: RenewalSettings) {
		*self.inner.settings.write() = settings;
	}

	/// Returns the shared renewal counters.
	pub fn metrics(&self) -> Arc<RenewalMetrics> {
		self.inner.metrics.clone()
	}

	/// Registers a lifecycle listener; events are delivered synchronously.
	pub fn add_lease_listener(&self, listener: Arc<dyn LeaseListener>) {
		self.inner.listeners.write().push(listener);
	}

	/// Returns `true` while the container is started.
	pub fn is_started(&self) -> bool {
		self.inner.started.load(Ordering::Acquire)
	}

	/// Registers a secret path for tracking.
	///
	/// On a started container the secret is fetched before the call returns; on a stopped one
	/// it stays [`SecretStatus::Pending`] until [`start`](Self::start). Registering a path twice
	/// is rejected.
	pub async fn add_requested_secret(&self, secret: RequestedSecret) -> Result<()> {
		let entry = {
			let mut entries = self.inner.entries.lock();

			if entries.contains_key(secret.path()) {
				return Err(Error::illegal_state(format!(
					"secret path `{}` is already tracked",
					secret.path()
				)));
			}

			let entry =
				Arc::new(TrackedSecret { secret, state: Mutex::new(TrackedState::default()) });

			entries.insert(entry.secret.path().into(), entry.clone());

			entry
		};

		if self.is_started() {
			initial_fetch(&self.inner, &entry).await;
		}

		Ok(())
	}

	/// Registers a secret whose lease should be renewed in place.
	pub async fn request_renewable_secret(&self, path: impl Into<String>) -> Result<()> {
		self.add_requested_secret(RequestedSecret::renewable(path)).await
	}

	/// Registers a secret that should be rotated by re-fetching.
	pub async fn request_rotating_secret(&self, path: impl Into<String>) -> Result<()> {
		self.add_requested_secret(RequestedSecret::rotating(path)).await
	}

	/// Starts the container and fetches every pending secret before returning.
	///
	/// Starting an already started container is a no-op.
	pub async fn start(&self) {
		if self.inner.started.swap(true, Ordering::AcqRel) {
			return;
		}

		let pending = self
			.inner
			.entries
			.lock()
			.values()
			.filter(|e| e.state.lock().status == SecretStatus::Pending)
			.cloned()
			.collect::<Vec<_>>();

		for entry in pending {
			initial_fetch(&self.inner, &entry).await;
		}
	}

	/// Stops the container, cancelling scheduled tasks without revoking anything.
	///
	/// Tracked entries and their data snapshots survive a stop; a later
	/// [`start`](Self::start) re-fetches only secrets that were never fetched.
	pub fn stop(&self) {
		if !self.inner.started.swap(false, Ordering::AcqRel) {
			return;
		}

		for entry in self.inner.entries.lock().values() {
			if let Some(task) = entry.state.lock().task.take() {
				task.cancel();
			}
		}
	}

	/// De-registers a secret path, revoking its lease best-effort.
	///
	/// Removing an unknown path is a no-op.
	pub async fn remove_requested_secret(&self, path: &str) {
		let Some(entry) = self.inner.entries.lock().remove(path) else { return };

		if let Some(task) = entry.state.lock().task.take() {
			task.cancel();
		}

		revoke_entry(&self.inner, &entry).await;
	}

	/// Stops the container and revokes every outstanding lease best-effort.
	///
	/// Secrets fetched without a lease identifier are dropped without any revocation call or
	/// revocation events.
	pub async fn shutdown(&self) {
		self.stop();

		let entries = self.inner.entries.lock().drain().map(|(_, e)| e).collect::<Vec<_>>();

		for entry in entries {
			revoke_entry(&self.inner, &entry).await;
		}
	}

	/// Returns the latest data snapshot fetched for `path`.
	pub fn snapshot(&self, path: &str) -> Result<SecretData> {
		let entry = self.entry(path)?;
		let data = entry.state.lock().data.clone();

		data.ok_or_else(|| {
			Error::illegal_state(format!("no secret data has been fetched for `{path}`"))
		})
	}

	/// Returns the lifecycle status of `path`.
	pub fn status(&self, path: &str) -> Result<SecretStatus> {
		Ok(self.entry(path)?.state.lock().status)
	}

	fn entry(&self, path: &str) -> Result<Arc<TrackedSecret>> {
		self.inner
			.entries
			.lock()
			.get(path)
			.cloned()
			.ok_or_else(|| Error::illegal_state(format!("secret path `{path}` is not tracked")))
	}
}
#[cfg(test)]
impl<C> SecretLeaseContainer<C>
where
	C: ?Sized + SecretTransport,
{
	async fn renew_now(&self, path: &str) {
		let entry = self.entry(path).expect("Path should be tracked.");

		run_renewal(self.inner.clone(), entry).await;
	}

	async fn rotate_now(&self, path: &str) {
		let entry = self.entry(path).expect("Path should be tracked.");

		run_rotation(self.inner.clone(), entry).await;
	}

	fn has_scheduled_task(&self, path: &str) -> bool {
		self.entry(path).map(|e| e.state.lock().task.is_some()).unwrap_or(false)
	}
}
impl<C> Clone for SecretLeaseContainer<C>
where
	C: ?Sized + SecretTransport,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<C> Debug for SecretLeaseContainer<C>
where
	C: ?Sized + SecretTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SecretLeaseContainer")
			.field("started", &self.is_started())
			.field("entries", &self.inner.entries.lock().len())
			.finish()
	}
}

struct ContainerInner<C>
where
	C: ?Sized + SecretTransport,
{
	settings: RwLock<RenewalSettings>,
	listeners: RwLock<Vec<Arc<dyn LeaseListener>>>,
	entries: Mutex<HashMap<String, Arc<TrackedSecret>>>,
	started: AtomicBool,
	metrics: Arc<RenewalMetrics>,
	transport: Arc<C>,
}

struct TrackedSecret {
	secret: RequestedSecret,
	state: Mutex<TrackedState>,
}

#[derive(Default)]
struct TrackedState {
	status: SecretStatus,
	lease: Lease,
	data: Option<SecretData>,
	task: Option<TaskHandle>,
}

fn publish<C>(inner: &ContainerInner<C>, event: LeaseEvent)
where
	C: ?Sized + SecretTransport,
{
	// Listeners are invoked outside the registry locks; a slow listener delays the scheduler
	// but cannot deadlock it.
	let listeners = inner.listeners.read().clone();

	for listener in listeners {
		listener.on_lease_event(&event);
	}
}

async fn fetch_secret<C>(
	inner: &Arc<ContainerInner<C>>,
	entry: &Arc<TrackedSecret>,
) -> Result<LeaseResponse>
where
	C: ?Sized + SecretTransport,
{
	let request = TransportRequest::get(entry.secret.path(), [] as [&str; 0]);
	let response = inner.transport.send(request).await?;

	if !response.is_success() {
		return Err(LeaseError::Fetch {
			path: entry.secret.path().into(),
			status: response.status,
			body: response.body_text(),
		}
		.into());
	}

	Ok(LeaseResponse::parse(&response.body)?)
}

async fn initial_fetch<C>(inner: &Arc<ContainerInner<C>>, entry: &Arc<TrackedSecret>)
where
	C: ?Sized + SecretTransport,
{
	const KIND: LifecycleKind = LifecycleKind::Fetch;

	let span = LifecycleSpan::new(KIND, "initial_fetch");

	obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Attempt);

	match span.instrument(fetch_secret(inner, entry)).await {
		Ok(response) => {
			obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Success);

			let lease = response.lease();
			let data = response.data.unwrap_or_default();

			{
				let mut state = entry.state.lock();

				state.data = Some(data.clone());
				state.lease = lease.clone();
				state.status = if lease.is_renewable() {
					SecretStatus::Leased
				} else {
					SecretStatus::Stable
				};
			}

			publish(
				inner,
				LeaseEvent::Created { secret: entry.secret.clone(), lease: lease.clone(), data },
			);
			schedule_entry(inner, entry, &lease);
		},
		Err(e) => {
			obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure);

			entry.state.lock().status = SecretStatus::Failed;

			publish(
				inner,
				LeaseEvent::Error {
					secret: entry.secret.clone(),
					lease: Lease::none(),
					error: Arc::new(e),
				},
			);
		},
	}
}

/// Schedules the next background task for `lease`, or none when nothing drives the secret.
///
/// Renewable leases always renew; rotating secrets without a renewable lease re-fetch on the
/// cadence announced by the lease duration. A lease already inside its expiry window either
/// rotates after the minimum renewal interval or is marked expired on the spot.
fn schedule_entry<C>(inner: &Arc<ContainerInner<C>>, entry: &Arc<TrackedSecret>, lease: &Lease)
where
	C: ?Sized + SecretTransport,
{
	if !inner.started.load(Ordering::Acquire) {
		return;
	}

	let renewable = lease.is_renewable();
	let rotates = entry.secret.mode() == LeaseMode::Rotate;

	if !renewable && !(rotates && !lease.lease_duration().is_zero()) {
		return;
	}

	let settings = *inner.settings.read();

	match settings.due_time(lease.lease_duration()) {
		DueTime::In(delay) if renewable => spawn_renewal(inner, entry, delay),
		DueTime::In(delay) => spawn_rotation(inner, entry, delay),
		// Rotation owns the Expired/Created event pair, so nothing is published here.
		DueTime::Expired if rotates => spawn_rotation(inner, entry, settings.min_renewal()),
		DueTime::Expired => {
			{
				let mut state = entry.state.lock();

				state.lease = lease.clone();
				state.status = SecretStatus::Expired;
			}

			publish(
				inner,
				LeaseEvent::Expired { secret: entry.secret.clone(), lease: lease.clone() },
			);
		},
	}
}

fn spawn_renewal<C>(inner: &Arc<ContainerInner<C>>, entry: &Arc<TrackedSecret>, delay: Duration)
where
	C: ?Sized + SecretTransport,
{
	// A renewal finishing after stop() must not install a successor.
	if !inner.started.load(Ordering::Acquire) {
		return;
	}

	let task = TaskHandle::spawn(delay, {
		let inner = inner.clone();
		let entry = entry.clone();

		// Boxed so the renewal future can schedule its own successor.
		Box::pin(async move { run_renewal(inner, entry).await })
			as Pin<Box<dyn Future<Output = ()> + Send>>
	});

	entry.state.lock().task = Some(task);
}

fn spawn_rotation<C>(inner: &Arc<ContainerInner<C>>, entry: &Arc<TrackedSecret>, delay: Duration)
where
	C: ?Sized + SecretTransport,
{
	if !inner.started.load(Ordering::Acquire) {
		return;
	}

	let task = TaskHandle::spawn(delay, {
		let inner = inner.clone();
		let entry = entry.clone();

		Box::pin(async move { run_rotation(inner, entry).await })
			as Pin<Box<dyn Future<Output = ()> + Send>>
	});

	entry.state.lock().task = Some(task);
}

async fn run_renewal<C>(inner: Arc<ContainerInner<C>>, entry: Arc<TrackedSecret>)
where
	C: ?Sized + SecretTransport,
{
	const KIND: LifecycleKind = LifecycleKind::Renew;

	// Retire our own handle; a successor is installed on reschedule.
	entry.state.lock().task.take();

	let lease = entry.state.lock().lease.clone();
	let Some(lease_id) = lease.lease_id().map(str::to_owned) else { return };
	let span = LifecycleSpan::new(KIND, "run_renewal");

	inner.metrics.record_attempt();
	obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Attempt);

	let request = TransportRequest::put("sys/leases/renew", [] as [&str; 0]).with_body(
		serde_json::json!({
			"lease_id": lease_id,
			"increment": lease.lease_duration().whole_seconds(),
		}),
	);
	let response = match span.instrument(inner.transport.send(request)).await {
		Ok(response) => response,
		Err(e) => {
			inner.metrics.record_failure();
			obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure);
			entry.state.lock().status = SecretStatus::Failed;
			publish(
				&inner,
				LeaseEvent::Error {
					secret: entry.secret.clone(),
					lease,
					error: Arc::new(e.into()),
				},
			);

			return;
		},
	};

	// The service answers 400 once a lease is gone server-side.
	if response.status == 400 {
		inner.metrics.record_failure();
		obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure);
		expire_or_rotate(&inner, &entry, lease).await;

		return;
	}
	if !response.is_success() {
		inner.metrics.record_failure();
		obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure);
		entry.state.lock().status = SecretStatus::Failed;
		publish(
			&inner,
			LeaseEvent::Error {
				secret: entry.secret.clone(),
				lease,
				error: Arc::new(
					LeaseError::Renewal {
						path: entry.secret.path().into(),
						status: response.status,
						body: response.body_text(),
					}
					.into(),
				),
			},
		);

		return;
	}

	let renewed = match LeaseResponse::parse(&response.body) {
		Ok(renewed) => renewed,
		Err(e) => {
			inner.metrics.record_failure();
			obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure);
			entry.state.lock().status = SecretStatus::Failed;
			publish(
				&inner,
				LeaseEvent::Error {
					secret: entry.secret.clone(),
					lease,
					error: Arc::new(e.into()),
				},
			);

			return;
		},
	};
	// Renewal responses may omit the lease id; the old one stays valid in that case.
	let new_lease = Lease::of(
		renewed.lease_id.clone().unwrap_or(lease_id),
		Duration::seconds(renewed.lease_duration.min(i64::MAX as u64) as i64),
		renewed.renewable,
	);

	inner.metrics.record_success();
	obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Success);

	let settings = *inner.settings.read();

	match settings.due_time(new_lease.lease_duration()) {
		DueTime::Expired => expire_or_rotate(&inner, &entry, new_lease).await,
		DueTime::In(delay) => {
			{
				let mut state = entry.state.lock();

				state.lease = new_lease.clone();
				state.status = SecretStatus::Leased;
			}

			publish(&inner, LeaseEvent::Renewed { secret: entry.secret.clone(), lease: new_lease });
			spawn_renewal(&inner, &entry, delay);
		},
	}
}

/// Handles a lease that just entered its expiry window: rotating secrets re-fetch immediately,
/// renewable-only secrets are marked expired and left unscheduled.
async fn expire_or_rotate<C>(inner: &Arc<ContainerInner<C>>, entry: &Arc<TrackedSecret>, lease: Lease)
where
	C: ?Sized + SecretTransport,
{
	{
		let mut state = entry.state.lock();

		state.lease = lease.clone();
		state.status = SecretStatus::Expired;
	}

	// A stopped container no longer rotates; the secret is simply marked expired.
	if entry.secret.mode() == LeaseMode::Rotate && inner.started.load(Ordering::Acquire) {
		rotate(inner, entry).await;
	} else {
		publish(inner, LeaseEvent::Expired { secret: entry.secret.clone(), lease });
	}
}

async fn run_rotation<C>(inner: Arc<ContainerInner<C>>, entry: Arc<TrackedSecret>)
where
	C: ?Sized + SecretTransport,
{
	entry.state.lock().task.take();

	rotate(&inner, &entry).await;
}

async fn rotate<C>(inner: &Arc<ContainerInner<C>>, entry: &Arc<TrackedSecret>)
where
	C: ?Sized + SecretTransport,
{
	const KIND: LifecycleKind = LifecycleKind::Rotate;

	let span = LifecycleSpan::new(KIND, "rotate");
	let old_lease = entry.state.lock().lease.clone();

	obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Attempt);

	match span.instrument(fetch_secret(inner, entry)).await {
		Ok(response) => {
			obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Success);

			let lease = response.lease();
			let data = response.data.unwrap_or_default();

			{
				let mut state = entry.state.lock();

				state.data = Some(data.clone());
				state.lease = lease.clone();
				state.status = if lease.is_renewable() {
					SecretStatus::Leased
				} else {
					SecretStatus::Stable
				};
			}

			publish(
				inner,
				LeaseEvent::Expired { secret: entry.secret.clone(), lease: old_lease },
			);
			publish(
				inner,
				LeaseEvent::Created { secret: entry.secret.clone(), lease: lease.clone(), data },
			);
			publish(inner, LeaseEvent::Rotated { secret: entry.secret.clone(), lease: lease.clone() });
			schedule_entry(inner, entry, &lease);
		},
		Err(e) => {
			obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure);

			// Previous data stays in place on a failed rotation.
			entry.state.lock().status = SecretStatus::Failed;

			publish(
				inner,
				LeaseEvent::Error {
					secret: entry.secret.clone(),
					lease: old_lease,
					error: Arc::new(e),
				},
			);
		},
	}
}

async fn revoke_entry<C>(inner: &Arc<ContainerInner<C>>, entry: &Arc<TrackedSecret>)
where
	C: ?Sized + SecretTransport,
{
	const KIND: LifecycleKind = LifecycleKind::Revoke;

	let lease = entry.state.lock().lease.clone();
	let Some(lease_id) = lease.lease_id().map(str::to_owned) else { return };
	let span = LifecycleSpan::new(KIND, "revoke_entry");

	obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Attempt);
	publish(
		inner,
		LeaseEvent::BeforeRevocation { secret: entry.secret.clone(), lease: lease.clone() },
	);

	let request = TransportRequest::put("sys/leases/revoke", [] as [&str; 0])
		.with_body(serde_json::json!({ "lease_id": lease_id }));
	let outcome = match span.instrument(inner.transport.send(request)).await {
		Ok(response) if response.is_success() => Ok(()),
		Ok(response) => Err(Error::from(LeaseError::Revocation {
			path: entry.secret.path().into(),
			status: response.status,
		})),
		Err(e) => Err(e.into()),
	};

	match outcome {
		Ok(()) => obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Success),
		// Revocation is best effort; the failure is reported once and never retried.
		Err(e) => {
			obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure);
			publish(
				inner,
				LeaseEvent::Error {
					secret: entry.secret.clone(),
					lease: lease.clone(),
					error: Arc::new(e),
				},
			);
		},
	}

	publish(inner, LeaseEvent::AfterRevocation { secret: entry.secret.clone(), lease });

	entry.state.lock().lease = Lease::none();
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{StubTransport, secret_response};

	struct Recorder {
		events: Mutex<Vec<LeaseEvent>>,
	}
	impl Recorder {
		fn install<C>(container: &SecretLeaseContainer<C>) -> Arc<Self>
		where
			C: ?Sized + SecretTransport,
		{
			let recorder = Arc::new(Self { events: Mutex::new(Vec::new()) });

			container.add_lease_listener(recorder.clone());

			recorder
		}

		fn labels(&self) -> Vec<&'static str> {
			self.events
				.lock()
				.iter()
				.map(|event| match event {
					LeaseEvent::Created { .. } => "created",
					LeaseEvent::Renewed { .. } => "renewed",
					LeaseEvent::Expired { .. } => "expired",
					LeaseEvent::Rotated { .. } => "rotated",
					LeaseEvent::BeforeRevocation { .. } => "before_revocation",
					LeaseEvent::AfterRevocation { .. } => "after_revocation",
					LeaseEvent::Error { .. } => "error",
				})
				.collect()
		}
	}
	impl LeaseListener for Recorder {
		fn on_lease_event(&self, event: &LeaseEvent) {
			self.events.lock().push(event.clone());
		}
	}

	fn container(transport: Arc<StubTransport>) -> SecretLeaseContainer<StubTransport> {
		SecretLeaseContainer::new(transport)
	}

	#[tokio::test]
	async fn secret_without_lease_is_stable_and_unscheduled() {
		let transport = Arc::new(StubTransport::default().respond(
			200,
			secret_response(None, false, 0, serde_json::json!({ "key": "value" })),
		));
		let container = container(transport.clone());
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("secret/generic")
			.await
			.expect("Registration should succeed.");
		container.start().await;

		assert_eq!(recorder.labels(), ["created"]);
		assert_eq!(
			container.status("secret/generic").expect("Path should be tracked."),
			SecretStatus::Stable
		);
		assert_eq!(
			container.snapshot("secret/generic").expect("Data should be available.")["key"],
			serde_json::json!("value")
		);
		assert!(!container.has_scheduled_task("secret/generic"));

		let requests = transport.requests();

		assert_eq!(requests.len(), 1);
		assert_eq!(requests[0].expanded_path(), "secret/generic");
	}

	#[tokio::test]
	async fn renewable_lease_schedules_renewal() {
		let transport = Arc::new(StubTransport::default().respond(
			200,
			secret_response(Some("lease-1"), true, 100, serde_json::json!({ "key": "value" })),
		));
		let container = container(transport);
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("database/creds/app")
			.await
			.expect("Registration should succeed.");
		container.start().await;

		assert_eq!(recorder.labels(), ["created"]);
		assert_eq!(
			container.status("database/creds/app").expect("Path should be tracked."),
			SecretStatus::Leased
		);
		assert!(container.has_scheduled_task("database/creds/app"));
	}

	#[tokio::test]
	async fn fetch_failure_reports_error_and_fails_the_entry() {
		let transport =
			Arc::new(StubTransport::default().respond(403, serde_json::json!("permission denied")));
		let container = container(transport);
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("secret/forbidden")
			.await
			.expect("Registration should succeed.");
		container.start().await;

		assert_eq!(recorder.labels(), ["error"]);
		assert_eq!(
			container.status("secret/forbidden").expect("Path should be tracked."),
			SecretStatus::Failed
		);
		assert!(container.snapshot("secret/forbidden").is_err());
	}

	#[tokio::test]
	async fn renewal_success_emits_renewed_and_reschedules() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "v" })),
				)
				.respond(200, secret_response(Some("lease-1"), true, 80, Json::Null)),
		);
		let container = container(transport.clone());
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("database/creds/app")
			.await
			.expect("Registration should succeed.");
		container.start().await;
		container.renew_now("database/creds/app").await;

		assert_eq!(recorder.labels(), ["created", "renewed"]);
		assert!(container.has_scheduled_task("database/creds/app"));
		assert_eq!(container.metrics().attempts(), 1);
		assert_eq!(container.metrics().successes(), 1);

		let requests = transport.requests();

		assert_eq!(requests.len(), 2);
		assert_eq!(requests[1].expanded_path(), "sys/leases/renew");
		assert_eq!(
			requests[1].body,
			Some(serde_json::json!({ "lease_id": "lease-1", "increment": 100 }))
		);
	}

	#[tokio::test]
	async fn renewal_inside_expiry_window_expires_the_lease() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "v" })),
				)
				// Renewed duration of 30s is within the default 60s expiry threshold.
				.respond(200, secret_response(Some("lease-1"), true, 30, Json::Null)),
		);
		let container = container(transport);
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("database/creds/app")
			.await
			.expect("Registration should succeed.");
		container.start().await;
		container.renew_now("database/creds/app").await;

		assert_eq!(recorder.labels(), ["created", "expired"]);
		assert_eq!(
			container.status("database/creds/app").expect("Path should be tracked."),
			SecretStatus::Expired
		);
		assert!(!container.has_scheduled_task("database/creds/app"));
	}

	#[tokio::test]
	async fn rejected_renewal_is_terminal() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "v" })),
				)
				.respond(503, serde_json::json!({ "errors": ["overloaded"] })),
		);
		let container = container(transport);
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("database/creds/app")
			.await
			.expect("Registration should succeed.");
		container.start().await;
		container.renew_now("database/creds/app").await;

		assert_eq!(recorder.labels(), ["created", "error"]);
		assert_eq!(container.metrics().failures(), 1);
		assert!(!container.has_scheduled_task("database/creds/app"));
		assert_eq!(
			container.status("database/creds/app").expect("Path should be tracked."),
			SecretStatus::Failed
		);
	}

	#[tokio::test]
	async fn renewal_400_expires_renewable_secrets() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "v" })),
				)
				.respond(400, serde_json::json!({ "errors": ["lease not found"] })),
		);
		let container = container(transport);
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("database/creds/app")
			.await
			.expect("Registration should succeed.");
		container.start().await;
		container.renew_now("database/creds/app").await;

		assert_eq!(recorder.labels(), ["created", "expired"]);
		assert_eq!(
			container.status("database/creds/app").expect("Path should be tracked."),
			SecretStatus::Expired
		);
	}

	#[tokio::test]
	async fn rotation_replaces_the_snapshot() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), false, 100, serde_json::json!({ "k": "old" })),
				)
				.respond(
					200,
					secret_response(Some("lease-2"), false, 100, serde_json::json!({ "k": "new" })),
				),
		);
		let container = container(transport);
		let recorder = Recorder::install(&container);

		container
			.request_rotating_secret("secret/rotating")
			.await
			.expect("Registration should succeed.");
		container.start().await;

		assert!(container.has_scheduled_task("secret/rotating"));

		container.rotate_now("secret/rotating").await;

		assert_eq!(recorder.labels(), ["created", "expired", "created", "rotated"]);
		assert_eq!(
			container.snapshot("secret/rotating").expect("Data should be available.")["k"],
			serde_json::json!("new")
		);
		assert!(container.has_scheduled_task("secret/rotating"));
	}

	#[tokio::test]
	async fn renewal_400_rotates_rotating_secrets() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "old" })),
				)
				.respond(400, serde_json::json!({ "errors": ["lease not found"] }))
				.respond(
					200,
					secret_response(Some("lease-2"), true, 100, serde_json::json!({ "k": "new" })),
				),
		);
		let container = container(transport);
		let recorder = Recorder::install(&container);

		container
			.request_rotating_secret("database/creds/rotating")
			.await
			.expect("Registration should succeed.");
		container.start().await;
		container.renew_now("database/creds/rotating").await;

		assert_eq!(recorder.labels(), ["created", "expired", "created", "rotated"]);
		assert_eq!(
			container.status("database/creds/rotating").expect("Path should be tracked."),
			SecretStatus::Leased
		);
		assert_eq!(
			container.snapshot("database/creds/rotating").expect("Data should be available.")["k"],
			serde_json::json!("new")
		);
		assert!(container.has_scheduled_task("database/creds/rotating"));
	}

	#[tokio::test]
	async fn shutdown_revokes_leased_secrets_only() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "1" })),
				)
				.respond(
					200,
					secret_response(Some("lease-2"), true, 100, serde_json::json!({ "k": "2" })),
				)
				.respond(200, secret_response(None, false, 0, serde_json::json!({ "k": "3" })))
				.respond(204, Json::Null)
				.respond(204, Json::Null),
		);
		let container = container(transport.clone());
		let recorder = Recorder::install(&container);

		// Registered one at a time on a started container so fetch order is deterministic.
		container.start().await;
		container
			.request_renewable_secret("database/creds/one")
			.await
			.expect("Registration should succeed.");
		container
			.request_renewable_secret("database/creds/two")
			.await
			.expect("Registration should succeed.");
		container
			.request_renewable_secret("secret/generic")
			.await
			.expect("Registration should succeed.");
		container.shutdown().await;

		let labels = recorder.labels();

		assert_eq!(labels.iter().filter(|l| **l == "before_revocation").count(), 2);
		assert_eq!(labels.iter().filter(|l| **l == "after_revocation").count(), 2);
		assert!(!labels.contains(&"error"));
		assert!(!container.is_started());
		// Entries are dropped after shutdown.
		assert!(container.status("database/creds/one").is_err());

		let revocations = transport
			.requests()
			.into_iter()
			.filter(|r| r.expanded_path() == "sys/leases/revoke")
			.collect::<Vec<_>>();

		assert_eq!(revocations.len(), 2);
	}

	#[tokio::test]
	async fn stop_cancels_without_revoking() {
		let transport = Arc::new(StubTransport::default().respond(
			200,
			secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "v" })),
		));
		let container = container(transport.clone());
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("database/creds/app")
			.await
			.expect("Registration should succeed.");
		container.start().await;
		container.stop();

		assert_eq!(recorder.labels(), ["created"]);
		assert!(!container.has_scheduled_task("database/creds/app"));
		// The entry and its data survive a stop.
		assert!(container.snapshot("database/creds/app").is_ok());
		assert_eq!(transport.requests().len(), 1);
	}

	#[tokio::test]
	async fn renewal_finishing_after_stop_does_not_reschedule() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "v" })),
				)
				.respond(200, secret_response(Some("lease-1"), true, 100, Json::Null)),
		);
		let container = container(transport.clone());
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("database/creds/app")
			.await
			.expect("Registration should succeed.");
		container.start().await;
		container.stop();
		// Simulates a renewal that was already executing when the container stopped.
		container.renew_now("database/creds/app").await;

		assert_eq!(recorder.labels(), ["created", "renewed"]);
		assert!(!container.has_scheduled_task("database/creds/app"));
		assert_eq!(transport.requests().len(), 2);
	}

	#[tokio::test]
	async fn renewal_400_after_stop_expires_without_rotating() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "v" })),
				)
				.respond(400, serde_json::json!({ "errors": ["lease not found"] })),
		);
		let container = container(transport.clone());
		let recorder = Recorder::install(&container);

		container
			.request_rotating_secret("database/creds/rotating")
			.await
			.expect("Registration should succeed.");
		container.start().await;
		container.stop();
		container.renew_now("database/creds/rotating").await;

		assert_eq!(recorder.labels(), ["created", "expired"]);
		assert_eq!(
			container.status("database/creds/rotating").expect("Path should be tracked."),
			SecretStatus::Expired
		);
		assert!(!container.has_scheduled_task("database/creds/rotating"));
		// No rotation fetch goes out on a stopped container.
		assert_eq!(transport.requests().len(), 2);
	}

	#[tokio::test]
	async fn duplicate_registration_is_rejected() {
		let container = container(Arc::new(StubTransport::default()));

		container
			.request_renewable_secret("secret/app")
			.await
			.expect("First registration should succeed.");

		assert!(matches!(
			container.request_rotating_secret("secret/app").await,
			Err(Error::IllegalState { .. })
		));
	}

	#[tokio::test]
	async fn registration_after_start_fetches_immediately() {
		let transport = Arc::new(StubTransport::default().respond(
			200,
			secret_response(None, false, 0, serde_json::json!({ "k": "v" })),
		));
		let container = container(transport);
		let recorder = Recorder::install(&container);

		container.start().await;

		assert!(recorder.labels().is_empty());

		container
			.request_renewable_secret("secret/late")
			.await
			.expect("Registration should succeed.");

		assert_eq!(recorder.labels(), ["created"]);
	}

	#[tokio::test]
	async fn removal_revokes_and_forgets_the_entry() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "v" })),
				)
				.respond(204, Json::Null),
		);
		let container = container(transport);
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("database/creds/app")
			.await
			.expect("Registration should succeed.");
		container.start().await;
		container.remove_requested_secret("database/creds/app").await;

		assert_eq!(recorder.labels(), ["created", "before_revocation", "after_revocation"]);
		assert!(container.status("database/creds/app").is_err());

		// Removing again is a no-op.
		container.remove_requested_secret("database/creds/app").await;

		assert_eq!(recorder.labels().len(), 3);
	}

	#[tokio::test]
	async fn failed_revocation_reports_error_between_revocation_events() {
		let transport = Arc::new(
			StubTransport::default()
				.respond(
					200,
					secret_response(Some("lease-1"), true, 100, serde_json::json!({ "k": "v" })),
				)
				.respond(500, serde_json::json!({ "errors": ["internal"] })),
		);
		let container = container(transport);
		let recorder = Recorder::install(&container);

		container
			.request_renewable_secret("database/creds/app")
			.await
			.expect("Registration should succeed.");
		container.start().await;
		container.shutdown().await;

		assert_eq!(
			recorder.labels(),
			["created", "before_revocation", "error", "after_revocation"]
		);
	}
}
