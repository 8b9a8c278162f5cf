//! Interprets an [`AuthSteps`] definition against a transport to produce a login credential.

// self
use crate::{
	_prelude::*,
	auth::{
		steps::{AuthSteps, Step},
		token::LoginToken,
	},
	error::PipelineError,
	http::{RequestMethod, SecretTransport, TransportRequest},
	obs::{self, LifecycleKind, LifecycleOutcome, LifecycleSpan},
};

/// Executes authentication pipelines, threading a state value through each step.
///
/// Steps run exactly once and strictly in definition order; later requests may depend on
/// artifacts produced by earlier steps, so there is no reordering or parallelism. Runs are
/// independent: re-executing the same [`AuthSteps`] shares no state with earlier runs, which
/// is what makes re-login after token expiry possible with the identical definition.
pub struct AuthStepsExecutor<C>
where
	C: ?Sized + SecretTransport,
{
	steps: AuthSteps,
	transport: Arc<C>,
}
impl<C> AuthStepsExecutor<C>
where
	C: ?Sized + SecretTransport,
{
	/// Creates an executor for the provided pipeline and shared transport.
	pub fn new(steps: AuthSteps, transport: Arc<C>) -> Self {
		Self { steps, transport }
	}

	/// Interprets the pipeline once and yields the resulting credential.
	pub async fn login(&self) -> Result<LoginToken> {
		const KIND: LifecycleKind = LifecycleKind::Login;

		let span = LifecycleSpan::new(KIND, "login");

		obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Attempt);

		let result = span.instrument(self.run()).await;

		match &result {
			Ok(_) => obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Success),
			Err(_) => obs::record_lifecycle_outcome(KIND, LifecycleOutcome::Failure),
		}

		result
	}

	async fn run(&self) -> Result<LoginToken> {
		let mut state: Option<Json> = None;

		for step in self.steps.iter() {
			match step {
				Step::Supply(supplier) =>
					state = Some(supplier().map_err(|source| PipelineError::Step {
						step: step.to_string(),
						state: describe_state(&state),
						source,
					})?),
				Step::Request(request) => {
					let response = self.exchange(step, request, &state).await?;

					state = Some(response);
				},
				Step::Map(transform) => {
					let input = state.take().unwrap_or(Json::Null);
					let described = describe_state(&Some(input.clone()));

					state = Some(transform(input).map_err(|source| PipelineError::Step {
						step: step.to_string(),
						state: described,
						source,
					})?);
				},
				Step::Tap(callback) => {
					let input = state.clone().unwrap_or(Json::Null);

					callback(&input).map_err(|source| PipelineError::Step {
						step: step.to_string(),
						state: describe_state(&state),
						source,
					})?;
				},
				Step::LoginRequest(request) => {
					let response = self.exchange(step, request, &state).await?;

					return Ok(LoginToken::from_login_response(&response)?);
				},
				Step::LoginMap(transform) => {
					let input = state.take().unwrap_or(Json::Null);
					let described = describe_state(&Some(input.clone()));

					return Ok(transform(input).map_err(|source| PipelineError::Step {
						step: step.to_string(),
						state: described,
						source,
					})?);
				},
			}
		}

		// Unreachable through the builder API, which always ends a pipeline with a terminal step.
		Err(Error::illegal_state("authentication pipeline has no terminal step"))
	}

	async fn exchange(
		&self,
		step: &Step,
		request: &TransportRequest,
		state: &Option<Json>,
	) -> Result<Json> {
		let mut request = request.clone();

		if request.body.is_none()
			&& matches!(request.method, RequestMethod::Post | RequestMethod::Put)
			&& let Some(value) = state
		{
			request.body = Some(value.clone());
		}

		let response = self.transport.send(request).await?;

		if !response.is_success() {
			return Err(PipelineError::Request {
				step: step.to_string(),
				state: describe_state(state),
				status: response.status,
				body: response.body_text(),
			}
			.into());
		}

		Ok(response.body)
	}
}

// Compact state rendering for error attribution; bodies are truncated, never logged in full.
fn describe_state(state: &Option<Json>) -> String {
	const MAX: usize = 120;

	let Some(value) = state else { return "null".into() };
	let rendered = value.to_string();

	if rendered.len() > MAX {
		let mut cut = MAX;

		while !rendered.is_char_boundary(cut) {
			cut -= 1;
		}

		format!("{}...", &rendered[..cut])
	} else {
		rendered
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicU32;

	// self
	use super::*;
	use crate::_preludet::{StubTransport, login_response};

	fn executor(steps: AuthSteps, transport: StubTransport) -> AuthStepsExecutor<StubTransport> {
		AuthStepsExecutor::new(steps, Arc::new(transport))
	}

	#[tokio::test]
	async fn just_token_logs_in_without_transport() {
		let steps = AuthSteps::just(LoginToken::of("my-token"));
		let executor = executor(steps, StubTransport::default());
		let token = executor.login().await.expect("Static token pipeline should succeed.");

		assert_eq!(token.expose(), "my-token");
		assert!(executor.transport.requests().is_empty());
	}

	#[tokio::test]
	async fn supplier_with_login_map_produces_token() {
		let steps = AuthSteps::from_supplier(|| Ok(Json::String("my-token".into())))
			.login_map(|state| match state {
				Json::String(value) => Ok(LoginToken::of(value)),
				other => Err(format!("unexpected state {other}").into()),
			});
		let token = executor(steps, StubTransport::default())
			.login()
			.await
			.expect("Supplier pipeline should succeed.");

		assert_eq!(token.expose(), "my-token");
	}

	#[tokio::test]
	async fn steps_run_exactly_once_in_definition_order() {
		let sequence = Arc::new(Mutex::new(Vec::new()));
		let supplier_runs = Arc::new(AtomicU32::new(0));
		let steps = {
			let sequence_supply = sequence.clone();
			let sequence_map = sequence.clone();
			let sequence_tap = sequence.clone();
			let runs = supplier_runs.clone();

			AuthSteps::from_supplier(move || {
				runs.fetch_add(1, Ordering::Relaxed);
				sequence_supply.lock().push("supply");

				Ok(Json::String("seed".into()))
			})
			.map(move |state| {
				sequence_map.lock().push("map");

				Ok(state)
			})
			.tap(move |_| {
				sequence_tap.lock().push("tap");

				Ok(())
			})
			.login("auth/cert/login", [] as [&str; 0])
		};
		let transport = StubTransport::default().respond(200, login_response("tok", true, 10));

		executor(steps, transport).login().await.expect("Ordered pipeline should succeed.");

		assert_eq!(*sequence.lock(), ["supply", "map", "tap"]);
		assert_eq!(supplier_runs.load(Ordering::Relaxed), 1);
	}

	#[tokio::test]
	async fn reruns_are_independent() {
		let steps = AuthSteps::from_supplier(|| Ok(Json::String("seed".into())))
			.login("auth/cert/login", [] as [&str; 0]);
		let first = executor(
			steps.clone(),
			StubTransport::default().respond(200, login_response("one", false, 0)),
		);
		let second = executor(
			steps,
			StubTransport::default().respond(200, login_response("two", false, 0)),
		);
		let token_one = first.login().await.expect("First run should succeed.");
		let token_two = second.login().await.expect("Second run should succeed.");

		assert_eq!(token_one.expose(), "one");
		assert_eq!(token_two.expose(), "two");
	}

	#[tokio::test]
	async fn request_failure_carries_step_state_status_and_body() {
		let steps = AuthSteps::from_supplier(|| Ok(Json::String("seed".into())))
			.login("auth/cert/login", [] as [&str; 0]);
		let transport = StubTransport::default().respond(400, Json::String("denied".into()));
		let error = executor(steps, transport)
			.login()
			.await
			.expect_err("Non-2xx login should fail the pipeline.");

		match error {
			Error::Pipeline(PipelineError::Request { step, state, status, body }) => {
				assert_eq!(step, "Login POST auth/cert/login");
				assert_eq!(state, "\"seed\"");
				assert_eq!(status, 400);
				assert_eq!(body, "denied");
			},
			other => panic!("Expected a pipeline request error, got {other:?}."),
		}
	}

	#[tokio::test]
	async fn map_failure_is_tagged_with_the_failing_step() {
		let steps = AuthSteps::from_supplier(|| Ok(Json::Null))
			.map(|_| Err("broken transform".into()))
			.login("auth/cert/login", [] as [&str; 0]);
		let error = executor(steps, StubTransport::default())
			.login()
			.await
			.expect_err("Failing map should abort the pipeline.");

		match error {
			Error::Pipeline(PipelineError::Step { step, .. }) => assert_eq!(step, "Map"),
			other => panic!("Expected a pipeline step error, got {other:?}."),
		}
	}

	#[tokio::test]
	async fn intermediate_request_feeds_login_body() {
		let steps = AuthSteps::from_request(TransportRequest::get(
			"identity/document",
			[] as [&str; 0],
		))
		.map(|document| Ok(serde_json::json!({ "pkcs7": document })))
		.login("auth/{mount}/login", ["aws"]);
		let transport = StubTransport::default()
			.respond(200, Json::String("signed-document".into()))
			.respond(200, login_response("aws-token", true, 60));
		let executor = executor(steps, transport);
		let token = executor.login().await.expect("Two-request pipeline should succeed.");

		assert_eq!(token.expose(), "aws-token");

		let requests = executor.transport.requests();

		assert_eq!(requests.len(), 2);
		assert_eq!(requests[1].expanded_path(), "auth/aws/login");
		assert_eq!(
			requests[1].body,
			Some(serde_json::json!({ "pkcs7": "signed-document" }))
		);
	}

	#[tokio::test]
	async fn malformed_login_response_fails() {
		let steps = AuthSteps::just_request(TransportRequest::post(
			"auth/cert/login",
			[] as [&str; 0],
		));
		let transport = StubTransport::default().respond(200, serde_json::json!({ "data": {} }));
		let error = executor(steps, transport)
			.login()
			.await
			.expect_err("Login without an auth block should fail.");

		assert!(matches!(error, Error::Pipeline(PipelineError::MalformedToken { .. })));
	}
}
