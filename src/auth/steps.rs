//! Declarative login pipelines composed from lazily evaluated steps.
//!
//! A pipeline consists of a source (a constant, a supplier, or a request), zero or more
//! intermediate operations ([`Node::map`], [`Node::tap`], [`Node::request`]), and a terminal
//! `login*` operation that finishes the composition. Building a pipeline performs no I/O;
//! computation only happens when the definition is interpreted by
//! [`AuthStepsExecutor`](crate::auth::AuthStepsExecutor). Terminal operations return
//! [`AuthSteps`], which offers no further chaining, so every graph carries exactly one
//! terminal step by construction.
//!
//! ```
//! use lease_broker::{auth::AuthSteps, http::TransportRequest};
//!
//! let steps = AuthSteps::from_request(TransportRequest::get("identity/document", [] as [&str; 0]))
//! 	.map(|document| Ok(serde_json::json!({ "signed": document })))
//! 	.login("auth/{mount}/login", ["aws"]);
//! ```

// self
use crate::{_prelude::*, auth::token::LoginToken, error::BoxError, http::TransportRequest};

/// Fallible supplier producing the initial pipeline state.
pub type SupplierFn = Arc<dyn Fn() -> Result<Json, BoxError> + Send + Sync>;
/// Fallible transform applied to the pipeline state.
pub type MapFn = Arc<dyn Fn(Json) -> Result<Json, BoxError> + Send + Sync>;
/// Side-effecting callback observing the pipeline state.
pub type TapFn = Arc<dyn Fn(&Json) -> Result<(), BoxError> + Send + Sync>;
/// Terminal transform producing the login credential from the pipeline state.
pub type LoginFn = Arc<dyn Fn(Json) -> Result<LoginToken, BoxError> + Send + Sync>;

/// Single operation within a pipeline definition.
#[derive(Clone)]
pub(crate) enum Step {
	/// Source step invoking a supplier.
	Supply(SupplierFn),
	/// Request step exchanging the state (or a fixed body) against the transport.
	Request(TransportRequest),
	/// Pure transform of the state.
	Map(MapFn),
	/// Side-effect callback; the state passes through unchanged.
	Tap(TapFn),
	/// Terminal request yielding a login credential.
	LoginRequest(TransportRequest),
	/// Terminal transform yielding a login credential.
	LoginMap(LoginFn),
}
impl Display for Step {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Step::Supply(_) => f.write_str("Supplier"),
			Step::Request(request) => write!(f, "{request}"),
			Step::Map(_) => f.write_str("Map"),
			Step::Tap(_) => f.write_str("Tap"),
			Step::LoginRequest(request) => write!(f, "Login {request}"),
			Step::LoginMap(_) => f.write_str("Login Map"),
		}
	}
}
impl Debug for Step {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Step({self})")
	}
}

/// Intermediate pipeline node; each node keeps a reference to its predecessor.
///
/// The chain is acyclic and singly linked backward: chaining is O(1) and nodes are immutable
/// once constructed, so a node can be reused as the prefix of several pipelines.
#[derive(Clone)]
pub struct Node {
	inner: Arc<NodeInner>,
}
struct NodeInner {
	step: Step,
	previous: Option<Node>,
}
impl Node {
	fn source(step: Step) -> Self {
		Self { inner: Arc::new(NodeInner { step, previous: None }) }
	}

	fn chain(&self, step: Step) -> Self {
		Self { inner: Arc::new(NodeInner { step, previous: Some(self.clone()) }) }
	}

	/// Transforms the state object into a different object.
	pub fn map<F>(&self, transform: F) -> Self
	where
		F: Fn(Json) -> Result<Json, BoxError> + Send + Sync + 'static,
	{
		self.chain(Step::Map(Arc::new(transform)))
	}

	/// Registers a callback invoked with the current state; the state is unchanged.
	pub fn tap<F>(&self, callback: F) -> Self
	where
		F: Fn(&Json) -> Result<(), BoxError> + Send + Sync + 'static,
	{
		self.chain(Step::Tap(Arc::new(callback)))
	}

	/// Requests data using the provided request definition.
	pub fn request(&self, request: TransportRequest) -> Self {
		self.chain(Step::Request(request))
	}

	/// Terminal operation posting the current state to the login endpoint.
	pub fn login(
		&self,
		uri_template: impl Into<String>,
		uri_variables: impl IntoIterator<Item: Into<String>>,
	) -> AuthSteps {
		self.login_request(TransportRequest::post(uri_template, uri_variables))
	}

	/// Terminal operation issuing the provided request with the current state as body.
	pub fn login_request(&self, request: TransportRequest) -> AuthSteps {
		AuthSteps::materialize(self.chain(Step::LoginRequest(request)))
	}

	/// Terminal operation deriving the credential from the current state.
	pub fn login_map<F>(&self, transform: F) -> AuthSteps
	where
		F: Fn(Json) -> Result<LoginToken, BoxError> + Send + Sync + 'static,
	{
		AuthSteps::materialize(self.chain(Step::LoginMap(Arc::new(transform))))
	}
}
impl Debug for Node {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Node").field("step", &self.inner.step).finish()
	}
}

/// Finished, immutable pipeline definition interpreted by an executor.
#[derive(Clone)]
pub struct AuthSteps {
	steps: Vec<Step>,
}
impl AuthSteps {
	/// Creates a single-step pipeline yielding the provided credential.
	pub fn just(token: LoginToken) -> Self {
		Self { steps: vec![Step::LoginMap(Arc::new(move |_| Ok(token.clone())))] }
	}

	/// Creates a single-step pipeline issuing the provided login request.
	pub fn just_request(request: TransportRequest) -> Self {
		Self { steps: vec![Step::LoginRequest(request)] }
	}

	/// Starts a composition from a supplier.
	pub fn from_supplier<F>(supplier: F) -> Node
	where
		F: Fn() -> Result<Json, BoxError> + Send + Sync + 'static,
	{
		Node::source(Step::Supply(Arc::new(supplier)))
	}

	/// Starts a composition from a request definition.
	pub fn from_request(request: TransportRequest) -> Node {
		Node::source(Step::Request(request))
	}

	// Reconstructs definition order by walking backward from the terminal node and reversing.
	fn materialize(terminal: Node) -> Self {
		let mut steps = Vec::new();
		let mut current = Some(terminal);

		while let Some(node) = current {
			steps.push(node.inner.step.clone());
			current = node.inner.previous.clone();
		}

		steps.reverse();

		Self { steps }
	}

	/// Number of steps in definition order, terminal included.
	pub fn len(&self) -> usize {
		self.steps.len()
	}

	/// Returns `true` for a pipeline with no steps; never produced by the builder API.
	pub fn is_empty(&self) -> bool {
		self.steps.is_empty()
	}

	pub(crate) fn iter(&self) -> impl Iterator<Item = &Step> {
		self.steps.iter()
	}
}
impl Debug for AuthSteps {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthSteps").field("steps", &self.steps).finish()
	}
}
