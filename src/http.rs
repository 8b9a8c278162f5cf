//! Transport primitives for secret-service exchanges.
//!
//! The module exposes [`SecretTransport`] as the broker's only dependency on an HTTP stack:
//! a single request/response exchange described by method, URI template + variables, headers,
//! and an optional JSON body. [`AuthorizedTransport`] decorates any transport with a bearer
//! token obtained from a [`TokenSource`], which is how the lease registry rides on the session
//! manager's current login token.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Header carrying the bearer token on authorized requests.
pub const TOKEN_HEADER: &str = "X-Vault-Token";

/// Boxed future returned by [`SecretTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + 'a + Send>>;
/// Boxed future returned by [`TokenSource::token_secret`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenSecret>> + 'a + Send>>;

pub use crate::error::TransportError;

/// Abstraction over HTTP transports capable of executing a single secret-service exchange.
///
/// Implementations own connection pooling, serialization, and timeouts; the broker core only
/// sees the request shape and a parsed response. Every call is subject to the transport's own
/// timeout, so no broker operation blocks unboundedly. Implementations must be
/// `Send + Sync + 'static` so schedulers can share them across background tasks.
pub trait SecretTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes one request/response exchange.
	///
	/// Non-2xx responses are returned as [`TransportResponse`] values so callers can attribute
	/// failures with status and body; [`TransportError`] is reserved for failures that produced
	/// no response at all.
	fn send(&self, request: TransportRequest) -> TransportFuture<'_>;
}
impl<T> SecretTransport for Arc<T>
where
	T: ?Sized + SecretTransport,
{
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		(**self).send(request)
	}
}

/// HTTP method subset used by the broker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestMethod {
	/// HTTP GET.
	Get,
	/// HTTP POST.
	Post,
	/// HTTP PUT.
	Put,
	/// HTTP DELETE.
	Delete,
}
impl RequestMethod {
	/// Returns the canonical wire label.
	pub const fn as_str(self) -> &'static str {
		match self {
			RequestMethod::Get => "GET",
			RequestMethod::Post => "POST",
			RequestMethod::Put => "PUT",
			RequestMethod::Delete => "DELETE",
		}
	}
}
impl Display for RequestMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Value object describing a single request: method, URI template + variables, headers, body.
///
/// Templates use positional `{name}` placeholders expanded from `uri_variables`, e.g.
/// `TransportRequest::post("auth/{mount}/login", ["approle"])`.
#[derive(Clone, Debug)]
pub struct TransportRequest {
	/// HTTP method.
	pub method: RequestMethod,
	/// URI template with `{placeholder}` markers.
	pub uri_template: String,
	/// Positional values substituted into the template.
	pub uri_variables: Vec<String>,
	/// Additional request headers.
	pub headers: Vec<(String, String)>,
	/// Optional JSON body; when absent, executors may substitute the pipeline state.
	pub body: Option<Json>,
}
impl TransportRequest {
	fn new(
		method: RequestMethod,
		uri_template: impl Into<String>,
		uri_variables: impl IntoIterator<Item: Into<String>>,
	) -> Self {
		Self {
			method,
			uri_template: uri_template.into(),
			uri_variables: uri_variables.into_iter().map(Into::into).collect(),
			headers: Vec::new(),
			body: None,
		}
	}

	/// Builder entry point for a `GET` request.
	pub fn get(
		uri_template: impl Into<String>,
		uri_variables: impl IntoIterator<Item: Into<String>>,
	) -> Self {
		Self::new(RequestMethod::Get, uri_template, uri_variables)
	}

	/// Builder entry point for a `POST` request.
	pub fn post(
		uri_template: impl Into<String>,
		uri_variables: impl IntoIterator<Item: Into<String>>,
	) -> Self {
		Self::new(RequestMethod::Post, uri_template, uri_variables)
	}

	/// Builder entry point for a `PUT` request.
	pub fn put(
		uri_template: impl Into<String>,
		uri_variables: impl IntoIterator<Item: Into<String>>,
	) -> Self {
		Self::new(RequestMethod::Put, uri_template, uri_variables)
	}

	/// Attaches a header to the request.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Attaches a fixed JSON body to the request.
	pub fn with_body(mut self, body: Json) -> Self {
		self.body = Some(body);

		self
	}

	/// Expands the URI template by substituting placeholders with the positional variables.
	///
	/// Placeholders without a matching variable are left untouched so the unresolved template
	/// shows up verbatim in transport logs.
	pub fn expanded_path(&self) -> String {
		let mut path = String::with_capacity(self.uri_template.len());
		let mut variables = self.uri_variables.iter();
		let mut rest = self.uri_template.as_str();

		while let Some(open) = rest.find('{') {
			path.push_str(&rest[..open]);

			match rest[open..].find('}') {
				Some(close) => {
					match variables.next() {
						Some(value) => path.push_str(value),
						None => path.push_str(&rest[open..open + close + 1]),
					}

					rest = &rest[open + close + 1..];
				},
				None => {
					path.push_str(&rest[open..]);
					rest = "";
				},
			}
		}

		path.push_str(rest);

		path
	}
}
impl Display for TransportRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{} {}", self.method, self.uri_template)
	}
}

/// Parsed response from a [`SecretTransport`] exchange.
#[derive(Clone, Debug)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: u16,
	/// Parsed JSON body; non-JSON payloads surface as a JSON string.
	pub body: Json,
}
impl TransportResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Renders the body for error attribution.
	pub fn body_text(&self) -> String {
		match &self.body {
			Json::String(text) => text.clone(),
			other => other.to_string(),
		}
	}
}

/// Supplies the current bearer token for authorized requests.
///
/// The session manager implements this trait so the lease registry consumes its login token
/// without seeing the session machinery; static tokens are covered by [`StaticTokenSource`].
pub trait TokenSource: Send + Sync {
	/// Returns the token to attach to the next request.
	fn token_secret(&self) -> TokenFuture<'_>;
}

/// [`TokenSource`] backed by a fixed token, for externally managed credentials.
#[derive(Clone)]
pub struct StaticTokenSource(TokenSecret);
impl StaticTokenSource {
	/// Wraps a fixed token value.
	pub fn new(token: impl Into<String>) -> Self {
		Self(TokenSecret::new(token))
	}
}
impl TokenSource for StaticTokenSource {
	fn token_secret(&self) -> TokenFuture<'_> {
		let token = self.0.clone();

		Box::pin(async move { Ok(token) })
	}
}
impl Debug for StaticTokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("StaticTokenSource").field(&"<redacted>").finish()
	}
}

/// Transport decorator that stamps each request with the current token from a [`TokenSource`].
pub struct AuthorizedTransport<C>
where
	C: ?Sized + SecretTransport,
{
	inner: Arc<C>,
	source: Arc<dyn TokenSource>,
}
impl<C> AuthorizedTransport<C>
where
	C: ?Sized + SecretTransport,
{
	/// Decorates `inner` so every request carries the token supplied by `source`.
	pub fn new(inner: impl Into<Arc<C>>, source: Arc<dyn TokenSource>) -> Self {
		Self { inner: inner.into(), source }
	}
}
impl<C> SecretTransport for AuthorizedTransport<C>
where
	C: ?Sized + SecretTransport,
{
	fn send(&self, mut request: TransportRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let token =
				self.source.token_secret().await.map_err(TransportError::token_source)?;

			request.headers.push((TOKEN_HEADER.into(), token.expose().into()));

			self.inner.send(request).await
		})
	}
}

/// Reqwest-backed [`SecretTransport`] bound to a service base URL.
///
/// Responses are parsed as JSON when possible; plain-text payloads (e.g. identity documents
/// fetched during login flows) surface as JSON strings so pipelines can transform them.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	base: Url,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Creates a transport with a default reqwest client.
	pub fn new(base: Url) -> Self {
		Self::with_client(ReqwestClient::default(), base)
	}

	/// Wraps an existing reqwest client; configure timeouts on the client itself, as the broker
	/// relies on the transport's own timeout for every call.
	pub fn with_client(client: ReqwestClient, base: Url) -> Self {
		Self { client, base }
	}
}
#[cfg(feature = "reqwest")]
impl SecretTransport for ReqwestTransport {
	fn send(&self, request: TransportRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let url = self
				.base
				.join(request.expanded_path().trim_start_matches('/'))
				.map_err(TransportError::network)?;
			let mut builder = match request.method {
				RequestMethod::Get => self.client.get(url),
				RequestMethod::Post => self.client.post(url),
				RequestMethod::Put => self.client.put(url),
				RequestMethod::Delete => self.client.delete(url),
			};

			for (name, value) in &request.headers {
				builder = builder.header(name, value);
			}
			if let Some(body) = &request.body {
				builder = builder.json(body);
			}

			let response = builder.send().await.map_err(TransportError::network)?;
			let status = response.status().as_u16();
			let text = response.text().await.map_err(TransportError::network)?;
			let body = if text.is_empty() {
				Json::Null
			} else {
				serde_json::from_str(&text).unwrap_or(Json::String(text))
			};

			Ok(TransportResponse { status, body })
		})
	}
}
