//! Login methods expressed as pipeline factories.
//!
//! Every method is a plain factory producing an [`AuthSteps`] definition, so the session
//! manager can re-run the identical pipeline whenever it needs a fresh token. Methods must be
//! side-effect-idempotent for that reason.

// self
use crate::{
	_prelude::*,
	auth::{steps::AuthSteps, token::LoginToken},
	http::{TOKEN_HEADER, TransportRequest},
};

/// Factory for authentication pipelines.
pub trait AuthMethod: Send + Sync {
	/// Returns the pipeline definition for this method.
	fn steps(&self) -> AuthSteps;
}

/// Static token authentication: the externally supplied token is the credential.
#[derive(Clone, Debug)]
pub struct TokenAuth {
	token: LoginToken,
}
impl TokenAuth {
	/// Uses a plain token value with no lifecycle metadata.
	pub fn new(token: impl Into<String>) -> Self {
		Self { token: LoginToken::of(token) }
	}

	/// Uses a token that already carries TTL/renewability metadata.
	pub fn with_token(token: LoginToken) -> Self {
		Self { token }
	}
}
impl AuthMethod for TokenAuth {
	fn steps(&self) -> AuthSteps {
		AuthSteps::just(self.token.clone())
	}
}

/// Secret-id strategy for [`AppRoleAuth`].
///
/// One tagged type covers every way a secret id reaches the login call; the legacy plain-string
/// form is [`AppRoleSecretId::Provided`].
#[derive(Clone, Debug)]
pub enum AppRoleSecretId {
	/// Static secret id supplied by configuration.
	Provided(String),
	/// Pull mode: obtain a fresh secret id from the role endpoint using an initial token.
	Pull {
		/// Token authorized to generate secret ids for the role.
		initial_token: String,
	},
	/// Role is configured with `bind_secret_id=false`; no secret id is sent.
	Absent,
}

/// AppRole authentication: logs in with a role id and an optional secret id.
#[derive(Clone, Debug)]
pub struct AppRoleAuth {
	mount: String,
	role: String,
	role_id: String,
	secret_id: AppRoleSecretId,
}
impl AppRoleAuth {
	const DEFAULT_MOUNT: &'static str = "approle";

	/// Creates an AppRole method for the provided role name and role id.
	pub fn new(
		role: impl Into<String>,
		role_id: impl Into<String>,
		secret_id: AppRoleSecretId,
	) -> Self {
		Self {
			mount: Self::DEFAULT_MOUNT.into(),
			role: role.into(),
			role_id: role_id.into(),
			secret_id,
		}
	}

	/// Overrides the auth mount path (defaults to `approle`).
	pub fn with_mount(mut self, mount: impl Into<String>) -> Self {
		self.mount = mount.into();

		self
	}
}
impl AuthMethod for AppRoleAuth {
	fn steps(&self) -> AuthSteps {
		let role_id = self.role_id.clone();

		match &self.secret_id {
			AppRoleSecretId::Provided(secret_id) => {
				let secret_id = secret_id.clone();

				AuthSteps::from_supplier(move || {
					Ok(serde_json::json!({ "role_id": role_id, "secret_id": secret_id }))
				})
				.login("auth/{mount}/login", [self.mount.clone()])
			},
			AppRoleSecretId::Pull { initial_token } => AuthSteps::from_request(
				TransportRequest::post("auth/{mount}/role/{role}/secret-id", [
					self.mount.clone(),
					self.role.clone(),
				])
				.with_header(TOKEN_HEADER, initial_token.clone())
				.with_body(Json::Null),
			)
			.map(move |response| {
				let secret_id = response
					.pointer("/data/secret_id")
					.and_then(Json::as_str)
					.ok_or("secret-id response is missing data.secret_id")?;

				Ok(serde_json::json!({ "role_id": role_id, "secret_id": secret_id }))
			})
			.login("auth/{mount}/login", [self.mount.clone()]),
			AppRoleSecretId::Absent => AuthSteps::from_supplier(move || {
				Ok(serde_json::json!({ "role_id": role_id }))
			})
			.login("auth/{mount}/login", [self.mount.clone()]),
		}
	}
}
