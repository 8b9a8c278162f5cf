//! Immutable credential models and the login-response parser.

// self
use crate::{_prelude::*, error::PipelineError};

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Bare bearer credential with no lifecycle metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
	secret: TokenSecret,
}
impl Token {
	/// Wraps a token value.
	pub fn new(value: impl Into<String>) -> Self {
		Self { secret: TokenSecret::new(value) }
	}

	/// Returns the redacting secret wrapper.
	pub fn secret(&self) -> &TokenSecret {
		&self.secret
	}

	/// Returns the raw token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.secret.expose()
	}
}

/// Login credential carrying TTL and renewability metadata; participates in scheduling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginToken {
	token: Token,
	ttl: Duration,
	renewable: bool,
	accessor: Option<String>,
	issued_at: OffsetDateTime,
}
impl LoginToken {
	/// Creates a non-expiring, non-renewable login token.
	pub fn of(token: impl Into<String>) -> Self {
		Self::with_ttl(token, Duration::ZERO, false)
	}

	/// Creates a renewable login token with the provided time-to-live.
	pub fn renewable(token: impl Into<String>, ttl: Duration) -> Self {
		Self::with_ttl(token, ttl, true)
	}

	/// Creates a login token with explicit TTL and renewability.
	pub fn with_ttl(token: impl Into<String>, ttl: Duration, renewable: bool) -> Self {
		Self {
			token: Token::new(token),
			ttl,
			renewable,
			accessor: None,
			issued_at: OffsetDateTime::now_utc(),
		}
	}

	/// Parses a login token from the service's `auth` response block.
	pub fn from_login_response(body: &Json) -> Result<Self, PipelineError> {
		let response: LoginResponse = serde_path_to_error::deserialize(body.clone())
			.map_err(|source| PipelineError::MalformedToken { source })?;
		let auth = response.auth;

		Ok(Self {
			token: Token::new(auth.client_token),
			ttl: Duration::seconds(auth.lease_duration.min(i64::MAX as u64) as i64),
			renewable: auth.renewable,
			accessor: auth.accessor,
			issued_at: OffsetDateTime::now_utc(),
		})
	}

	/// Returns the wrapped bearer credential.
	pub fn token(&self) -> &Token {
		&self.token
	}

	/// Returns the raw token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.token.expose()
	}

	/// Returns the time-to-live granted at login or last renewal.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Returns `true` if the credential can be renewed in place.
	pub fn is_renewable(&self) -> bool {
		self.renewable
	}

	/// Returns the token accessor, when the service issued one.
	pub fn accessor(&self) -> Option<&str> {
		self.accessor.as_deref()
	}

	/// Returns the instant the credential was issued or last renewed.
	pub fn issued_at(&self) -> OffsetDateTime {
		self.issued_at
	}

	/// Expiry instant derived from the TTL; `None` for non-expiring tokens.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		if self.ttl.is_zero() { None } else { Some(self.issued_at + self.ttl) }
	}

	/// Returns `true` if the credential has outlived its TTL at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at().is_some_and(|expiry| instant >= expiry)
	}

	/// Returns a copy of the credential re-stamped with a freshly granted TTL.
	pub(crate) fn renewed(&self, ttl: Duration, renewable: bool) -> Self {
		Self {
			token: self.token.clone(),
			ttl,
			renewable,
			accessor: self.accessor.clone(),
			issued_at: OffsetDateTime::now_utc(),
		}
	}
}

#[derive(Deserialize)]
struct LoginResponse {
	auth: AuthBlock,
}
#[derive(Deserialize)]
struct AuthBlock {
	client_token: String,
	#[serde(default)]
	renewable: bool,
	#[serde(default)]
	lease_duration: u64,
	#[serde(default)]
	accessor: Option<String>,
}
