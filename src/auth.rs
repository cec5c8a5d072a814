use std::env;
use std::future::{ready, Ready};
use std::time::Duration;

use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Investor,
    Regulator,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "investor" => Some(Role::Investor),
            "regulator" => Some(Role::Regulator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    pub exp: usize,
}

/// Validate a session JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Extractor yielding validated `Claims`.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            match decode_jwt(bearer.token()) {
                Ok(claims) => return ready(Ok(Auth(claims))),
                Err(_) => return ready(Err(actix_web::error::ErrorUnauthorized("Invalid JWT"))),
            }
        }
        ready(Err(actix_web::error::ErrorUnauthorized(
            "Authorization required",
        )))
    }
}

/// Mint a session JWT after a successful provider sign-in.
pub fn create_jwt(
    user_id: &str,
    email: &str,
    role: Role,
) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

// ---------------- External auth provider ----------------

#[derive(thiserror::Error, Debug, Clone)]
pub enum AuthError {
    /// The provider refused the credentials or request (4xx). The message is
    /// surfaced to the client.
    #[error("{0}")]
    Rejected(String),
    /// The provider is unreachable or failing.
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    pub email: String,
}

/// What a successful signup/login yields. Signup may not carry a token when
/// the provider requires email confirmation first.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: Option<String>,
    pub user: ProviderUser,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError>;
    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}

/// Email/password provider over HTTP (GoTrue-style endpoints).
pub struct HttpAuthProvider {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

impl HttpAuthProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url: base_url.into().trim_end_matches('/').to_string(), http })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("AUTH_BASE_URL")
            .map_err(|_| anyhow::anyhow!("AUTH_BASE_URL must be set"))?;
        Self::new(base_url, Duration::from_secs(10))
    }

    async fn session_request(
        &self,
        url: String,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let resp = self
            .http
            .post(url)
            .json(&Credentials { email, password })
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if status.is_client_error() {
            return Err(AuthError::Rejected(provider_message(resp).await));
        }
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!("status {status}")));
        }
        resp.json::<AuthSession>()
            .await
            .map_err(|e| AuthError::Unavailable(format!("bad provider response: {e}")))
    }
}

/// Best-effort extraction of the provider's human-readable error message.
async fn provider_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<serde_json::Value>().await {
        Ok(body) => body
            .get("msg")
            .or_else(|| body.get("error_description"))
            .or_else(|| body.get("message"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("auth provider rejected request ({status})")),
        Err(_) => format!("auth provider rejected request ({status})"),
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.session_request(format!("{}/signup", self.base_url), email, password)
            .await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.session_request(
            format!("{}/token?grant_type=password", self.base_url),
            email,
            password,
        )
        .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let resp = self
            .http
            .post(format!("{}/logout", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;
        let status = resp.status();
        if status.is_client_error() {
            return Err(AuthError::Rejected(provider_message(resp).await));
        }
        if !status.is_success() {
            return Err(AuthError::Unavailable(format!("status {status}")));
        }
        Ok(())
    }
}
