use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::auth::AuthError;
use crate::repo::RepoError;
use crate::scorer::ScorerError;
use crate::validate::ValidationError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("scoring service unavailable")]
    ScorerUnavailable,
    #[error("scoring service returned a malformed response")]
    ScorerMalformed,
    #[error("auth service unavailable")]
    AuthUnavailable,
    #[error("too many requests")]
    RateLimited,
    #[error("internal error")]
    Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Internal(detail) => {
                tracing::error!(%detail, "persistence failure");
                ApiError::Internal
            }
        }
    }
}

impl From<ScorerError> for ApiError {
    fn from(e: ScorerError) -> Self {
        match e {
            ScorerError::Unavailable(detail) => {
                tracing::warn!(%detail, "scorer unavailable");
                ApiError::ScorerUnavailable
            }
            ScorerError::Malformed(detail) => {
                tracing::error!(%detail, "scorer returned malformed response");
                ApiError::ScorerMalformed
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Rejected(msg) => ApiError::BadRequest(msg),
            AuthError::Unavailable(detail) => {
                tracing::warn!(%detail, "auth provider unavailable");
                ApiError::AuthUnavailable
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::Validation(ValidationError::FileTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::ScorerUnavailable | ApiError::AuthUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::ScorerMalformed => StatusCode::BAD_GATEWAY,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
