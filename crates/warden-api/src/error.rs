use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use warden_core::error::AuthError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("too many failed attempts")]
    RateLimited { retry_after_seconds: i64 },
    #[error("invalid or expired session")]
    InvalidSession,
    #[error("invalid or expired token")]
    InvalidResetToken,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found")]
    NotFound,
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::InvalidCredentials => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::RateLimited {
                retry_after_seconds,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                format!("too many failed attempts, try again in {retry_after_seconds}s"),
            ),
            ApiError::InvalidSession => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::InvalidResetToken => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::Internal(err) => {
                tracing::error!("API internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let mut response =
            (status, Json(json!({ "error": message, "message": message }))).into_response();
        if let ApiError::RateLimited {
            retry_after_seconds,
        } = self
        {
            if let Ok(value) = header::HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::RateLimited {
                retry_after_seconds,
            } => ApiError::RateLimited {
                retry_after_seconds,
            },
            AuthError::InvalidSession | AuthError::InvalidToken => ApiError::InvalidSession,
            AuthError::InvalidResetToken => ApiError::InvalidResetToken,
            AuthError::EmailTaken => ApiError::Conflict("email already registered".into()),
            AuthError::Database(_) => ApiError::Internal(anyhow::anyhow!("database error")),
            AuthError::Internal(msg) => ApiError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl From<warden_db::DbError> for ApiError {
    fn from(e: warden_db::DbError) -> Self {
        match e {
            warden_db::DbError::NotFound => ApiError::NotFound,
            warden_db::DbError::Sqlx(_) => ApiError::Internal(anyhow::anyhow!("database error")),
        }
    }
}
