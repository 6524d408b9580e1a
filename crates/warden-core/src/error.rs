use thiserror::Error;
use warden_db::DbError;

/// Domain error taxonomy. Outcomes that could leak account state are
/// deliberately coarse: unknown email, wrong password and inactive account
/// all collapse into `InvalidCredentials`, and every way a session or reset
/// token can be unusable collapses into a single variant each.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("too many failed attempts")]
    RateLimited { retry_after_seconds: i64 },
    #[error("invalid or expired session")]
    InvalidSession,
    #[error("invalid or expired token")]
    InvalidResetToken,
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid token")]
    InvalidToken,
    #[error("database error")]
    Database(#[from] DbError),
    #[error("internal error: {0}")]
    Internal(String),
}
