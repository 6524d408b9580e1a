use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use warden_core::auth::{self, RequestContext};
use warden_core::error::AuthError;
use warden_core::AppState;
use warden_db::users::UserRow;
use warden_util::validation;

use crate::error::ApiError;

pub const REFRESH_COOKIE_NAME: &str = "warden_refresh";
const REFRESH_COOKIE_PATH: &str = "/auth";

fn build_refresh_cookie(token: &str, ttl_seconds: u64, secure: bool) -> String {
    let secure_attr = if secure { "; Secure" } else { "" };
    format!(
        "{name}={value}; HttpOnly; Path={path}; SameSite=Lax; Max-Age={max_age}{secure}",
        name = REFRESH_COOKIE_NAME,
        value = token,
        path = REFRESH_COOKIE_PATH,
        max_age = ttl_seconds,
        secure = secure_attr,
    )
}

fn build_refresh_cookie_clear(secure: bool) -> String {
    let secure_attr = if secure { "; Secure" } else { "" };
    format!(
        "{name}=; HttpOnly; Path={path}; SameSite=Lax; Max-Age=0{secure}",
        name = REFRESH_COOKIE_NAME,
        path = REFRESH_COOKIE_PATH,
        secure = secure_attr,
    )
}

fn get_cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        let trimmed = part.trim();
        let Some((name, value)) = trimmed.split_once('=') else {
            continue;
        };
        if name == cookie_name {
            return Some(value.to_string());
        }
    }
    None
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("invalid header value: {}", e)))
}

fn request_context(headers: &HeaderMap, peer: SocketAddr) -> RequestContext {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    RequestContext {
        ip: Some(peer.ip().to_string()),
        user_agent,
    }
}

/// Uniform 401 for any unusable refresh token; the stale cookie is dropped
/// so clients stop replaying it.
fn invalid_session_response(secure: bool) -> Response {
    let mut response = ApiError::InvalidSession.into_response();
    if let Ok(value) = HeaderValue::from_str(&build_refresh_cookie_clear(secure)) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

fn validate_credentials(email: &str, password: &str) -> Result<(), ApiError> {
    validation::validate_email(email)
        .map_err(|_| ApiError::Validation("invalid email address".into()))?;
    validation::validate_password(password)
        .map_err(|e| ApiError::Validation(format!("invalid password: {e}")))?;
    Ok(())
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub email: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub role: String,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&UserRow> for UserView {
    fn from(user: &UserRow) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserView,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_credentials(&body.email, &body.password)?;
    let user = auth::register(&state, &body.email, &body.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            email: user.email,
            role: user.role,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_credentials(&body.email, &body.password)?;
    let ctx = request_context(&headers, addr);
    let issued = auth::login(&state, &body.email, &body.password, &ctx).await?;

    let cookie = build_refresh_cookie(
        &issued.refresh_token,
        state.config.refresh_token_ttl_seconds,
        state.config.cookie_secure,
    );
    Ok((
        AppendHeaders([(header::SET_COOKIE, header_value(&cookie)?)]),
        Json(AuthResponse {
            access_token: issued.access_token,
            user: UserView::from(&issued.user),
        }),
    ))
}

pub async fn refresh(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let Some(raw) = get_cookie_value(&headers, REFRESH_COOKIE_NAME) else {
        return Ok(invalid_session_response(state.config.cookie_secure));
    };

    let ctx = request_context(&headers, addr);
    match auth::refresh(&state, &raw, &ctx).await {
        Ok(issued) => {
            let cookie = build_refresh_cookie(
                &issued.refresh_token,
                state.config.refresh_token_ttl_seconds,
                state.config.cookie_secure,
            );
            Ok((
                AppendHeaders([(header::SET_COOKIE, header_value(&cookie)?)]),
                Json(AuthResponse {
                    access_token: issued.access_token,
                    user: UserView::from(&issued.user),
                }),
            )
                .into_response())
        }
        Err(AuthError::InvalidSession) => Ok(invalid_session_response(state.config.cookie_secure)),
        Err(e) => Err(e.into()),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(raw) = get_cookie_value(&headers, REFRESH_COOKIE_NAME) {
        auth::logout(&state, &raw).await?;
    }
    let clear = build_refresh_cookie_clear(state.config.cookie_secure);
    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, header_value(&clear)?)]),
    ))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_email(body.email.trim())
        .map_err(|_| ApiError::Validation("invalid email address".into()))?;
    let ctx = request_context(&headers, addr);
    auth::forgot_password(&state, &body.email, &ctx).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "If the account exists, password reset instructions were sent."
        })),
    ))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.token.len() < 10 {
        return Err(ApiError::Validation("invalid token".into()));
    }
    validation::validate_password(&body.password)
        .map_err(|e| ApiError::Validation(format!("invalid password: {e}")))?;

    auth::reset_password(&state, &body.token, &body.password).await?;

    // Any refresh cookie the caller still holds points at a revoked session.
    let clear = build_refresh_cookie_clear(state.config.cookie_secure);
    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, header_value(&clear)?)]),
    ))
}

#[cfg(test)]
mod tests {
    use super::{build_refresh_cookie, get_cookie_value, REFRESH_COOKIE_NAME};
    use axum::http::{header, HeaderMap, HeaderValue};

    #[test]
    fn refresh_cookie_roundtrip_parsing_works() {
        let cookie = build_refresh_cookie("token-value", 604800, true);
        let mut headers = HeaderMap::new();
        let header_val = HeaderValue::from_str(&cookie).expect("cookie header value");
        headers.insert(header::COOKIE, header_val);
        let parsed = get_cookie_value(&headers, REFRESH_COOKIE_NAME);
        assert_eq!(parsed.as_deref(), Some("token-value"));
    }

    #[test]
    fn cookie_is_scoped_and_http_only() {
        let cookie = build_refresh_cookie("t", 60, false);
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Path=/auth"));
        assert!(!cookie.contains("Secure"));
        assert!(build_refresh_cookie("t", 60, true).contains("Secure"));
    }
}
