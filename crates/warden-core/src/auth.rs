//! Transport-agnostic auth operations: each function here is one exposed
//! operation of the service, composed from the credential verifier, token
//! codec, throttle policy and the session ledger.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::AuthError;
use crate::token::{self, RESET_TOKEN_BYTES, SESSION_TOKEN_BYTES};
use crate::{password, throttle, AppState, Role};
use warden_db::sessions::SessionRow;
use warden_db::users::UserRow;
use warden_db::{login_attempts, reset_tokens, sessions, users};

/// Request-scoped metadata recorded with sessions, attempts and reset tokens.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Result of a successful login or refresh. The raw refresh token leaves the
/// process exactly once, through this struct; only its fingerprint is stored.
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub session: SessionRow,
    pub user: UserRow,
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

pub async fn register(
    state: &AppState,
    email: &str,
    password_raw: &str,
) -> Result<UserRow, AuthError> {
    let email = normalize_email(email);
    if users::get_user_by_email(&state.db, &email).await?.is_some() {
        return Err(AuthError::EmailTaken);
    }

    let hash = password::hash_password(password_raw, &state.config.token_pepper)?;
    match users::create_user(
        &state.db,
        &Uuid::new_v4().to_string(),
        &email,
        &hash,
        Role::User.as_str(),
        Utc::now(),
    )
    .await
    {
        Ok(user) => Ok(user),
        // Two registrations racing past the existence check: the unique
        // index on email decides, and the loser sees a normal conflict.
        Err(e) if e.is_unique_violation() => Err(AuthError::EmailTaken),
        Err(e) => Err(e.into()),
    }
}

pub async fn login(
    state: &AppState,
    email: &str,
    password_raw: &str,
    ctx: &RequestContext,
) -> Result<IssuedSession, AuthError> {
    let email = normalize_email(email);
    let now = Utc::now();

    let recent = login_attempts::recent_for_email(
        &state.db,
        &email,
        throttle::window_start(now),
        throttle::MAX_TRACKED_ATTEMPTS,
    )
    .await?;
    if let Some(wait) = throttle::retry_delay(&recent, now) {
        record_attempt(state, &email, None, ctx, false).await?;
        return Err(AuthError::RateLimited {
            retry_after_seconds: wait,
        });
    }

    let user = users::get_user_by_email(&state.db, &email).await?;
    let user = match user {
        Some(u) if u.is_active => u,
        other => {
            // Unknown email and deactivated account record the attempt and
            // answer exactly like a wrong password.
            let user_id = other.map(|u| u.id);
            record_attempt(state, &email, user_id.as_deref(), ctx, false).await?;
            return Err(AuthError::InvalidCredentials);
        }
    };

    let valid = password::verify_password(
        password_raw,
        &state.config.token_pepper,
        &user.password_hash,
    )?;
    record_attempt(state, &email, Some(&user.id), ctx, valid).await?;
    if !valid {
        return Err(AuthError::InvalidCredentials);
    }

    let issued = issue_session(state, user, ctx).await?;
    users::touch_last_login(&state.db, &issued.user.id, Utc::now()).await?;
    Ok(issued)
}

pub async fn refresh(
    state: &AppState,
    raw_refresh: &str,
    ctx: &RequestContext,
) -> Result<IssuedSession, AuthError> {
    let fingerprint = token::token_fingerprint(raw_refresh, &state.config.token_pepper);
    let now = Utc::now();
    let Some(current) = sessions::find_live_by_token_hash(&state.db, &fingerprint, now).await?
    else {
        return Err(AuthError::InvalidSession);
    };

    let user = users::get_user_by_id(&state.db, &current.user_id).await?;
    let user = match user {
        Some(u) if u.is_active => u,
        _ => {
            sessions::revoke_session(&state.db, &current.id, Utc::now()).await?;
            return Err(AuthError::InvalidSession);
        }
    };

    let role: Role = user.role.parse()?;
    let raw_token = token::generate_opaque_token(SESSION_TOKEN_BYTES);
    let new_fingerprint = token::token_fingerprint(&raw_token, &state.config.token_pepper);
    let issued_at = Utc::now();
    let expires_at = issued_at + Duration::seconds(state.config.refresh_token_ttl_seconds as i64);

    let Some(session) = sessions::rotate_session(
        &state.db,
        &current.id,
        &Uuid::new_v4().to_string(),
        &user.id,
        &new_fingerprint,
        issued_at,
        expires_at,
        ctx.ip.as_deref(),
        ctx.user_agent.as_deref(),
    )
    .await?
    else {
        // A concurrent rotation or revocation won; this caller re-logs-in.
        return Err(AuthError::InvalidSession);
    };

    let access_token = token::issue_access_token(
        &user.id,
        role,
        &state.keys,
        state.config.access_token_ttl_seconds,
    )?;
    Ok(IssuedSession {
        access_token,
        refresh_token: raw_token,
        session,
        user,
    })
}

/// Revoke the session behind a presented refresh token. Unknown, expired and
/// already-revoked tokens are all quietly accepted: logout is idempotent.
pub async fn logout(state: &AppState, raw_refresh: &str) -> Result<(), AuthError> {
    let fingerprint = token::token_fingerprint(raw_refresh, &state.config.token_pepper);
    let now = Utc::now();
    if let Some(session) = sessions::find_live_by_token_hash(&state.db, &fingerprint, now).await? {
        sessions::revoke_session(&state.db, &session.id, now).await?;
    }
    Ok(())
}

/// Issue a reset token when the email resolves to an account. The caller's
/// observable outcome is identical either way; the raw token goes only to
/// the notifier.
pub async fn forgot_password(
    state: &AppState,
    email: &str,
    ctx: &RequestContext,
) -> Result<(), AuthError> {
    let email = normalize_email(email);
    if let Some(user) = users::get_user_by_email(&state.db, &email).await? {
        let raw_token = token::generate_opaque_token(RESET_TOKEN_BYTES);
        let fingerprint = token::token_fingerprint(&raw_token, &state.config.token_pepper);
        let now = Utc::now();
        let expires_at = now + Duration::seconds(state.config.reset_token_ttl_seconds as i64);
        reset_tokens::create_reset_token(
            &state.db,
            &Uuid::new_v4().to_string(),
            &user.id,
            &fingerprint,
            "reset",
            expires_at,
            ctx.ip.as_deref(),
            ctx.user_agent.as_deref(),
            now,
        )
        .await?;
        state.notifier.deliver(&user.email, &raw_token);
    }
    Ok(())
}

pub async fn reset_password(
    state: &AppState,
    raw_token: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    let fingerprint = token::token_fingerprint(raw_token, &state.config.token_pepper);
    let now = Utc::now();
    let Some(record) = reset_tokens::find_redeemable_by_hash(&state.db, &fingerprint, now).await?
    else {
        return Err(AuthError::InvalidResetToken);
    };
    let Some(user) = users::get_user_by_id(&state.db, &record.user_id).await? else {
        return Err(AuthError::InvalidResetToken);
    };

    let new_hash = password::hash_password(new_password, &state.config.token_pepper)?;
    let redeemed = reset_tokens::redeem_and_replace_password(
        &state.db,
        &record.id,
        &user.id,
        &new_hash,
        Utc::now(),
    )
    .await?;
    if !redeemed {
        // Lost a race against a concurrent redemption of the same token.
        return Err(AuthError::InvalidResetToken);
    }
    Ok(())
}

/// Seed the configured admin identity at startup. No-op when the email is
/// already registered, so restarts do not reset the admin credential.
pub async fn bootstrap_admin(
    state: &AppState,
    email: &str,
    password_raw: &str,
) -> Result<(), AuthError> {
    let email = normalize_email(email);
    if users::get_user_by_email(&state.db, &email).await?.is_some() {
        tracing::info!(email = %email, "admin identity already present, skipping seed");
        return Ok(());
    }
    let hash = password::hash_password(password_raw, &state.config.token_pepper)?;
    users::create_user(
        &state.db,
        &Uuid::new_v4().to_string(),
        &email,
        &hash,
        Role::Admin.as_str(),
        Utc::now(),
    )
    .await?;
    tracing::info!(email = %email, "seeded admin identity");
    Ok(())
}

async fn record_attempt(
    state: &AppState,
    email: &str,
    user_id: Option<&str>,
    ctx: &RequestContext,
    success: bool,
) -> Result<(), AuthError> {
    login_attempts::record_attempt(
        &state.db,
        &Uuid::new_v4().to_string(),
        email,
        user_id,
        ctx.ip.as_deref(),
        ctx.user_agent.as_deref(),
        success,
        Utc::now(),
    )
    .await?;
    Ok(())
}

async fn issue_session(
    state: &AppState,
    user: UserRow,
    ctx: &RequestContext,
) -> Result<IssuedSession, AuthError> {
    let role: Role = user.role.parse()?;
    let raw_token = token::generate_opaque_token(SESSION_TOKEN_BYTES);
    let fingerprint = token::token_fingerprint(&raw_token, &state.config.token_pepper);
    let issued_at = Utc::now();
    let expires_at = issued_at + Duration::seconds(state.config.refresh_token_ttl_seconds as i64);

    let session = sessions::create_session(
        &state.db,
        &Uuid::new_v4().to_string(),
        &user.id,
        &fingerprint,
        issued_at,
        expires_at,
        ctx.ip.as_deref(),
        ctx.user_agent.as_deref(),
    )
    .await?;

    let access_token = token::issue_access_token(
        &user.id,
        role,
        &state.keys,
        state.config.access_token_ttl_seconds,
    )?;
    Ok(IssuedSession {
        access_token,
        refresh_token: raw_token,
        session,
        user,
    })
}
