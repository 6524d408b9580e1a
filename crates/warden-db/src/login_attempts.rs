use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoginAttemptRow {
    pub id: String,
    pub email: String,
    pub user_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
pub async fn record_attempt(
    pool: &DbPool,
    id: &str,
    email: &str,
    user_id: Option<&str>,
    ip: Option<&str>,
    user_agent: Option<&str>,
    success: bool,
    now: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO login_attempts (id, email, user_id, ip, user_agent, success, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(id)
    .bind(email)
    .bind(user_id)
    .bind(ip)
    .bind(user_agent)
    .bind(success)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// The newest attempts for an email after `since`, newest first.
pub async fn recent_for_email(
    pool: &DbPool,
    email: &str,
    since: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<LoginAttemptRow>, DbError> {
    let rows = sqlx::query_as::<_, LoginAttemptRow>(
        "SELECT id, email, user_id, ip, user_agent, success, created_at
         FROM login_attempts
         WHERE email = ?1 AND created_at > ?2
         ORDER BY created_at DESC
         LIMIT ?3",
    )
    .bind(email)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
