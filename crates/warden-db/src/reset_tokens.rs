use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResetTokenRow {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub reason: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
pub async fn create_reset_token(
    pool: &DbPool,
    id: &str,
    user_id: &str,
    token_hash: &str,
    reason: &str,
    expires_at: DateTime<Utc>,
    ip: Option<&str>,
    user_agent: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ResetTokenRow, DbError> {
    let row = sqlx::query_as::<_, ResetTokenRow>(
        "INSERT INTO reset_tokens (id, user_id, token_hash, reason, expires_at, ip, user_agent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         RETURNING id, user_id, token_hash, reason, expires_at, used_at, ip, user_agent, created_at",
    )
    .bind(id)
    .bind(user_id)
    .bind(token_hash)
    .bind(reason)
    .bind(expires_at)
    .bind(ip)
    .bind(user_agent)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// A token is redeemable iff it has never been used and has not expired.
/// Misses are uniform: callers cannot tell the reasons apart.
pub async fn find_redeemable_by_hash(
    pool: &DbPool,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<ResetTokenRow>, DbError> {
    let row = sqlx::query_as::<_, ResetTokenRow>(
        "SELECT id, user_id, token_hash, reason, expires_at, used_at, ip, user_agent, created_at
         FROM reset_tokens
         WHERE token_hash = ?1 AND used_at IS NULL AND expires_at > ?2",
    )
    .bind(token_hash)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Consume a reset token, store the new credential and revoke every live
/// session of the owner, all inside one transaction. The conditional
/// `used_at` update enforces exactly-once redemption: a concurrent redeemer
/// that lost the race gets `false` and none of the three effects.
pub async fn redeem_and_replace_password(
    pool: &DbPool,
    token_id: &str,
    user_id: &str,
    new_password_hash: &str,
    now: DateTime<Utc>,
) -> Result<bool, DbError> {
    let mut tx = pool.begin().await?;

    let consumed = sqlx::query("UPDATE reset_tokens SET used_at = ?2 WHERE id = ?1 AND used_at IS NULL")
        .bind(token_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    if consumed.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(
        "UPDATE users SET password_hash = ?2, password_algo = 'argon2id', updated_at = ?3
         WHERE id = ?1",
    )
    .bind(user_id)
    .bind(new_password_hash)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE sessions SET revoked_at = ?2 WHERE user_id = ?1 AND revoked_at IS NULL")
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sessions, testing, users};
    use chrono::Duration;

    async fn pool_with_user() -> DbPool {
        let pool = testing::pool().await;
        users::create_user(&pool, "u1", "u1@example.com", "old-hash", "USER", Utc::now())
            .await
            .expect("create user");
        pool
    }

    #[tokio::test]
    async fn redemption_is_exactly_once() {
        let pool = pool_with_user().await;
        let now = Utc::now();
        create_reset_token(&pool, "r1", "u1", "fp-r1", "reset", now + Duration::minutes(20), None, None, now)
            .await
            .expect("create token");

        let record = find_redeemable_by_hash(&pool, "fp-r1", now)
            .await
            .expect("query")
            .expect("redeemable");
        assert!(redeem_and_replace_password(&pool, &record.id, "u1", "new-hash", now)
            .await
            .expect("first redeem"));
        assert!(!redeem_and_replace_password(&pool, &record.id, "u1", "other-hash", now)
            .await
            .expect("second redeem"));

        // Consumed tokens stop matching the redeemable lookup.
        assert!(find_redeemable_by_hash(&pool, "fp-r1", now).await.expect("query").is_none());
    }

    #[tokio::test]
    async fn redemption_swaps_credential_and_revokes_sessions() {
        let pool = pool_with_user().await;
        let now = Utc::now();
        sessions::create_session(&pool, "s1", "u1", "fp-s1", now, now + Duration::days(7), None, None)
            .await
            .expect("create session");
        create_reset_token(&pool, "r1", "u1", "fp-r1", "reset", now + Duration::minutes(20), None, None, now)
            .await
            .expect("create token");

        assert!(redeem_and_replace_password(&pool, "r1", "u1", "new-hash", now)
            .await
            .expect("redeem"));

        let user = users::get_user_by_id(&pool, "u1")
            .await
            .expect("query")
            .expect("user exists");
        assert_eq!(user.password_hash, "new-hash");
        assert!(sessions::find_live_by_token_hash(&pool, "fp-s1", now)
            .await
            .expect("query")
            .is_none());
    }

    #[tokio::test]
    async fn expired_tokens_are_not_redeemable() {
        let pool = pool_with_user().await;
        let now = Utc::now();
        create_reset_token(&pool, "r1", "u1", "fp-r1", "reset", now - Duration::minutes(1), None, None, now - Duration::minutes(30))
            .await
            .expect("create token");
        assert!(find_redeemable_by_hash(&pool, "fp-r1", now).await.expect("query").is_none());
    }
}
