use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by_id: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[allow(clippy::too_many_arguments)]
pub async fn create_session(
    pool: &DbPool,
    id: &str,
    user_id: &str,
    token_hash: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<SessionRow, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(
        "INSERT INTO sessions (id, user_id, token_hash, issued_at, expires_at, ip, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING id, user_id, token_hash, issued_at, expires_at, revoked_at, replaced_by_id, ip, user_agent",
    )
    .bind(id)
    .bind(user_id)
    .bind(token_hash)
    .bind(issued_at)
    .bind(expires_at)
    .bind(ip)
    .bind(user_agent)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Look up a session by fingerprint that is neither revoked nor expired.
/// A miss never reveals which condition failed.
pub async fn find_live_by_token_hash(
    pool: &DbPool,
    token_hash: &str,
    now: DateTime<Utc>,
) -> Result<Option<SessionRow>, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT id, user_id, token_hash, issued_at, expires_at, revoked_at, replaced_by_id, ip, user_agent
         FROM sessions
         WHERE token_hash = ?1 AND revoked_at IS NULL AND expires_at > ?2",
    )
    .bind(token_hash)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_session_by_id(pool: &DbPool, id: &str) -> Result<Option<SessionRow>, DbError> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT id, user_id, token_hash, issued_at, expires_at, revoked_at, replaced_by_id, ip, user_agent
         FROM sessions WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Replace a live session with a successor in one transaction: the new row is
/// inserted, then the old row is revoked and chained to it. The conditional
/// update makes concurrent rotations of the same session race safely: exactly
/// one caller commits, the rest observe `None` and must re-authenticate.
#[allow(clippy::too_many_arguments)]
pub async fn rotate_session(
    pool: &DbPool,
    old_id: &str,
    id: &str,
    user_id: &str,
    token_hash: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<Option<SessionRow>, DbError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, SessionRow>(
        "INSERT INTO sessions (id, user_id, token_hash, issued_at, expires_at, ip, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING id, user_id, token_hash, issued_at, expires_at, revoked_at, replaced_by_id, ip, user_agent",
    )
    .bind(id)
    .bind(user_id)
    .bind(token_hash)
    .bind(issued_at)
    .bind(expires_at)
    .bind(ip)
    .bind(user_agent)
    .fetch_one(&mut *tx)
    .await?;

    let updated = sqlx::query(
        "UPDATE sessions SET revoked_at = ?2, replaced_by_id = ?3
         WHERE id = ?1 AND revoked_at IS NULL",
    )
    .bind(old_id)
    .bind(issued_at)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Ok(None);
    }

    tx.commit().await?;
    Ok(Some(row))
}

/// Idempotent: revokes only if the session is still live.
pub async fn revoke_session(pool: &DbPool, id: &str, now: DateTime<Utc>) -> Result<bool, DbError> {
    let result = sqlx::query("UPDATE sessions SET revoked_at = ?2 WHERE id = ?1 AND revoked_at IS NULL")
        .bind(id)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn revoke_all_for_user(
    pool: &DbPool,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result =
        sqlx::query("UPDATE sessions SET revoked_at = ?2 WHERE user_id = ?1 AND revoked_at IS NULL")
            .bind(user_id)
            .bind(now)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing, users};
    use chrono::Duration;

    async fn pool_with_user(user_id: &str) -> DbPool {
        let pool = testing::pool().await;
        users::create_user(
            &pool,
            user_id,
            &format!("{user_id}@example.com"),
            "hash",
            "USER",
            Utc::now(),
        )
        .await
        .expect("create user");
        pool
    }

    #[tokio::test]
    async fn issued_session_is_live_until_revoked() {
        let pool = pool_with_user("u1").await;
        let now = Utc::now();
        let expires = now + Duration::days(7);
        create_session(&pool, "s1", "u1", "fp-1", now, expires, None, None)
            .await
            .expect("create session");

        let live = find_live_by_token_hash(&pool, "fp-1", now)
            .await
            .expect("query");
        assert_eq!(live.expect("session live").id, "s1");

        assert!(revoke_session(&pool, "s1", now).await.expect("revoke"));
        let gone = find_live_by_token_hash(&pool, "fp-1", now)
            .await
            .expect("query");
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn expired_session_is_not_live() {
        let pool = pool_with_user("u1").await;
        let now = Utc::now();
        create_session(&pool, "s1", "u1", "fp-1", now - Duration::days(8), now - Duration::days(1), None, None)
            .await
            .expect("create session");
        let live = find_live_by_token_hash(&pool, "fp-1", now)
            .await
            .expect("query");
        assert!(live.is_none());
    }

    #[tokio::test]
    async fn rotation_revokes_old_row_and_links_the_chain() {
        let pool = pool_with_user("u1").await;
        let now = Utc::now();
        let expires = now + Duration::days(7);
        create_session(&pool, "s1", "u1", "fp-1", now, expires, None, None)
            .await
            .expect("create session");

        let rotated = rotate_session(&pool, "s1", "s2", "u1", "fp-2", now, expires, None, None)
            .await
            .expect("rotate")
            .expect("rotation wins");
        assert_eq!(rotated.id, "s2");
        assert_ne!(rotated.token_hash, "fp-1");

        let old = get_session_by_id(&pool, "s1")
            .await
            .expect("query")
            .expect("old row kept");
        assert!(old.revoked_at.is_some());
        assert_eq!(old.replaced_by_id.as_deref(), Some("s2"));

        assert!(find_live_by_token_hash(&pool, "fp-1", now).await.expect("query").is_none());
        assert!(find_live_by_token_hash(&pool, "fp-2", now).await.expect("query").is_some());
    }

    #[tokio::test]
    async fn rotation_of_an_already_revoked_session_leaves_no_trace() {
        let pool = pool_with_user("u1").await;
        let now = Utc::now();
        let expires = now + Duration::days(7);
        create_session(&pool, "s1", "u1", "fp-1", now, expires, None, None)
            .await
            .expect("create session");
        revoke_session(&pool, "s1", now).await.expect("revoke");

        let rotated = rotate_session(&pool, "s1", "s2", "u1", "fp-2", now, expires, None, None)
            .await
            .expect("rotate");
        assert!(rotated.is_none());

        // The losing insert must have been rolled back with the transaction.
        assert!(get_session_by_id(&pool, "s2").await.expect("query").is_none());
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let pool = pool_with_user("u1").await;
        let now = Utc::now();
        create_session(&pool, "s1", "u1", "fp-1", now, now + Duration::days(7), None, None)
            .await
            .expect("create session");
        assert!(revoke_session(&pool, "s1", now).await.expect("first revoke"));
        assert!(!revoke_session(&pool, "s1", now).await.expect("second revoke"));
    }

    #[tokio::test]
    async fn revoke_all_hits_only_live_sessions_of_the_user() {
        let pool = pool_with_user("u1").await;
        users::create_user(&pool, "u2", "u2@example.com", "hash", "USER", Utc::now())
            .await
            .expect("second user");
        let now = Utc::now();
        let expires = now + Duration::days(7);
        create_session(&pool, "s1", "u1", "fp-1", now, expires, None, None).await.expect("s1");
        create_session(&pool, "s2", "u1", "fp-2", now, expires, None, None).await.expect("s2");
        create_session(&pool, "s3", "u2", "fp-3", now, expires, None, None).await.expect("s3");
        revoke_session(&pool, "s2", now).await.expect("revoke s2");

        let revoked = revoke_all_for_user(&pool, "u1", now).await.expect("revoke all");
        assert_eq!(revoked, 1);
        assert!(find_live_by_token_hash(&pool, "fp-3", now).await.expect("query").is_some());
    }
}
