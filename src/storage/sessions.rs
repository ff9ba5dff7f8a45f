//! Session rows keyed by the SHA-256 hash of the bearer token.

use sqlx::{Row, SqlitePool};
use tracing::{info_span, instrument, Instrument};

use super::now_unix;
use crate::{access::Role, error::Result};

/// Live session joined with its account; the role comes from `accounts`, not the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
    pub account_id: i64,
    pub role: Role,
}

#[instrument(skip(pool, token_hash))]
pub async fn insert_session(
    pool: &SqlitePool,
    account_id: i64,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let now = now_unix();
    sqlx::query(
        "INSERT INTO sessions (account_id, token_hash, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(account_id)
    .bind(token_hash)
    .bind(now)
    .bind(now.saturating_add(ttl_seconds))
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip(pool, token_hash))]
pub async fn lookup_session(pool: &SqlitePool, token_hash: &[u8]) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT s.account_id, a.role
        FROM sessions s
        JOIN accounts a ON a.id = s.account_id
        WHERE s.token_hash = ? AND s.expires_at > ?
    ";
    let span = info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(now_unix())
        .fetch_optional(pool)
        .instrument(span)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let level: i64 = row.try_get("role")?;
    // An unreadable role never grants access.
    let Some(role) = Role::from_level(level) else {
        return Ok(None);
    };
    Ok(Some(SessionRecord {
        account_id: row.try_get("account_id")?,
        role,
    }))
}

#[instrument(skip(pool, token_hash))]
pub async fn delete_session(pool: &SqlitePool, token_hash: &[u8]) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(())
}

/// Drop expired sessions; returns how many were removed.
#[instrument(skip(pool))]
pub async fn purge_expired(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now_unix())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        accounts::{insert_account, NewAccount},
        apply_schema, connect,
    };

    #[tokio::test]
    async fn session_lifecycle() -> Result<()> {
        let pool = connect("sqlite::memory:", 1).await?;
        apply_schema(&pool).await?;
        let account = insert_account(
            &pool,
            &NewAccount {
                username: "dave",
                display_name: "Dave",
                email: "dave@example.com",
                phone_number: None,
                password_hash: None,
                federated: true,
                role: Role::Manager,
            },
        )
        .await?;

        insert_session(&pool, account.id, b"live", 3600).await?;
        insert_session(&pool, account.id, b"stale", -10).await?;

        let record = lookup_session(&pool, b"live").await?;
        assert_eq!(
            record,
            Some(SessionRecord {
                account_id: account.id,
                role: Role::Manager
            })
        );
        assert_eq!(lookup_session(&pool, b"stale").await?, None);
        assert_eq!(purge_expired(&pool).await?, 1);

        delete_session(&pool, b"live").await?;
        assert_eq!(lookup_session(&pool, b"live").await?, None);
        Ok(())
    }
}
