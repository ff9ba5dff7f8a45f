//! Caller identity resolution.
//!
//! Flow Overview: read the session token (cookie or bearer), resolve it to an
//! account, and read the account's role fresh from the datastore. Missing,
//! expired or unknown tokens resolve to an anonymous caller; the role gate
//! then decides whether anonymity is acceptable.

use axum::http::HeaderMap;
use sqlx::SqlitePool;

use super::{session::extract_session_token, utils::hash_session_token};
use crate::{access::Caller, error::Result, storage::sessions::lookup_session};

/// Resolve the request's caller.
///
/// # Errors
/// Returns `Database` if the session lookup fails.
pub async fn resolve_caller(headers: &HeaderMap, pool: &SqlitePool) -> Result<Caller> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(Caller::Anonymous);
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let token_hash = hash_session_token(&token);
    Ok(match lookup_session(pool, &token_hash).await? {
        Some(record) => Caller::Account {
            account_id: record.account_id,
            role: record.role,
        },
        None => Caller::Anonymous,
    })
}
