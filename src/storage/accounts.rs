use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{info_span, instrument, Instrument};
use utoipa::ToSchema;

use super::{is_unique_violation, now_unix};
use crate::{
    access::Role,
    error::{Error, Result},
};

const ACCOUNT_COLUMNS: &str = "id, username, display_name, email, phone_number, federated, role, \
     image IS NOT NULL AS has_image, created_at";

/// Public view of an account. Never carries the password hash or image bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccountResponse {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: Role,
    pub federated: bool,
    pub has_image: bool,
    pub created_at: i64,
}

impl AccountResponse {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let level: i64 = row.try_get("role")?;
        let role = Role::from_level(level).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "role".to_string(),
            source: format!("unknown role level {level}").into(),
        })?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            email: row.try_get("email")?,
            phone_number: row.try_get("phone_number")?,
            role,
            federated: row.try_get::<i64, _>("federated")? != 0,
            has_image: row.try_get::<i64, _>("has_image")? != 0,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Fields needed to insert a new account.
#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub username: &'a str,
    pub display_name: &'a str,
    pub email: &'a str,
    pub phone_number: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub federated: bool,
    pub role: Role,
}

/// What login and re-authentication need to know about an account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub account_id: i64,
    pub password_hash: Option<String>,
    pub federated: bool,
}

/// # Errors
/// `ConflictFailed` when the username or email is taken.
#[instrument(skip(pool, account), fields(username = account.username))]
pub async fn insert_account(pool: &SqlitePool, account: &NewAccount<'_>) -> Result<AccountResponse> {
    let query = r"
        INSERT INTO accounts
            (username, display_name, email, phone_number, password_hash, federated, role, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    ";
    let span = info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(account.username)
        .bind(account.display_name)
        .bind(account.email)
        .bind(account.phone_number)
        .bind(account.password_hash)
        .bind(account.federated)
        .bind(account.role.level())
        .bind(now_unix())
        .execute(pool)
        .instrument(span)
        .await;

    let result = match result {
        Ok(result) => result,
        Err(err) if is_unique_violation(&err) => {
            return Err(Error::ConflictFailed(
                "An account with this username or email already exists.",
            ));
        }
        Err(err) => return Err(err.into()),
    };

    fetch_account(pool, result.last_insert_rowid())
        .await?
        .ok_or(Error::NotFound("Account not found."))
}

#[instrument(skip(pool))]
pub async fn fetch_account(pool: &SqlitePool, account_id: i64) -> Result<Option<AccountResponse>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
    let row = sqlx::query(&query)
        .bind(account_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(AccountResponse::from_row).transpose()?)
}

#[instrument(skip(pool))]
pub async fn list_accounts(pool: &SqlitePool) -> Result<Vec<AccountResponse>> {
    let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY username");
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(AccountResponse::from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

#[instrument(skip(pool))]
pub async fn find_account_id(pool: &SqlitePool, username: &str) -> Result<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id FROM accounts WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

#[instrument(skip(pool))]
pub async fn fetch_credentials_by_username(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<Credentials>> {
    let row = sqlx::query("SELECT id, password_hash, federated FROM accounts WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(credentials_from_row).transpose()?)
}

#[instrument(skip(pool))]
pub async fn fetch_credentials(pool: &SqlitePool, account_id: i64) -> Result<Option<Credentials>> {
    let row = sqlx::query("SELECT id, password_hash, federated FROM accounts WHERE id = ?")
        .bind(account_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(credentials_from_row).transpose()?)
}

fn credentials_from_row(row: &SqliteRow) -> Result<Credentials, sqlx::Error> {
    Ok(Credentials {
        account_id: row.try_get("id")?,
        password_hash: row.try_get("password_hash")?,
        federated: row.try_get::<i64, _>("federated")? != 0,
    })
}

/// Raw profile image, `None` when the account is missing or has no image.
#[instrument(skip(pool))]
pub async fn fetch_account_image(pool: &SqlitePool, account_id: i64) -> Result<Option<Vec<u8>>> {
    let image: Option<Option<Vec<u8>>> =
        sqlx::query_scalar("SELECT image FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(pool)
            .await?;
    Ok(image.flatten())
}
