use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{info_span, instrument, Instrument};
use utoipa::ToSchema;

use super::now_unix;
use crate::{
    error::{Error, Result},
    mutation::patch::MAX_ASSET_BYTES,
};

const ORGANIZATION_COLUMNS: &str = "id, name, email, summary, description, details, \
     social_link_1, social_link_2, social_link_3, image IS NOT NULL AS has_image, created_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrganizationResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    pub social_links: Vec<String>,
    pub has_image: bool,
    pub created_at: i64,
}

impl OrganizationResponse {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let mut social_links = Vec::with_capacity(3);
        for column in ["social_link_1", "social_link_2", "social_link_3"] {
            if let Some(link) = row.try_get::<Option<String>, _>(column)? {
                social_links.push(link);
            }
        }
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            summary: row.try_get("summary")?,
            description: row.try_get("description")?,
            details: row.try_get("details")?,
            social_links,
            has_image: row.try_get::<i64, _>("has_image")? != 0,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Listing entry used by the directory and "my organizations" views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OrganizationCard {
    pub id: i64,
    pub name: String,
    pub summary: Option<String>,
    pub has_image: bool,
}

impl OrganizationCard {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            summary: row.try_get("summary")?,
            has_image: row.try_get::<i64, _>("has_image")? != 0,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewOrganization {
    pub name: String,
    pub email: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    pub social_links: [Option<String>; 3],
    pub image: Option<Vec<u8>>,
}

/// Member roster row shown to the organization's managers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MemberResponse {
    pub account_id: i64,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub receive_emails: bool,
    pub joined_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ManagerResponse {
    pub account_id: i64,
    pub display_name: String,
}

/// # Errors
/// `ValidationFailed` when the image exceeds the asset ceiling.
#[instrument(skip(pool, organization), fields(name = %organization.name))]
pub async fn insert_organization(
    pool: &SqlitePool,
    organization: &NewOrganization,
) -> Result<OrganizationResponse> {
    if organization
        .image
        .as_ref()
        .is_some_and(|image| image.len() > MAX_ASSET_BYTES)
    {
        return Err(Error::validation("Image exceeds the 16 MiB limit."));
    }

    let query = r"
        INSERT INTO organizations
            (name, email, summary, description, details,
             social_link_1, social_link_2, social_link_3, image, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ";
    let span = info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "INSERT",
        db.statement = query
    );
    let [link_1, link_2, link_3] = &organization.social_links;
    let result = sqlx::query(query)
        .bind(&organization.name)
        .bind(&organization.email)
        .bind(&organization.summary)
        .bind(&organization.description)
        .bind(&organization.details)
        .bind(link_1)
        .bind(link_2)
        .bind(link_3)
        .bind(&organization.image)
        .bind(now_unix())
        .execute(pool)
        .instrument(span)
        .await?;

    fetch_organization(pool, result.last_insert_rowid())
        .await?
        .ok_or(Error::NotFound("Organization not found."))
}

#[instrument(skip(pool))]
pub async fn fetch_organization(
    pool: &SqlitePool,
    organization_id: i64,
) -> Result<Option<OrganizationResponse>> {
    let query = format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = ?");
    let row = sqlx::query(&query)
        .bind(organization_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(OrganizationResponse::from_row).transpose()?)
}

#[instrument(skip(pool))]
pub async fn list_organizations(pool: &SqlitePool) -> Result<Vec<OrganizationCard>> {
    let rows = sqlx::query(
        "SELECT id, name, summary, image IS NOT NULL AS has_image FROM organizations ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    cards(&rows)
}

/// Organizations the account belongs to.
#[instrument(skip(pool))]
pub async fn list_joined(pool: &SqlitePool, account_id: i64) -> Result<Vec<OrganizationCard>> {
    let rows = sqlx::query(
        r"
        SELECT o.id, o.name, o.summary, o.image IS NOT NULL AS has_image
        FROM organizations o
        JOIN memberships m ON m.organization_id = o.id
        WHERE m.account_id = ?
        ORDER BY o.name
        ",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    cards(&rows)
}

/// Organizations the account is assigned to manage.
#[instrument(skip(pool))]
pub async fn list_managed(pool: &SqlitePool, account_id: i64) -> Result<Vec<OrganizationCard>> {
    let rows = sqlx::query(
        r"
        SELECT o.id, o.name, o.summary, o.image IS NOT NULL AS has_image
        FROM organizations o
        JOIN manager_assignments ma ON ma.organization_id = o.id
        WHERE ma.account_id = ?
        ORDER BY o.name
        ",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    cards(&rows)
}

fn cards(rows: &[SqliteRow]) -> Result<Vec<OrganizationCard>> {
    Ok(rows
        .iter()
        .map(OrganizationCard::from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

#[instrument(skip(pool))]
pub async fn fetch_organization_image(
    pool: &SqlitePool,
    organization_id: i64,
) -> Result<Option<Vec<u8>>> {
    let image: Option<Option<Vec<u8>>> =
        sqlx::query_scalar("SELECT image FROM organizations WHERE id = ?")
            .bind(organization_id)
            .fetch_optional(pool)
            .await?;
    Ok(image.flatten())
}

#[instrument(skip(pool))]
pub async fn list_members(pool: &SqlitePool, organization_id: i64) -> Result<Vec<MemberResponse>> {
    let rows = sqlx::query(
        r"
        SELECT a.id, a.username, a.display_name, a.email, m.receive_emails, m.joined_at
        FROM memberships m
        JOIN accounts a ON a.id = m.account_id
        WHERE m.organization_id = ?
        ORDER BY a.display_name
        ",
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;

    let mut members = Vec::with_capacity(rows.len());
    for row in &rows {
        members.push(MemberResponse {
            account_id: row.try_get("id")?,
            username: row.try_get("username")?,
            display_name: row.try_get("display_name")?,
            email: row.try_get("email")?,
            receive_emails: row.try_get::<i64, _>("receive_emails")? != 0,
            joined_at: row.try_get("joined_at")?,
        });
    }
    Ok(members)
}

#[instrument(skip(pool))]
pub async fn list_managers(pool: &SqlitePool, organization_id: i64) -> Result<Vec<ManagerResponse>> {
    let rows = sqlx::query(
        r"
        SELECT a.id, a.display_name
        FROM manager_assignments ma
        JOIN accounts a ON a.id = ma.account_id
        WHERE ma.organization_id = ?
        ORDER BY a.display_name
        ",
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;

    let mut managers = Vec::with_capacity(rows.len());
    for row in &rows {
        managers.push(ManagerResponse {
            account_id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
        });
    }
    Ok(managers)
}

/// Email addresses of members who opted into notifications.
#[instrument(skip(pool))]
pub async fn notification_recipients(pool: &SqlitePool, organization_id: i64) -> Result<Vec<String>> {
    let emails = sqlx::query_scalar(
        r"
        SELECT a.email
        FROM memberships m
        JOIN accounts a ON a.id = m.account_id
        WHERE m.organization_id = ? AND m.receive_emails = 1
        ORDER BY a.id
        ",
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;
    Ok(emails)
}
