use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::{fmt, str::FromStr};
use tracing::instrument;
use utoipa::ToSchema;

use crate::error::Result;

/// Announcements are either events (with a date, location and attendance)
/// or plain updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementKind {
    Event,
    Update,
}

impl AnnouncementKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for AnnouncementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnouncementKind {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "event" => Ok(Self::Event),
            "update" => Ok(Self::Update),
            other => Err(format!("unknown announcement kind: {other}")),
        }
    }
}

/// Announcement to insert; `posted_at` is stamped at execution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnnouncement {
    pub organization_id: i64,
    pub kind: AnnouncementKind,
    pub title: String,
    pub description: String,
    pub date: Option<String>,
    pub location: Option<String>,
    pub members_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnnouncementResponse {
    pub id: i64,
    pub organization_id: i64,
    pub kind: AnnouncementKind,
    pub title: String,
    pub description: String,
    pub date: Option<String>,
    pub location: Option<String>,
    pub members_only: bool,
    pub posted_at: i64,
    /// Caller's own attendance; only present in the personal feed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attending: Option<bool>,
}

impl AnnouncementResponse {
    fn from_row(row: &SqliteRow, with_attendance: bool) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        let kind = kind
            .parse::<AnnouncementKind>()
            .map_err(|err| sqlx::Error::ColumnDecode {
                index: "kind".to_string(),
                source: err.into(),
            })?;
        let attending = if with_attendance {
            Some(row.try_get::<Option<i64>, _>("attending")?.unwrap_or(0) != 0)
        } else {
            None
        };
        Ok(Self {
            id: row.try_get("id")?,
            organization_id: row.try_get("organization_id")?,
            kind,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            date: row.try_get("date")?,
            location: row.try_get("location")?,
            members_only: row.try_get::<i64, _>("members_only")? != 0,
            posted_at: row.try_get("posted_at")?,
            attending,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceResponse {
    pub account_id: i64,
    pub display_name: String,
    pub attending: bool,
}

#[instrument(skip(pool))]
pub async fn fetch_announcement(
    pool: &SqlitePool,
    announcement_id: i64,
) -> Result<Option<AnnouncementResponse>> {
    let row = sqlx::query(
        r"
        SELECT id, organization_id, kind, title, description, date, location, members_only, posted_at
        FROM announcements
        WHERE id = ?
        ",
    )
    .bind(announcement_id)
    .fetch_optional(pool)
    .await?;
    Ok(row
        .as_ref()
        .map(|row| AnnouncementResponse::from_row(row, false))
        .transpose()?)
}

/// Announcements of one organization, newest first. Members-only items are
/// included only when `include_members_only` is set.
#[instrument(skip(pool))]
pub async fn list_for_organization(
    pool: &SqlitePool,
    organization_id: i64,
    kind: Option<AnnouncementKind>,
    include_members_only: bool,
) -> Result<Vec<AnnouncementResponse>> {
    let rows = sqlx::query(
        r"
        SELECT id, organization_id, kind, title, description, date, location, members_only, posted_at
        FROM announcements
        WHERE organization_id = ?
          AND (? IS NULL OR kind = ?)
          AND (? OR members_only = 0)
        ORDER BY posted_at DESC, id DESC
        ",
    )
    .bind(organization_id)
    .bind(kind.map(AnnouncementKind::as_str))
    .bind(kind.map(AnnouncementKind::as_str))
    .bind(include_members_only)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| AnnouncementResponse::from_row(row, false))
        .collect::<Result<Vec<_>, _>>()?)
}

/// Announcements from every organization the account belongs to, with the
/// account's own attendance.
#[instrument(skip(pool))]
pub async fn feed_for_account(
    pool: &SqlitePool,
    account_id: i64,
) -> Result<Vec<AnnouncementResponse>> {
    let rows = sqlx::query(
        r"
        SELECT an.id, an.organization_id, an.kind, an.title, an.description, an.date,
               an.location, an.members_only, an.posted_at, r.attending
        FROM announcements an
        JOIN memberships m ON m.organization_id = an.organization_id AND m.account_id = ?
        LEFT JOIN announcement_responses r ON r.announcement_id = an.id AND r.account_id = m.account_id
        ORDER BY an.posted_at DESC, an.id DESC
        ",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| AnnouncementResponse::from_row(row, true))
        .collect::<Result<Vec<_>, _>>()?)
}

/// Response rows of one announcement with the responders' names.
#[instrument(skip(pool))]
pub async fn attendance(
    pool: &SqlitePool,
    announcement_id: i64,
) -> Result<Vec<AttendanceResponse>> {
    let rows = sqlx::query(
        r"
        SELECT a.id, a.display_name, r.attending
        FROM announcement_responses r
        JOIN accounts a ON a.id = r.account_id
        WHERE r.announcement_id = ?
        ORDER BY r.attending DESC, a.display_name
        ",
    )
    .bind(announcement_id)
    .fetch_all(pool)
    .await?;

    let mut responses = Vec::with_capacity(rows.len());
    for row in &rows {
        responses.push(AttendanceResponse {
            account_id: row.try_get("id")?,
            display_name: row.try_get("display_name")?,
            attending: row.try_get::<i64, _>("attending")? != 0,
        });
    }
    Ok(responses)
}
