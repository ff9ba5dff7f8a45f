//! Events and updates published by an organization.
//!
//! Creating an announcement fans out one response row per current member in
//! the same plan, then queues notification emails once the plan committed.
//! Queueing is best effort and never fails the request.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::SqlitePool;
use tracing::{error, info};

use super::{
    super::{auth::resolve_caller, clearable_text, optional_text, required_text},
    types::{
        AnnouncementQuery, AttendanceRequest, CreateAnnouncementRequest, UpdateAnnouncementRequest,
    },
};
use crate::{
    access::{can_view_members_only, organization_exists, require_org_manager, require_org_member},
    api::email::enqueue_announcement,
    error::{Error, Result},
    mutation::{execute, plans, AnnouncementColumn, Patch, ResponseColumn},
    storage::announcements::{
        attendance, fetch_announcement, list_for_organization, AnnouncementKind,
        AnnouncementResponse, AttendanceResponse, NewAnnouncement,
    },
};

const ANNOUNCEMENT_NOT_FOUND: &str = "Announcement not found.";

fn new_announcement(
    organization_id: i64,
    request: CreateAnnouncementRequest,
) -> Result<NewAnnouncement> {
    let title = required_text(&request.title, "Title")?;
    let description = required_text(&request.description, "Description")?;

    let (date, location) = match request.kind {
        AnnouncementKind::Event => {
            let date = optional_text(request.date.as_deref())
                .ok_or_else(|| Error::validation("Events need a date."))?;
            (Some(date), optional_text(request.location.as_deref()))
        }
        AnnouncementKind::Update => (None, None),
    };

    Ok(NewAnnouncement {
        organization_id,
        kind: request.kind,
        title,
        description,
        date,
        location,
        members_only: request.members_only,
    })
}

fn announcement_patch(
    kind: AnnouncementKind,
    request: &UpdateAnnouncementRequest,
) -> Result<Patch<AnnouncementColumn>> {
    if kind == AnnouncementKind::Update && (request.date.is_some() || request.location.is_some()) {
        return Err(Error::validation("Updates have no date or location."));
    }

    let title = request
        .title
        .as_deref()
        .map(|title| required_text(title, "Title"))
        .transpose()?;
    let description = request
        .description
        .as_deref()
        .map(|description| required_text(description, "Description"))
        .transpose()?;
    let date = request
        .date
        .as_deref()
        .map(|date| required_text(date, "Date"))
        .transpose()?;

    Ok(Patch::new()
        .set_some(AnnouncementColumn::Title, title)
        .set_some(AnnouncementColumn::Description, description)
        .set_some(AnnouncementColumn::Date, date)
        .set_some(AnnouncementColumn::Location, clearable_text(request.location.as_deref()))
        .set_some(AnnouncementColumn::MembersOnly, request.members_only))
}

/// Load an announcement and check it belongs to `organization_id`.
async fn scoped_announcement(
    pool: &SqlitePool,
    organization_id: i64,
    announcement_id: i64,
) -> Result<AnnouncementResponse> {
    fetch_announcement(pool, announcement_id)
        .await?
        .filter(|announcement| announcement.organization_id == organization_id)
        .ok_or(Error::NotFound(ANNOUNCEMENT_NOT_FOUND))
}

#[utoipa::path(
    get,
    path = "/v1/orgs/{id}/announcements",
    params(("id" = i64, Path, description = "Organization id"), AnnouncementQuery),
    responses(
        (status = 200, description = "Announcements visible to the caller, newest first", body = [AnnouncementResponse]),
        (status = 404, description = "Organization not found", body = crate::error::ErrorBody),
    ),
    tag = "announcements"
)]
/// Members, the organization's managers and admins also see members-only items.
pub async fn list_announcements(
    Path(organization_id): Path<i64>,
    Query(query): Query<AnnouncementQuery>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    if !organization_exists(&*pool, organization_id).await? {
        return Err(Error::NotFound("Organization not found."));
    }
    let include_members_only = can_view_members_only(&pool, &caller, organization_id).await?;
    let announcements =
        list_for_organization(&pool, organization_id, query.kind, include_members_only).await?;
    Ok(Json(announcements))
}

#[utoipa::path(
    post,
    path = "/v1/orgs/{id}/announcements",
    request_body = CreateAnnouncementRequest,
    params(("id" = i64, Path, description = "Organization id")),
    responses(
        (status = 201, description = "Announcement published", body = AnnouncementResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 403, description = "Manager role required", body = crate::error::ErrorBody),
        (status = 404, description = "Organization not found or not managed by the caller", body = crate::error::ErrorBody),
    ),
    tag = "announcements"
)]
pub async fn create_announcement(
    Path(organization_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    Json(request): Json<CreateAnnouncementRequest>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_org_manager(&pool, &caller, organization_id).await?;

    let announcement = new_announcement(organization_id, request)?;
    let outcome = execute(&pool, &plans::create_announcement(announcement)).await?;
    let announcement_id = outcome
        .inserted_id()
        .ok_or_else(|| Error::internal("announcement plan committed without an id"))?;
    info!(account_id, organization_id, announcement_id, "Announcement published");

    let announcement = fetch_announcement(&pool, announcement_id)
        .await?
        .ok_or(Error::NotFound(ANNOUNCEMENT_NOT_FOUND))?;

    match enqueue_announcement(&pool, &announcement).await {
        Ok(queued) => info!(announcement_id, queued, "Announcement notifications queued"),
        Err(err) => error!("Failed to queue announcement notifications: {err:#}"),
    }

    Ok((StatusCode::CREATED, Json(announcement)))
}

#[utoipa::path(
    patch,
    path = "/v1/orgs/{id}/announcements/{announcement_id}",
    request_body = UpdateAnnouncementRequest,
    params(
        ("id" = i64, Path, description = "Organization id"),
        ("announcement_id" = i64, Path, description = "Announcement id"),
    ),
    responses(
        (status = 200, description = "Announcement updated", body = AnnouncementResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 403, description = "Manager role required", body = crate::error::ErrorBody),
        (status = 404, description = "Announcement not found in a managed organization", body = crate::error::ErrorBody),
    ),
    tag = "announcements"
)]
pub async fn patch_announcement(
    Path((organization_id, announcement_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    Json(request): Json<UpdateAnnouncementRequest>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    require_org_manager(&pool, &caller, organization_id).await?;

    let current = scoped_announcement(&pool, organization_id, announcement_id).await?;
    let assignments = announcement_patch(current.kind, &request)?.build()?;
    execute(
        &pool,
        &plans::update_announcement(organization_id, announcement_id, assignments),
    )
    .await?;

    let announcement = scoped_announcement(&pool, organization_id, announcement_id).await?;
    Ok(Json(announcement))
}

#[utoipa::path(
    delete,
    path = "/v1/orgs/{id}/announcements/{announcement_id}",
    params(
        ("id" = i64, Path, description = "Organization id"),
        ("announcement_id" = i64, Path, description = "Announcement id"),
    ),
    responses(
        (status = 204, description = "Announcement and its responses deleted"),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 403, description = "Manager role required", body = crate::error::ErrorBody),
        (status = 404, description = "Announcement not found in a managed organization", body = crate::error::ErrorBody),
    ),
    tag = "announcements"
)]
pub async fn delete_announcement(
    Path((organization_id, announcement_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_org_manager(&pool, &caller, organization_id).await?;

    execute(
        &pool,
        &plans::delete_announcement(organization_id, announcement_id),
    )
    .await?;
    info!(account_id, organization_id, announcement_id, "Announcement deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/orgs/{id}/announcements/{announcement_id}/attendance",
    params(
        ("id" = i64, Path, description = "Organization id"),
        ("announcement_id" = i64, Path, description = "Event id"),
    ),
    responses(
        (status = 200, description = "Member responses to the event", body = [AttendanceResponse]),
        (status = 400, description = "Not an event", body = crate::error::ErrorBody),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 403, description = "Manager role required", body = crate::error::ErrorBody),
        (status = 404, description = "Event not found in a managed organization", body = crate::error::ErrorBody),
    ),
    tag = "announcements"
)]
pub async fn event_attendance(
    Path((organization_id, announcement_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    require_org_manager(&pool, &caller, organization_id).await?;

    let announcement = scoped_announcement(&pool, organization_id, announcement_id).await?;
    if announcement.kind != AnnouncementKind::Event {
        return Err(Error::validation("Only events track attendance."));
    }
    Ok(Json(attendance(&pool, announcement_id).await?))
}

#[utoipa::path(
    put,
    path = "/v1/announcements/{id}/attendance",
    request_body = AttendanceRequest,
    params(("id" = i64, Path, description = "Event id")),
    responses(
        (status = 204, description = "Attendance saved"),
        (status = 400, description = "Not an event", body = crate::error::ErrorBody),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 404, description = "Event not found or caller is not a member", body = crate::error::ErrorBody),
    ),
    tag = "announcements"
)]
pub async fn set_attendance(
    Path(announcement_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    Json(request): Json<AttendanceRequest>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let announcement = fetch_announcement(&pool, announcement_id)
        .await?
        .ok_or(Error::NotFound(ANNOUNCEMENT_NOT_FOUND))?;
    let account_id = require_org_member(&pool, &caller, announcement.organization_id).await?;
    if announcement.kind != AnnouncementKind::Event {
        return Err(Error::validation("Only events track attendance."));
    }

    let assignments = Patch::new()
        .set(ResponseColumn::Attending, request.attending)
        .build()?;
    execute(
        &pool,
        &plans::set_attendance(account_id, announcement_id, assignments),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: AnnouncementKind, date: Option<&str>) -> CreateAnnouncementRequest {
        CreateAnnouncementRequest {
            kind,
            title: " Regatta ".to_string(),
            description: "Spring race".to_string(),
            date: date.map(str::to_string),
            location: Some("Boathouse".to_string()),
            members_only: true,
        }
    }

    #[test]
    fn events_need_a_date() {
        assert!(new_announcement(1, request(AnnouncementKind::Event, None)).is_err());
        let event = new_announcement(1, request(AnnouncementKind::Event, Some("2025-05-01")));
        assert!(event.is_ok_and(|event| event.title == "Regatta" && event.location.is_some()));
    }

    #[test]
    fn updates_drop_date_and_location() -> Result<()> {
        let update = new_announcement(1, request(AnnouncementKind::Update, Some("2025-05-01")))?;
        assert_eq!(update.date, None);
        assert_eq!(update.location, None);
        Ok(())
    }

    #[test]
    fn update_patch_rejects_event_fields() {
        let patch = UpdateAnnouncementRequest {
            location: Some("Boathouse".to_string()),
            ..UpdateAnnouncementRequest::default()
        };
        assert!(announcement_patch(AnnouncementKind::Update, &patch).is_err());
        assert!(announcement_patch(AnnouncementKind::Event, &patch).is_ok());
    }
}
