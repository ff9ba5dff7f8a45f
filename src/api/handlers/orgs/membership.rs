//! Joining, leaving and member administration.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::SqlitePool;
use tracing::info;

use super::{super::auth::resolve_caller, types::EmailPreferenceRequest};
use crate::{
    access::{organization_exists, require_account, require_org_manager, require_org_member, Role},
    error::{Error, Result},
    mutation::{execute, plans, MembershipColumn, Patch},
    storage::organizations::{list_members, MemberResponse},
};

#[utoipa::path(
    post,
    path = "/v1/orgs/{id}/join",
    params(("id" = i64, Path, description = "Organization id")),
    responses(
        (status = 204, description = "Joined; existing announcements were added to the caller's feed"),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 404, description = "Organization not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already a member", body = crate::error::ErrorBody),
    ),
    tag = "membership"
)]
pub async fn join_org(
    Path(organization_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_account(&caller, Role::Member)?;
    if !organization_exists(&*pool, organization_id).await? {
        return Err(Error::NotFound("Organization not found."));
    }

    let outcome = execute(&pool, &plans::join_organization(account_id, organization_id)).await?;
    info!(
        account_id,
        organization_id,
        backfilled = outcome.rows_affected().get(1).copied().unwrap_or_default(),
        "Joined organization"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/orgs/{id}/leave",
    params(("id" = i64, Path, description = "Organization id")),
    responses(
        (status = 204, description = "Left the organization"),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 404, description = "Not a member", body = crate::error::ErrorBody),
    ),
    tag = "membership"
)]
pub async fn leave_org(
    Path(organization_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_account(&caller, Role::Member)?;

    execute(&pool, &plans::leave_organization(account_id, organization_id)).await?;
    info!(account_id, organization_id, "Left organization");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/v1/orgs/{id}/notifications",
    request_body = EmailPreferenceRequest,
    params(("id" = i64, Path, description = "Organization id")),
    responses(
        (status = 204, description = "Preference saved"),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 404, description = "Not a member", body = crate::error::ErrorBody),
    ),
    tag = "membership"
)]
pub async fn set_notifications(
    Path(organization_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    Json(request): Json<EmailPreferenceRequest>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_org_member(&pool, &caller, organization_id).await?;

    let assignments = Patch::new()
        .set(MembershipColumn::ReceiveEmails, request.receive_emails)
        .build()?;
    execute(
        &pool,
        &plans::set_email_preference(account_id, organization_id, assignments),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/orgs/{id}/members",
    params(("id" = i64, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Member roster", body = [MemberResponse]),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 403, description = "Manager role required", body = crate::error::ErrorBody),
        (status = 404, description = "Organization not found or not managed by the caller", body = crate::error::ErrorBody),
    ),
    tag = "membership"
)]
pub async fn org_members(
    Path(organization_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    require_org_manager(&pool, &caller, organization_id).await?;
    Ok(Json(list_members(&pool, organization_id).await?))
}

#[utoipa::path(
    delete,
    path = "/v1/orgs/{id}/members/{account_id}",
    params(
        ("id" = i64, Path, description = "Organization id"),
        ("account_id" = i64, Path, description = "Member account id"),
    ),
    responses(
        (status = 204, description = "Member removed with their responses"),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 403, description = "Manager role required", body = crate::error::ErrorBody),
        (status = 404, description = "Organization or membership not found", body = crate::error::ErrorBody),
    ),
    tag = "membership"
)]
pub async fn remove_member(
    Path((organization_id, member_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let manager_id = require_org_manager(&pool, &caller, organization_id).await?;

    execute(&pool, &plans::leave_organization(member_id, organization_id)).await?;
    info!(manager_id, member_id, organization_id, "Member removed");
    Ok(StatusCode::NO_CONTENT)
}
