//! Admin-only account and organization management.
//!
//! Every handler gates on [`Role::Admin`] before touching the datastore.
//! Account and organization deletion run the full cascade plans.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use utoipa::ToSchema;

use super::{
    auth::resolve_caller,
    decode_image,
    me::{identity_patch, profile_patch},
    optional_text,
    orgs::organizations::{organization_identity, social_links},
};
use crate::{
    access::{organization_exists, require_account, Caller, Role},
    error::{Error, Result},
    mutation::{execute, plans, AccountColumn},
    storage::{
        accounts::{fetch_account, fetch_credentials, list_accounts, AccountResponse},
        organizations::{insert_organization, NewOrganization, OrganizationResponse},
    },
};

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct AdminUpdateAccountRequest {
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    pub image: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    /// Guests are never stored, so `guest` is rejected.
    pub role: Option<Role>,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct CreateOrganizationRequest {
    pub name: String,
    pub email: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    #[serde(default)]
    pub social_links: Vec<String>,
    /// Base64 image.
    pub image: Option<String>,
}

fn require_admin(caller: &Caller) -> Result<i64> {
    require_account(caller, Role::Admin)
}

#[utoipa::path(
    get,
    path = "/v1/admin/accounts",
    responses(
        (status = 200, description = "All accounts", body = [AccountResponse]),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn admin_list_accounts(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    require_admin(&caller)?;
    Ok(Json(list_accounts(&pool).await?))
}

#[utoipa::path(
    patch,
    path = "/v1/admin/accounts/{id}",
    request_body = AdminUpdateAccountRequest,
    params(("id" = i64, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account updated", body = AccountResponse),
        (status = 400, description = "Invalid input or identity change on a federated account", body = crate::error::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Account not found", body = crate::error::ErrorBody),
        (status = 409, description = "Username or email already taken", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn admin_patch_account(
    Path(account_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    Json(request): Json<AdminUpdateAccountRequest>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let admin_id = require_admin(&caller)?;

    if request.role == Some(Role::Guest) {
        return Err(Error::validation("Accounts cannot be demoted to guest."));
    }

    let patch = profile_patch(
        request.display_name.as_deref(),
        request.phone_number.as_deref(),
        request.image.as_deref(),
    )?;
    if request.username.is_some() || request.email.is_some() {
        let credentials = fetch_credentials(&pool, account_id)
            .await?
            .ok_or(Error::NotFound("Account not found."))?;
        if credentials.federated {
            return Err(Error::validation(
                "Username and email of federated accounts are managed by their identity provider.",
            ));
        }
    }
    let patch = identity_patch(patch, request.username.as_deref(), request.email.as_deref())?
        .set_some(AccountColumn::Role, request.role.map(Role::level));

    // Demotion below manager also drops the account's manager assignments.
    execute(
        &pool,
        &plans::update_account_role(account_id, patch.build()?, request.role),
    )
    .await?;
    info!(admin_id, account_id, role = ?request.role, "Account updated by admin");

    fetch_account(&pool, account_id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("Account not found."))
}

#[utoipa::path(
    delete,
    path = "/v1/admin/accounts/{id}",
    params(("id" = i64, Path, description = "Account id")),
    responses(
        (status = 204, description = "Account and everything it owns deleted"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Account not found", body = crate::error::ErrorBody),
        (status = 503, description = "Deletion rolled back; retry", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn admin_delete_account(
    Path(account_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let admin_id = require_admin(&caller)?;

    execute(&pool, &plans::delete_account(account_id)).await?;
    info!(admin_id, account_id, "Account deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/admin/orgs",
    request_body = CreateOrganizationRequest,
    responses(
        (status = 201, description = "Organization created", body = OrganizationResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn admin_create_org(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let admin_id = require_admin(&caller)?;

    let (name, email) = organization_identity(&request.name, &request.email)?;
    let image = request
        .image
        .as_deref()
        .filter(|image| !image.trim().is_empty())
        .map(decode_image)
        .transpose()?;

    let organization = insert_organization(
        &pool,
        &NewOrganization {
            name,
            email,
            summary: optional_text(request.summary.as_deref()),
            description: optional_text(request.description.as_deref()),
            details: optional_text(request.details.as_deref()),
            social_links: social_links(&request.social_links)?,
            image,
        },
    )
    .await?;
    info!(admin_id, organization_id = organization.id, "Organization created");

    Ok((StatusCode::CREATED, Json(organization)))
}

#[utoipa::path(
    delete,
    path = "/v1/admin/orgs/{id}",
    params(("id" = i64, Path, description = "Organization id")),
    responses(
        (status = 204, description = "Organization and all dependent rows deleted"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Organization not found", body = crate::error::ErrorBody),
        (status = 503, description = "Deletion rolled back; retry", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn admin_delete_org(
    Path(organization_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let admin_id = require_admin(&caller)?;

    let outcome = execute(&pool, &plans::delete_organization(organization_id)).await?;
    info!(
        admin_id,
        organization_id,
        rows = outcome.total_rows(),
        "Organization deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/admin/orgs/{id}/managers/{account_id}",
    params(
        ("id" = i64, Path, description = "Organization id"),
        ("account_id" = i64, Path, description = "Account to assign"),
    ),
    responses(
        (status = 204, description = "Manager assigned"),
        (status = 400, description = "Account does not hold the manager role", body = crate::error::ErrorBody),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Account or organization not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already assigned", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
/// Only accounts already holding the manager role (or admin) can be assigned.
pub async fn admin_assign_manager(
    Path((organization_id, account_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let admin_id = require_admin(&caller)?;

    let account = fetch_account(&pool, account_id)
        .await?
        .ok_or(Error::NotFound("Account not found."))?;
    if account.role < Role::Manager {
        return Err(Error::validation("Account must hold the manager role."));
    }
    if !organization_exists(&*pool, organization_id).await? {
        return Err(Error::NotFound("Organization not found."));
    }

    execute(&pool, &plans::assign_manager(account_id, organization_id)).await?;
    info!(admin_id, account_id, organization_id, "Manager assigned");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/admin/orgs/{id}/managers/{account_id}",
    params(
        ("id" = i64, Path, description = "Organization id"),
        ("account_id" = i64, Path, description = "Assigned account"),
    ),
    responses(
        (status = 204, description = "Manager unassigned"),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Assignment not found", body = crate::error::ErrorBody),
    ),
    tag = "admin"
)]
pub async fn admin_unassign_manager(
    Path((organization_id, account_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let admin_id = require_admin(&caller)?;

    execute(&pool, &plans::unassign_manager(account_id, organization_id)).await?;
    info!(admin_id, account_id, organization_id, "Manager unassigned");
    Ok(StatusCode::NO_CONTENT)
}
