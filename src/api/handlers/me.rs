//! Self-service endpoints for the authenticated account.
//!
//! Profile fields (display name, phone, image) change freely. Username, email
//! and password changes require the current password, and federated accounts
//! cannot change them at all since the identity provider owns them.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use utoipa::ToSchema;

use super::{
    auth::{hash_password, resolve_caller, verify_password},
    check_new_password, clearable_image, clearable_text, required_text, valid_display_name,
    valid_email,
};
use crate::{
    access::{require_account, Role},
    error::{Error, Result},
    mutation::{execute, plans, AccountColumn, Patch},
    storage::{
        accounts::{fetch_account, fetch_credentials, AccountResponse, Credentials},
        announcements::{feed_for_account, AnnouncementResponse},
        organizations::{list_joined, list_managed, list_organizations, OrganizationCard},
    },
};

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct UpdateMeRequest {
    pub display_name: Option<String>,
    /// Blank clears the number.
    pub phone_number: Option<String>,
    /// Base64 image; blank removes it.
    pub image: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub new_password: Option<String>,
    pub new_password_confirmation: Option<String>,
    /// Required when changing username, email or password.
    pub current_password: Option<String>,
}

impl UpdateMeRequest {
    fn changes_identity(&self) -> bool {
        self.username.is_some() || self.email.is_some() || self.new_password.is_some()
    }
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct DeleteMeRequest {
    /// Current password; ignored for federated accounts.
    pub password: Option<String>,
}

/// Display name, phone number and image assignments shared with the admin edit.
pub(crate) fn profile_patch(
    display_name: Option<&str>,
    phone_number: Option<&str>,
    image: Option<&str>,
) -> Result<Patch<AccountColumn>> {
    let display_name = match display_name {
        Some(name) => {
            let name = required_text(name, "Display name")?;
            if !valid_display_name(&name) {
                return Err(Error::validation(
                    "Display name may only contain letters, digits and spaces.",
                ));
            }
            Some(name)
        }
        None => None,
    };

    Ok(Patch::new()
        .set_some(AccountColumn::DisplayName, display_name)
        .set_some(AccountColumn::PhoneNumber, clearable_text(phone_number))
        .set_some(AccountColumn::Image, clearable_image(image)?))
}

/// Username and email assignments shared with the admin edit.
pub(crate) fn identity_patch(
    patch: Patch<AccountColumn>,
    username: Option<&str>,
    email: Option<&str>,
) -> Result<Patch<AccountColumn>> {
    let username = username
        .map(|username| required_text(username, "Username"))
        .transpose()?;
    let email = match email {
        Some(email) => {
            let email = email.trim().to_lowercase();
            if !valid_email(&email) {
                return Err(Error::validation("Invalid email address."));
            }
            Some(email)
        }
        None => None,
    };
    Ok(patch
        .set_some(AccountColumn::Username, username)
        .set_some(AccountColumn::Email, email))
}

fn reauthenticate(credentials: &Credentials, password: Option<&str>) -> Result<()> {
    let verified = match (credentials.password_hash.as_deref(), password) {
        (Some(hash), Some(password)) => verify_password(password, hash),
        _ => false,
    };
    if verified {
        Ok(())
    } else {
        Err(Error::validation("Current password is incorrect."))
    }
}

async fn load_credentials(pool: &SqlitePool, account_id: i64) -> Result<Credentials> {
    fetch_credentials(pool, account_id)
        .await?
        .ok_or(Error::NotFound("Account not found."))
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Caller's account", body = AccountResponse),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
    ),
    tag = "me"
)]
pub async fn get_me(headers: HeaderMap, pool: Extension<SqlitePool>) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_account(&caller, Role::Member)?;
    let account = fetch_account(&pool, account_id)
        .await?
        .ok_or(Error::NotFound("Account not found."))?;
    Ok(Json(account))
}

#[utoipa::path(
    patch,
    path = "/v1/me",
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Account updated", body = AccountResponse),
        (status = 400, description = "Invalid input or wrong current password", body = crate::error::ErrorBody),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 409, description = "Username or email already taken", body = crate::error::ErrorBody),
    ),
    tag = "me"
)]
pub async fn patch_me(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    Json(request): Json<UpdateMeRequest>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_account(&caller, Role::Member)?;

    let mut patch = profile_patch(
        request.display_name.as_deref(),
        request.phone_number.as_deref(),
        request.image.as_deref(),
    )?;

    if request.changes_identity() {
        let credentials = load_credentials(&pool, account_id).await?;
        if credentials.federated {
            return Err(Error::validation(
                "Username, email and password are managed by your identity provider.",
            ));
        }
        reauthenticate(&credentials, request.current_password.as_deref())?;

        patch = identity_patch(patch, request.username.as_deref(), request.email.as_deref())?;
        if let Some(password) = request.new_password.as_deref() {
            check_new_password(
                password,
                request.new_password_confirmation.as_deref().unwrap_or_default(),
            )?;
            let hash = hash_password(password).map_err(Error::internal)?;
            patch = patch.set(AccountColumn::PasswordHash, hash);
        }
    }

    execute(&pool, &plans::update_account(account_id, patch.build()?)).await?;
    info!(account_id, "Account updated");

    let account = fetch_account(&pool, account_id)
        .await?
        .ok_or(Error::NotFound("Account not found."))?;
    Ok(Json(account))
}

#[utoipa::path(
    delete,
    path = "/v1/me",
    request_body = DeleteMeRequest,
    responses(
        (status = 204, description = "Account and everything it owns deleted"),
        (status = 400, description = "Wrong password", body = crate::error::ErrorBody),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 503, description = "Deletion rolled back; retry", body = crate::error::ErrorBody),
    ),
    tag = "me"
)]
pub async fn delete_me(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    request: Option<Json<DeleteMeRequest>>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_account(&caller, Role::Member)?;
    let request = request.map(|Json(request)| request).unwrap_or_default();

    let credentials = load_credentials(&pool, account_id).await?;
    if !credentials.federated {
        reauthenticate(&credentials, request.password.as_deref())?;
    }

    execute(&pool, &plans::delete_account(account_id)).await?;
    info!(account_id, "Account deleted by owner");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/me/orgs",
    responses(
        (status = 200, description = "Joined organizations", body = [OrganizationCard]),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
    ),
    tag = "me"
)]
pub async fn my_orgs(headers: HeaderMap, pool: Extension<SqlitePool>) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_account(&caller, Role::Member)?;
    Ok(Json(list_joined(&pool, account_id).await?))
}

#[utoipa::path(
    get,
    path = "/v1/me/managed-orgs",
    responses(
        (status = 200, description = "Organizations the caller manages", body = [OrganizationCard]),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 403, description = "Manager role required", body = crate::error::ErrorBody),
    ),
    tag = "me"
)]
/// Admins manage every organization, so they get the full directory.
pub async fn my_managed_orgs(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_account(&caller, Role::Manager)?;
    let organizations = if caller.is_admin() {
        list_organizations(&pool).await?
    } else {
        list_managed(&pool, account_id).await?
    };
    Ok(Json(organizations))
}

#[utoipa::path(
    get,
    path = "/v1/me/feed",
    responses(
        (status = 200, description = "Announcements from joined organizations", body = [AnnouncementResponse]),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
    ),
    tag = "me"
)]
pub async fn my_feed(headers: HeaderMap, pool: Extension<SqlitePool>) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_account(&caller, Role::Member)?;
    Ok(Json(feed_for_account(&pool, account_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_patch_validates_display_name() {
        assert!(profile_patch(Some("Ann <b>"), None, None).is_err());
        assert!(profile_patch(Some("   "), None, None).is_err());
        let patch = profile_patch(Some("Ann Lee"), Some(""), None);
        let assignments = patch.and_then(Patch::build);
        assert!(assignments.is_ok_and(|a| a.contains("display_name") && a.contains("phone_number")));
    }

    #[test]
    fn identity_patch_normalizes_email() -> Result<()> {
        let assignments = identity_patch(Patch::new(), None, Some(" Ann@Example.COM "))?.build()?;
        assert_eq!(
            assignments.columns(),
            &[("email", crate::mutation::Value::Text("ann@example.com".to_string()))]
        );
        assert!(identity_patch(Patch::new(), Some(" "), None).is_err());
        Ok(())
    }

    #[test]
    fn federated_accounts_never_reauthenticate() {
        let federated = Credentials {
            account_id: 1,
            password_hash: None,
            federated: true,
        };
        assert!(reauthenticate(&federated, Some("anything1")).is_err());
    }

    #[test]
    fn identity_fields_are_detected() {
        assert!(!UpdateMeRequest::default().changes_identity());
        let request = UpdateMeRequest {
            email: Some("new@example.com".to_string()),
            ..UpdateMeRequest::default()
        };
        assert!(request.changes_identity());
    }
}
