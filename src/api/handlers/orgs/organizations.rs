//! Organization directory and profile handlers.

use axum::{
    extract::{Extension, Path},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use sqlx::SqlitePool;
use tracing::info;

use super::{
    super::{
        auth::resolve_caller, clearable_image, clearable_text, image_response, optional_text,
        required_text, valid_email,
    },
    types::UpdateOrganizationRequest,
    MAX_SOCIAL_LINKS,
};
use crate::{
    access::require_org_manager,
    error::{Error, Result},
    mutation::{execute, plans, OrganizationColumn, Patch},
    storage::organizations::{
        fetch_organization, fetch_organization_image, list_managers, list_organizations,
        ManagerResponse, OrganizationCard, OrganizationResponse,
    },
};

/// Normalize up to three social links; blanks are dropped.
pub(crate) fn social_links(links: &[String]) -> Result<[Option<String>; MAX_SOCIAL_LINKS]> {
    let links: Vec<String> = links
        .iter()
        .filter_map(|link| optional_text(Some(link.as_str())))
        .collect();
    if links.len() > MAX_SOCIAL_LINKS {
        return Err(Error::validation(format!(
            "At most {MAX_SOCIAL_LINKS} social links are allowed."
        )));
    }
    let mut slots: [Option<String>; MAX_SOCIAL_LINKS] = Default::default();
    for (slot, link) in slots.iter_mut().zip(links) {
        *slot = Some(link);
    }
    Ok(slots)
}

/// Name must be present and the contact email well formed.
pub(crate) fn organization_identity(name: &str, email: &str) -> Result<(String, String)> {
    let name = required_text(name, "Organization name")?;
    let email = email.trim().to_lowercase();
    if !valid_email(&email) {
        return Err(Error::validation("Invalid organization email."));
    }
    Ok((name, email))
}

fn organization_patch(request: &UpdateOrganizationRequest) -> Result<Patch<OrganizationColumn>> {
    let name = request
        .name
        .as_deref()
        .map(|name| required_text(name, "Organization name"))
        .transpose()?;
    let email = match request.email.as_deref() {
        Some(email) => {
            let email = email.trim().to_lowercase();
            if !valid_email(&email) {
                return Err(Error::validation("Invalid organization email."));
            }
            Some(email)
        }
        None => None,
    };

    let mut patch = Patch::new()
        .set_some(OrganizationColumn::Name, name)
        .set_some(OrganizationColumn::Email, email)
        .set_some(OrganizationColumn::Summary, clearable_text(request.summary.as_deref()))
        .set_some(
            OrganizationColumn::Description,
            clearable_text(request.description.as_deref()),
        )
        .set_some(OrganizationColumn::Details, clearable_text(request.details.as_deref()))
        .set_some(OrganizationColumn::Image, clearable_image(request.image.as_deref())?);

    if let Some(links) = &request.social_links {
        for (column, link) in OrganizationColumn::SOCIAL_LINKS.into_iter().zip(social_links(links)?) {
            patch = patch.set(column, link);
        }
    }
    Ok(patch)
}

#[utoipa::path(
    get,
    path = "/v1/orgs",
    responses(
        (status = 200, description = "Organization directory", body = [OrganizationCard]),
    ),
    tag = "orgs"
)]
pub async fn list_orgs(pool: Extension<SqlitePool>) -> Result<impl IntoResponse> {
    Ok(Json(list_organizations(&pool).await?))
}

#[utoipa::path(
    get,
    path = "/v1/orgs/{id}",
    params(("id" = i64, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization detail", body = OrganizationResponse),
        (status = 404, description = "Organization not found", body = crate::error::ErrorBody),
    ),
    tag = "orgs"
)]
pub async fn get_org(
    Path(organization_id): Path<i64>,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    fetch_organization(&pool, organization_id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("Organization not found."))
}

#[utoipa::path(
    get,
    path = "/v1/orgs/{id}/image",
    params(("id" = i64, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Raw organization image", content_type = "application/octet-stream"),
        (status = 404, description = "No image", body = crate::error::ErrorBody),
    ),
    tag = "orgs"
)]
pub async fn org_image(
    Path(organization_id): Path<i64>,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    fetch_organization_image(&pool, organization_id)
        .await?
        .map(image_response)
        .ok_or(Error::NotFound("Image not found."))
}

#[utoipa::path(
    get,
    path = "/v1/orgs/{id}/managers",
    params(("id" = i64, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Managers of the organization", body = [ManagerResponse]),
        (status = 404, description = "Organization not found", body = crate::error::ErrorBody),
    ),
    tag = "orgs"
)]
pub async fn org_managers(
    Path(organization_id): Path<i64>,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    if fetch_organization(&pool, organization_id).await?.is_none() {
        return Err(Error::NotFound("Organization not found."));
    }
    Ok(Json(list_managers(&pool, organization_id).await?))
}

#[utoipa::path(
    patch,
    path = "/v1/orgs/{id}",
    request_body = UpdateOrganizationRequest,
    params(("id" = i64, Path, description = "Organization id")),
    responses(
        (status = 200, description = "Organization updated", body = OrganizationResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 401, description = "Not signed in", body = crate::error::ErrorBody),
        (status = 403, description = "Manager role required", body = crate::error::ErrorBody),
        (status = 404, description = "Organization not found or not managed by the caller", body = crate::error::ErrorBody),
    ),
    tag = "orgs"
)]
/// Updates the organization profile. Managers can only edit organizations
/// they are assigned to; admins can edit any.
pub async fn patch_org(
    Path(organization_id): Path<i64>,
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    Json(request): Json<UpdateOrganizationRequest>,
) -> Result<impl IntoResponse> {
    let caller = resolve_caller(&headers, &pool).await?;
    let account_id = require_org_manager(&pool, &caller, organization_id).await?;

    let assignments = organization_patch(&request)?.build()?;
    execute(&pool, &plans::update_organization(organization_id, assignments)).await?;
    info!(account_id, organization_id, "Organization updated");

    fetch_organization(&pool, organization_id)
        .await?
        .map(Json)
        .ok_or(Error::NotFound("Organization not found."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn social_links_fill_slots_in_order() -> Result<()> {
        let links = social_links(&[
            "https://a.example".to_string(),
            "  ".to_string(),
            "https://b.example".to_string(),
        ])?;
        assert_eq!(
            links,
            [
                Some("https://a.example".to_string()),
                Some("https://b.example".to_string()),
                None
            ]
        );
        let too_many = vec!["x".to_string(); 4];
        assert!(social_links(&too_many).is_err());
        Ok(())
    }

    #[test]
    fn organization_patch_rejects_blank_name() {
        let request = UpdateOrganizationRequest {
            name: Some("  ".to_string()),
            ..UpdateOrganizationRequest::default()
        };
        assert!(organization_patch(&request).is_err());
    }

    #[test]
    fn replacing_links_clears_unused_slots() -> Result<()> {
        let request = UpdateOrganizationRequest {
            social_links: Some(vec!["https://a.example".to_string()]),
            ..UpdateOrganizationRequest::default()
        };
        let assignments = organization_patch(&request)?.build()?;
        assert_eq!(assignments.columns().len(), 3);
        assert!(assignments.contains("social_link_3"));
        Ok(())
    }
}
