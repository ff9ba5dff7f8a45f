//! Self-service registration and public account images.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use utoipa::ToSchema;

use super::{
    auth::hash_password, check_new_password, image_response, optional_text, required_text,
    valid_display_name, valid_email,
};
use crate::{
    access::Role,
    error::{Error, Result},
    storage::accounts::{fetch_account_image, insert_account, AccountResponse, NewAccount},
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password: String,
    pub password_confirmation: String,
}

#[utoipa::path(
    post,
    path = "/v1/accounts",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorBody),
        (status = 409, description = "Username or email already taken", body = crate::error::ErrorBody),
    ),
    tag = "accounts"
)]
/// Registers a new local account. New accounts always start as members.
pub async fn register(
    pool: Extension<SqlitePool>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let username = required_text(&request.username, "Username")?;
    let display_name = required_text(&request.display_name, "Display name")?;
    if !valid_display_name(&display_name) {
        return Err(Error::validation(
            "Display name may only contain letters, digits and spaces.",
        ));
    }
    let email = request.email.trim().to_lowercase();
    if !valid_email(&email) {
        return Err(Error::validation("Invalid email address."));
    }
    check_new_password(&request.password, &request.password_confirmation)?;

    let password_hash = hash_password(&request.password).map_err(Error::internal)?;
    let phone_number = optional_text(request.phone_number.as_deref());

    let account = insert_account(
        &pool,
        &NewAccount {
            username: &username,
            display_name: &display_name,
            email: &email,
            phone_number: phone_number.as_deref(),
            password_hash: Some(&password_hash),
            federated: false,
            role: Role::Member,
        },
    )
    .await?;
    info!(account_id = account.id, "Account registered");

    Ok((StatusCode::CREATED, Json(account)))
}

#[utoipa::path(
    get,
    path = "/v1/accounts/{id}/image",
    params(("id" = i64, Path, description = "Account id")),
    responses(
        (status = 200, description = "Raw profile image", content_type = "application/octet-stream"),
        (status = 404, description = "No image", body = crate::error::ErrorBody),
    ),
    tag = "accounts"
)]
pub async fn account_image(
    Path(account_id): Path<i64>,
    pool: Extension<SqlitePool>,
) -> Result<impl IntoResponse> {
    fetch_account_image(&pool, account_id)
        .await?
        .map(image_response)
        .ok_or(Error::NotFound("Image not found."))
}
