//! Session endpoints for cookie and bearer auth.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use secrecy::ExposeSecret;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{
    state::AuthConfig,
    types::{LoginRequest, LoginResponse},
    utils::{generate_session_token, hash_session_token, verify_password},
};
use crate::{
    error::{Error, Result},
    storage::{
        accounts::{fetch_account, fetch_credentials_by_username},
        sessions::{delete_session, insert_session},
    },
};

pub(crate) const SESSION_COOKIE_NAME: &str = "clubhouse_session";

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session created", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<SqlitePool>,
    config: Extension<Arc<AuthConfig>>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    let token = match generate_session_token() {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to generate session token: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let response = match create_session(&pool, &config, &request, token).await {
        Ok(response) => response,
        Err(err) => return err.into_response(),
    };

    let mut headers = HeaderMap::new();
    match session_cookie(&config, &response.token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    (StatusCode::OK, headers, Json(response)).into_response()
}

async fn create_session(
    pool: &SqlitePool,
    config: &AuthConfig,
    request: &LoginRequest,
    token: String,
) -> Result<LoginResponse> {
    let credentials = fetch_credentials_by_username(pool, request.username.trim()).await?;

    // Federated accounts have no local password and cannot log in here.
    let account_id = match credentials {
        Some(credentials)
            if credentials
                .password_hash
                .as_deref()
                .is_some_and(|hash| verify_password(request.password.expose_secret(), hash)) =>
        {
            credentials.account_id
        }
        _ => {
            debug!("Rejected login for {}", request.username.trim());
            return Err(Error::Unauthenticated);
        }
    };

    insert_session(
        pool,
        account_id,
        &hash_session_token(&token),
        config.session_ttl_seconds(),
    )
    .await?;

    let account = fetch_account(pool, account_id)
        .await?
        .ok_or(Error::NotFound("Account not found."))?;
    info!(account_id, "Session created");

    Ok(LoginResponse {
        token,
        expires_in: config.session_ttl_seconds(),
        account,
    })
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<SqlitePool>,
    config: Extension<Arc<AuthConfig>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        let token_hash = hash_session_token(&token);
        if let Err(err) = delete_session(&pool, &token_hash).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

fn session_cookie(config: &AuthConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Bearer header first, then the session cookie.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, token) = pair.trim().split_once('=')?;
        (key.trim() == SESSION_COOKIE_NAME && !token.trim().is_empty())
            .then(|| token.trim().to_string())
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(name: axum::http::HeaderName, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn token_from_cookie() {
        let headers = headers(COOKIE, "theme=dark; clubhouse_session=abc123; other=1");
        assert_eq!(extract_session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = headers(COOKIE, "clubhouse_session=cookie");
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer header"));
        assert_eq!(extract_session_token(&headers).as_deref(), Some("header"));
    }

    #[test]
    fn empty_values_are_ignored() {
        assert_eq!(
            extract_session_token(&headers(COOKIE, "clubhouse_session=")),
            None
        );
        assert_eq!(
            extract_session_token(&headers(AUTHORIZATION, "Bearer   ")),
            None
        );
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn cookie_flags() -> Result<(), InvalidHeaderValue> {
        let secure = AuthConfig::new("https://clubs.example.com".to_string());
        let cookie = session_cookie(&secure, "tok")?;
        let cookie = cookie.to_str().unwrap_or_default();
        assert!(cookie.starts_with("clubhouse_session=tok;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.ends_with("; Secure"));

        let cleared = clear_session_cookie(&AuthConfig::default())?;
        assert!(cleared.to_str().unwrap_or_default().contains("Max-Age=0"));
        Ok(())
    }
}
