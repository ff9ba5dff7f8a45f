use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{delete, get, patch, post, put},
    Extension, Router,
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

use crate::storage::{self, sessions::purge_expired};

pub mod email;
pub mod handlers;
// OpenAPI document and Swagger UI wiring live in openapi.rs.
mod openapi;

pub use openapi::openapi;

use handlers::{
    accounts, admin,
    auth::{self, AuthConfig},
    health, me,
    orgs::{announcements, membership, organizations},
};

/// Base64 inflates a 16 MiB image to roughly 22 MiB of JSON.
const MAX_REQUEST_BYTES: usize = 24 * 1024 * 1024;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Build the application router with its request-scoped layers.
///
/// Shared by the server and the router tests; CORS is added by [`new`]
/// because it depends on the deployed frontend origin.
pub fn router(pool: SqlitePool, auth_config: Arc<AuthConfig>) -> Router {
    Router::new()
        .route(
            "/health",
            get(health::health)
                .head(health::health)
                .options(health::health),
        )
        .route("/v1/accounts", post(accounts::register))
        .route("/v1/accounts/:id/image", get(accounts::account_image))
        .route("/v1/auth/login", post(auth::session::login))
        .route("/v1/auth/logout", post(auth::session::logout))
        .route(
            "/v1/me",
            get(me::get_me).patch(me::patch_me).delete(me::delete_me),
        )
        .route("/v1/me/orgs", get(me::my_orgs))
        .route("/v1/me/managed-orgs", get(me::my_managed_orgs))
        .route("/v1/me/feed", get(me::my_feed))
        .route("/v1/orgs", get(organizations::list_orgs))
        .route(
            "/v1/orgs/:id",
            get(organizations::get_org).patch(organizations::patch_org),
        )
        .route("/v1/orgs/:id/image", get(organizations::org_image))
        .route("/v1/orgs/:id/managers", get(organizations::org_managers))
        .route("/v1/orgs/:id/join", post(membership::join_org))
        .route("/v1/orgs/:id/leave", post(membership::leave_org))
        .route(
            "/v1/orgs/:id/notifications",
            put(membership::set_notifications),
        )
        .route("/v1/orgs/:id/members", get(membership::org_members))
        .route(
            "/v1/orgs/:id/members/:account_id",
            delete(membership::remove_member),
        )
        .route(
            "/v1/orgs/:id/announcements",
            get(announcements::list_announcements).post(announcements::create_announcement),
        )
        .route(
            "/v1/orgs/:id/announcements/:announcement_id",
            patch(announcements::patch_announcement).delete(announcements::delete_announcement),
        )
        .route(
            "/v1/orgs/:id/announcements/:announcement_id/attendance",
            get(announcements::event_attendance),
        )
        .route(
            "/v1/announcements/:id/attendance",
            put(announcements::set_attendance),
        )
        .route("/v1/admin/accounts", get(admin::admin_list_accounts))
        .route(
            "/v1/admin/accounts/:id",
            patch(admin::admin_patch_account).delete(admin::admin_delete_account),
        )
        .route("/v1/admin/orgs", post(admin::admin_create_org))
        .route("/v1/admin/orgs/:id", delete(admin::admin_delete_org))
        .route(
            "/v1/admin/orgs/:id/managers/:account_id",
            post(admin::admin_assign_manager).delete(admin::admin_unassign_manager),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
                .layer(Extension(auth_config))
                .layer(Extension(pool)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    max_connections: u32,
    auth_config: AuthConfig,
    email_config: email::EmailWorkerConfig,
) -> Result<()> {
    let pool = storage::connect(&dsn, max_connections)
        .await
        .context("Failed to connect to database")?;
    storage::apply_schema(&pool)
        .await
        .context("Failed to apply database schema")?;

    // Background worker polls email_outbox for pending rows, delivers/logs
    // them, and retries failures with exponential backoff.
    email::spawn_outbox_worker(pool.clone(), Arc::new(email::LogEmailSender), email_config);
    spawn_session_purge(pool.clone());

    let frontend_origin = frontend_origin(auth_config.frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = router(pool, Arc::new(auth_config)).layer(cors);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// Periodically drop expired sessions so the table does not grow unbounded.
fn spawn_session_purge(pool: SqlitePool) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match purge_expired(&pool).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Purged expired sessions"),
                Err(err) => error!("Failed to purge expired sessions: {err}"),
            }
        }
    })
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_drops_path() -> Result<()> {
        let origin = frontend_origin("https://clubs.example.com:8443/app/")?;
        assert_eq!(origin, "https://clubs.example.com:8443");
        let origin = frontend_origin("http://localhost:8080")?;
        assert_eq!(origin, "http://localhost:8080");
        assert!(frontend_origin("not a url").is_err());
        Ok(())
    }
}
