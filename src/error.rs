//! Error taxonomy shared by the access layer, the mutator and the HTTP edge.
//!
//! Each variant has its own category string and status code. Datastore details
//! are logged server-side and never echoed back to callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::access::Role;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("authentication required")]
    Unauthenticated,

    #[error("role {required} required, caller has {actual}")]
    InsufficientRole { required: Role, actual: Role },

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    ValidationFailed(String),

    #[error("{0}")]
    ConflictFailed(&'static str),

    #[error("plan {plan} failed at step {step} ({label}): {cause}")]
    MutationFailed {
        plan: &'static str,
        step: usize,
        label: String,
        #[source]
        cause: sqlx::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InsufficientRole { .. } => "insufficient_role",
            Self::NotFound(_) => "not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::ConflictFailed(_) => "conflict",
            Self::MutationFailed { .. } => "mutation_failed",
            Self::Database(_) => "database",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::InsufficientRole { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::ConflictFailed(_) => StatusCode::CONFLICT,
            Self::MutationFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A failed plan left the datastore untouched, so the same request may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::MutationFailed { .. })
    }

    fn public_message(&self) -> String {
        match self {
            Self::MutationFailed { .. } => {
                "The change could not be applied; nothing was modified. Retry the request."
                    .to_string()
            }
            Self::Database(_) => "Internal datastore error.".to_string(),
            Self::Internal(_) => "Internal server error.".to_string(),
            other => other.to_string(),
        }
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub category: String,
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Self::MutationFailed { .. } => warn!("{self}"),
            Self::Database(err) => error!("Datastore failure: {err}"),
            Self::Internal(message) => error!("Internal failure: {message}"),
            _ => {}
        }

        let body = ErrorBody {
            category: self.category().to_string(),
            message: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
