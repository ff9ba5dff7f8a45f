//! Request payloads for organization-scoped APIs.
//!
//! Responses are the storage views; these are shared with `OpenAPI` generation.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::storage::announcements::AnnouncementKind;

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct UpdateOrganizationRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    /// Replaces all links; at most three.
    pub social_links: Option<Vec<String>>,
    /// Base64 image; blank removes it.
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct EmailPreferenceRequest {
    pub receive_emails: bool,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct AttendanceRequest {
    pub attending: bool,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateAnnouncementRequest {
    pub kind: AnnouncementKind,
    pub title: String,
    pub description: String,
    /// Required for events, ignored for updates.
    pub date: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub members_only: bool,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct UpdateAnnouncementRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub location: Option<String>,
    pub members_only: Option<bool>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnnouncementQuery {
    /// Only return this kind.
    pub kind: Option<AnnouncementKind>,
}
