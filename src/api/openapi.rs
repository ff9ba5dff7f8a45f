use utoipa::{
    openapi::{Contact, Info, InfoBuilder, License},
    OpenApi,
};

use super::handlers::{
    accounts, admin, auth, health, me,
    orgs::{announcements, membership, organizations, types},
};
use crate::{
    access::Role,
    error::ErrorBody,
    storage::{
        accounts::AccountResponse,
        announcements::{AnnouncementKind, AnnouncementResponse, AttendanceResponse},
        organizations::{ManagerResponse, MemberResponse, OrganizationCard, OrganizationResponse},
    },
};

/// Every documented route. Add new handlers here and in `api::router`.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        accounts::register,
        accounts::account_image,
        auth::session::login,
        auth::session::logout,
        me::get_me,
        me::patch_me,
        me::delete_me,
        me::my_orgs,
        me::my_managed_orgs,
        me::my_feed,
        organizations::list_orgs,
        organizations::get_org,
        organizations::org_image,
        organizations::org_managers,
        organizations::patch_org,
        membership::join_org,
        membership::leave_org,
        membership::set_notifications,
        membership::org_members,
        membership::remove_member,
        announcements::list_announcements,
        announcements::create_announcement,
        announcements::patch_announcement,
        announcements::delete_announcement,
        announcements::event_attendance,
        announcements::set_attendance,
        admin::admin_list_accounts,
        admin::admin_patch_account,
        admin::admin_delete_account,
        admin::admin_create_org,
        admin::admin_delete_org,
        admin::admin_assign_manager,
        admin::admin_unassign_manager,
    ),
    components(schemas(
        ErrorBody,
        Role,
        health::Health,
        AccountResponse,
        accounts::RegisterRequest,
        auth::types::LoginRequest,
        auth::types::LoginResponse,
        me::UpdateMeRequest,
        me::DeleteMeRequest,
        OrganizationCard,
        OrganizationResponse,
        MemberResponse,
        ManagerResponse,
        AnnouncementKind,
        AnnouncementResponse,
        AttendanceResponse,
        types::UpdateOrganizationRequest,
        types::EmailPreferenceRequest,
        types::AttendanceRequest,
        types::CreateAnnouncementRequest,
        types::UpdateAnnouncementRequest,
        admin::AdminUpdateAccountRequest,
        admin::CreateOrganizationRequest,
    )),
    tags(
        (name = "health", description = "Liveness and build info"),
        (name = "accounts", description = "Registration and profile images"),
        (name = "auth", description = "Session login and logout"),
        (name = "me", description = "The signed-in account"),
        (name = "orgs", description = "Organization directory and profiles"),
        (name = "membership", description = "Joining, leaving and member rosters"),
        (name = "announcements", description = "Events, updates and attendance"),
        (name = "admin", description = "Account and organization administration"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info = cargo_info();
    doc
}

fn cargo_info() -> Info {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    fn non_empty(value: &str) -> Option<&str> {
        Some(value.trim()).filter(|value| !value.is_empty())
    }

    match author.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (non_empty(author), None),
    }
}
