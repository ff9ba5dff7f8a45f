//! # Clubhouse (club management backend)
//!
//! `clubhouse` manages accounts, organizations ("clubs"), memberships, manager
//! assignments and announcements (events and updates) published inside an
//! organization.
//!
//! ## Authorization
//!
//! Every operation is gated in two stages:
//!
//! - **Role gate:** accounts carry one global role ordered
//!   `guest < member < manager < admin`. Anonymous callers are guests.
//! - **Resource scope:** organization-scoped operations also require a
//!   membership or manager-assignment row linking the caller to the
//!   organization. Admins bypass the scope check.
//!
//! Scope failures return `404 Not Found` rather than `403 Forbidden` so callers
//! cannot probe which organizations exist.
//!
//! ## Writes
//!
//! Every multi-row change is a declarative [`mutation::WritePlan`] executed in
//! a single transaction. Join tables carry no `ON DELETE CASCADE`; deleting a
//! parent runs an ordered plan that removes dependants first, so either the
//! whole cascade commits or nothing changes.

pub mod access;
pub mod api;
pub mod cli;
pub mod error;
pub mod mutation;
pub mod storage;

pub use error::{Error, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
