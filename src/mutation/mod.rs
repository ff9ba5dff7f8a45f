//! Cascade-consistent writes.
//!
//! Callers describe a change as a [`WritePlan`] (usually one of [`plans`]) and
//! hand it to [`execute`], which runs every step in one transaction.

pub mod executor;
pub mod patch;
pub mod plan;
pub mod plans;

pub use executor::{execute, MutationState, PlanOutcome};
pub use patch::{
    AccountColumn, AnnouncementColumn, Assignments, MembershipColumn, OrganizationColumn, Patch,
    ResponseColumn, Value,
};
pub use plan::{Filter, Key, Step, Table, WritePlan};
