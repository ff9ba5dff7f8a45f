//! Relation resolver: answers whether a membership or manager assignment row exists.
//!
//! No role logic and no caching; every call reads the datastore. Accepts any
//! executor so the mutator can consult it from inside its transaction.

use sqlx::{Executor, Sqlite};
use tracing::{info_span, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Membership,
    ManagerAssignment,
}

impl Relation {
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Membership => "memberships",
            Self::ManagerAssignment => "manager_assignments",
        }
    }

    #[must_use]
    pub(crate) const fn timestamp_column(self) -> &'static str {
        match self {
            Self::Membership => "joined_at",
            Self::ManagerAssignment => "assigned_at",
        }
    }

    #[must_use]
    pub const fn conflict_message(self) -> &'static str {
        match self {
            Self::Membership => "Already a member of this organization.",
            Self::ManagerAssignment => "Account already manages this organization.",
        }
    }
}

/// Whether `account_id` holds `relation` on `organization_id`.
///
/// # Errors
/// Returns the datastore error if the lookup fails.
pub async fn has_relation<'e, E>(
    executor: E,
    account_id: i64,
    organization_id: i64,
    relation: Relation,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let query = match relation {
        Relation::Membership => {
            "SELECT 1 FROM memberships WHERE account_id = ? AND organization_id = ? LIMIT 1"
        }
        Relation::ManagerAssignment => {
            "SELECT 1 FROM manager_assignments WHERE account_id = ? AND organization_id = ? LIMIT 1"
        }
    };
    let span = info_span!(
        "db.query",
        db.system = "sqlite",
        db.operation = "SELECT",
        db.statement = query
    );
    let row: Option<i64> = sqlx::query_scalar(query)
        .bind(account_id)
        .bind(organization_id)
        .fetch_optional(executor)
        .instrument(span)
        .await?;
    Ok(row.is_some())
}

/// # Errors
/// Returns the datastore error if the lookup fails.
pub async fn organization_exists<'e, E>(executor: E, organization_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<i64> = sqlx::query_scalar("SELECT 1 FROM organizations WHERE id = ?")
        .bind(organization_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.is_some())
}
