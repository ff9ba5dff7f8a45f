//! Write plan model: tables, row filters and ordered steps.
//!
//! Filters render to fixed SQL fragments; only ids and announcement kinds are
//! ever bound as parameters. [`WritePlan::validate`] rejects table/filter
//! pairs that have no rendering before any transaction is opened.

use std::fmt;

use super::patch::Assignments;
use crate::{
    access::Relation,
    error::{Error, Result},
    storage::announcements::{AnnouncementKind, NewAnnouncement},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Accounts,
    Sessions,
    Organizations,
    Announcements,
    Memberships,
    ManagerAssignments,
    Responses,
}

impl Table {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Sessions => "sessions",
            Self::Organizations => "organizations",
            Self::Announcements => "announcements",
            Self::Memberships => "memberships",
            Self::ManagerAssignments => "manager_assignments",
            Self::Responses => "announcement_responses",
        }
    }

    /// Message reported when an update on this table hits a unique constraint.
    #[must_use]
    pub const fn conflict_message(self) -> &'static str {
        match self {
            Self::Accounts => "An account with this username or email already exists.",
            Self::Memberships => "Already a member of this organization.",
            Self::ManagerAssignments => "Account already manages this organization.",
            _ => "The change conflicts with an existing record.",
        }
    }
}

impl From<Relation> for Table {
    fn from(relation: Relation) -> Self {
        match relation {
            Relation::Membership => Self::Memberships,
            Relation::ManagerAssignment => Self::ManagerAssignments,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which rows of a table a step touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Primary key of the target table.
    Id(i64),
    /// Rows owned by an account.
    Account(i64),
    /// Rows belonging to an organization (responses: via their announcement).
    Organization(i64),
    AccountInOrganization {
        account_id: i64,
        organization_id: i64,
    },
    /// One announcement, only if it belongs to the organization.
    Announcement {
        announcement_id: i64,
        organization_id: i64,
    },
    /// One account's response to one announcement.
    Response {
        account_id: i64,
        announcement_id: i64,
    },
    /// All announcements of one kind in an organization.
    AnnouncementsOf {
        organization_id: i64,
        kind: AnnouncementKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arg {
    Int(i64),
    Text(&'static str),
}

/// Rendered `WHERE` body with `?` placeholders and their arguments in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Clause {
    pub sql: &'static str,
    pub args: Vec<Arg>,
}

impl Filter {
    /// Render the filter for `table`, or `None` when the pair makes no sense.
    pub(crate) fn clause(self, table: Table) -> Option<Clause> {
        use Table::{Announcements, ManagerAssignments, Memberships, Responses, Sessions};

        let (sql, args) = match (table, self) {
            (_, Self::Id(id)) => ("id = ?", vec![Arg::Int(id)]),
            (Sessions | Memberships | ManagerAssignments | Responses, Self::Account(id)) => {
                ("account_id = ?", vec![Arg::Int(id)])
            }
            (Announcements | Memberships | ManagerAssignments, Self::Organization(id)) => {
                ("organization_id = ?", vec![Arg::Int(id)])
            }
            (Responses, Self::Organization(id)) => (
                "announcement_id IN (SELECT id FROM announcements WHERE organization_id = ?)",
                vec![Arg::Int(id)],
            ),
            (
                Memberships | ManagerAssignments,
                Self::AccountInOrganization {
                    account_id,
                    organization_id,
                },
            ) => (
                "account_id = ? AND organization_id = ?",
                vec![Arg::Int(account_id), Arg::Int(organization_id)],
            ),
            (
                Responses,
                Self::AccountInOrganization {
                    account_id,
                    organization_id,
                },
            ) => (
                "account_id = ? AND announcement_id IN \
                 (SELECT id FROM announcements WHERE organization_id = ?)",
                vec![Arg::Int(account_id), Arg::Int(organization_id)],
            ),
            (
                Announcements,
                Self::Announcement {
                    announcement_id,
                    organization_id,
                },
            ) => (
                "id = ? AND organization_id = ?",
                vec![Arg::Int(announcement_id), Arg::Int(organization_id)],
            ),
            (
                Responses,
                Self::Announcement {
                    announcement_id,
                    organization_id,
                },
            ) => (
                "announcement_id IN \
                 (SELECT id FROM announcements WHERE id = ? AND organization_id = ?)",
                vec![Arg::Int(announcement_id), Arg::Int(organization_id)],
            ),
            (
                Responses,
                Self::Response {
                    account_id,
                    announcement_id,
                },
            ) => (
                "account_id = ? AND announcement_id = ?",
                vec![Arg::Int(account_id), Arg::Int(announcement_id)],
            ),
            (
                Announcements,
                Self::AnnouncementsOf {
                    organization_id,
                    kind,
                },
            ) => (
                "organization_id = ? AND kind = ?",
                vec![Arg::Int(organization_id), Arg::Text(kind.as_str())],
            ),
            (
                Responses,
                Self::AnnouncementsOf {
                    organization_id,
                    kind,
                },
            ) => (
                "announcement_id IN \
                 (SELECT id FROM announcements WHERE organization_id = ? AND kind = ?)",
                vec![Arg::Int(organization_id), Arg::Text(kind.as_str())],
            ),
            _ => return None,
        };

        Some(Clause { sql, args })
    }
}

/// Announcement targeted by a fan-out step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Id(i64),
    /// The row inserted by an earlier step of the same plan.
    Inserted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Delete {
        table: Table,
        filter: Filter,
        /// Message reported as `NotFound` when nothing matched.
        required: Option<&'static str>,
    },
    Update {
        table: Table,
        filter: Filter,
        assignments: Assignments,
        required: Option<&'static str>,
    },
    InsertRelation {
        relation: Relation,
        account_id: i64,
        organization_id: i64,
    },
    InsertAnnouncement(NewAnnouncement),
    /// One response row per current member of the organization.
    FanOutResponses {
        announcement: Key,
        organization_id: i64,
    },
    /// One response row per existing announcement of the organization.
    BackfillResponses {
        account_id: i64,
        organization_id: i64,
    },
}

impl Step {
    #[must_use]
    pub const fn delete(table: Table, filter: Filter) -> Self {
        Self::Delete {
            table,
            filter,
            required: None,
        }
    }

    #[must_use]
    pub const fn update(table: Table, filter: Filter, assignments: Assignments) -> Self {
        Self::Update {
            table,
            filter,
            assignments,
            required: None,
        }
    }

    /// Fail the plan with `NotFound(message)` if this step affects no rows.
    #[must_use]
    pub fn required(mut self, message: &'static str) -> Self {
        match &mut self {
            Self::Delete { required, .. } | Self::Update { required, .. } => {
                *required = Some(message);
            }
            _ => {}
        }
        self
    }

    #[must_use]
    pub fn table(&self) -> Table {
        match self {
            Self::Delete { table, .. } | Self::Update { table, .. } => *table,
            Self::InsertRelation { relation, .. } => Table::from(*relation),
            Self::InsertAnnouncement(_) => Table::Announcements,
            Self::FanOutResponses { .. } | Self::BackfillResponses { .. } => Table::Responses,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete { table, filter, .. } => write!(f, "delete {table} where {filter:?}"),
            Self::Update { table, filter, .. } => write!(f, "update {table} where {filter:?}"),
            Self::InsertRelation { relation, .. } => write!(f, "insert into {}", relation.table()),
            Self::InsertAnnouncement(_) => f.write_str("insert into announcements"),
            Self::FanOutResponses { .. } => f.write_str("fan out announcement responses"),
            Self::BackfillResponses { .. } => f.write_str("backfill announcement responses"),
        }
    }
}

/// Named, ordered list of steps executed all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritePlan {
    name: &'static str,
    steps: Vec<Step>,
}

impl WritePlan {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check every step against the schema.
    ///
    /// # Errors
    /// `ValidationFailed` naming the first offending step.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::validation(format!("plan {} has no steps", self.name)));
        }

        let mut inserted_announcement = false;
        for (index, step) in self.steps.iter().enumerate() {
            let valid = match step {
                Step::Delete { table, filter, .. } => filter.clause(*table).is_some(),
                Step::Update {
                    table,
                    filter,
                    assignments,
                    ..
                } => assignments.table() == *table && filter.clause(*table).is_some(),
                Step::InsertAnnouncement(_) => {
                    inserted_announcement = true;
                    true
                }
                Step::FanOutResponses {
                    announcement: Key::Inserted,
                    ..
                } => inserted_announcement,
                Step::InsertRelation { .. }
                | Step::FanOutResponses { .. }
                | Step::BackfillResponses { .. } => true,
            };

            if !valid {
                return Err(Error::validation(format!(
                    "plan {} step {index} is not valid: {step}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
