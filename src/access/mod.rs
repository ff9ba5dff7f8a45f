//! Role gate, relation resolver and the caller identity they operate on.
//!
//! Flow Overview:
//! 1) The HTTP edge builds a [`Caller`] from the session, re-reading the role
//!    from `accounts` on every request.
//! 2) [`gate::require_role`] checks the global role.
//! 3) Organization-scoped operations consult [`resolver::has_relation`]; the
//!    admin bypass lives here, not in the resolver.

pub mod gate;
pub mod resolver;

pub use gate::{require_account, require_role};
pub use resolver::{has_relation, organization_exists, Relation};

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// Global role, ordered by privilege.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Member,
    Manager,
    Admin,
}

impl Role {
    pub const ALL: [Self; 4] = [Self::Guest, Self::Member, Self::Manager, Self::Admin];

    /// Level stored in `accounts.role`. Guests are never stored.
    #[must_use]
    pub const fn level(self) -> i64 {
        match self {
            Self::Guest => 0,
            Self::Member => 1,
            Self::Manager => 2,
            Self::Admin => 3,
        }
    }

    #[must_use]
    pub const fn from_level(level: i64) -> Option<Self> {
        match level {
            0 => Some(Self::Guest),
            1 => Some(Self::Member),
            2 => Some(Self::Manager),
            3 => Some(Self::Admin),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Member => "member",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "guest" => Ok(Self::Guest),
            "member" => Ok(Self::Member),
            "manager" => Ok(Self::Manager),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Identity of whoever issued the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    Account { account_id: i64, role: Role },
}

impl Caller {
    #[must_use]
    pub const fn role(&self) -> Role {
        match self {
            Self::Anonymous => Role::Guest,
            Self::Account { role, .. } => *role,
        }
    }

    #[must_use]
    pub const fn account_id(&self) -> Option<i64> {
        match self {
            Self::Anonymous => None,
            Self::Account { account_id, .. } => Some(*account_id),
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }
}

/// Require the caller to manage `organization_id` and return their account id.
///
/// Admins pass for any existing organization. Everyone else needs the
/// manager role plus a manager assignment; a missing assignment reads as
/// `NotFound` so the organization's existence is not revealed.
pub async fn require_org_manager(
    pool: &SqlitePool,
    caller: &Caller,
    organization_id: i64,
) -> Result<i64> {
    let account_id = require_account(caller, Role::Manager)?;

    let allowed = if caller.is_admin() {
        organization_exists(pool, organization_id).await?
    } else {
        has_relation(pool, account_id, organization_id, Relation::ManagerAssignment).await?
    };

    if allowed {
        Ok(account_id)
    } else {
        Err(Error::NotFound("Organization not found."))
    }
}

/// Require the caller to be a member of `organization_id` and return their account id.
pub async fn require_org_member(
    pool: &SqlitePool,
    caller: &Caller,
    organization_id: i64,
) -> Result<i64> {
    let account_id = require_account(caller, Role::Member)?;
    if has_relation(pool, account_id, organization_id, Relation::Membership).await? {
        Ok(account_id)
    } else {
        Err(Error::NotFound("Membership not found."))
    }
}

/// Whether the caller may see members-only announcements of `organization_id`.
pub async fn can_view_members_only(
    pool: &SqlitePool,
    caller: &Caller,
    organization_id: i64,
) -> Result<bool> {
    let Some(account_id) = caller.account_id() else {
        return Ok(false);
    };
    if caller.is_admin() {
        return Ok(true);
    }
    if has_relation(pool, account_id, organization_id, Relation::Membership).await? {
        return Ok(true);
    }
    Ok(has_relation(pool, account_id, organization_id, Relation::ManagerAssignment).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_totally_ordered() {
        assert!(Role::Guest < Role::Member);
        assert!(Role::Member < Role::Manager);
        assert!(Role::Manager < Role::Admin);
    }

    #[test]
    fn level_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::from_level(role.level()), Some(role));
        }
        assert_eq!(Role::from_level(7), None);
    }

    #[test]
    fn parse_role_names() {
        assert_eq!("Admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" manager ".parse::<Role>(), Ok(Role::Manager));
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn anonymous_caller_is_guest() {
        assert_eq!(Caller::Anonymous.role(), Role::Guest);
        assert_eq!(Caller::Anonymous.account_id(), None);
        let caller = Caller::Account {
            account_id: 4,
            role: Role::Admin,
        };
        assert!(caller.is_admin());
        assert_eq!(caller.account_id(), Some(4));
    }
}
