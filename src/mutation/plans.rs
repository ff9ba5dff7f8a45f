//! Named write plans used by the HTTP handlers and the CLI.
//!
//! Deletion plans list dependants before parents: foreign keys are enforced
//! and never cascade, so any other order fails and rolls back.

use super::{
    patch::Assignments,
    plan::{Filter, Key, Step, Table, WritePlan},
};
use crate::{
    access::{Relation, Role},
    storage::announcements::{AnnouncementKind, NewAnnouncement},
};

#[must_use]
pub fn delete_organization(organization_id: i64) -> WritePlan {
    let events = Filter::AnnouncementsOf {
        organization_id,
        kind: AnnouncementKind::Event,
    };
    let updates = Filter::AnnouncementsOf {
        organization_id,
        kind: AnnouncementKind::Update,
    };
    let organization = Filter::Organization(organization_id);

    WritePlan::new("delete_organization")
        .step(Step::delete(Table::Responses, events))
        .step(Step::delete(Table::Announcements, events))
        .step(Step::delete(Table::Responses, updates))
        .step(Step::delete(Table::Announcements, updates))
        .step(Step::delete(Table::Memberships, organization))
        .step(Step::delete(Table::ManagerAssignments, organization))
        .step(
            Step::delete(Table::Organizations, Filter::Id(organization_id))
                .required("Organization not found."),
        )
}

#[must_use]
pub fn delete_account(account_id: i64) -> WritePlan {
    let owned = Filter::Account(account_id);

    WritePlan::new("delete_account")
        .step(Step::delete(Table::Sessions, owned))
        .step(Step::delete(Table::Responses, owned))
        .step(Step::delete(Table::Memberships, owned))
        .step(Step::delete(Table::ManagerAssignments, owned))
        .step(Step::delete(Table::Accounts, Filter::Id(account_id)).required("Account not found."))
}

#[must_use]
pub fn delete_announcement(organization_id: i64, announcement_id: i64) -> WritePlan {
    let scoped = Filter::Announcement {
        announcement_id,
        organization_id,
    };

    WritePlan::new("delete_announcement")
        .step(Step::delete(Table::Responses, scoped))
        .step(Step::delete(Table::Announcements, scoped).required("Announcement not found."))
}

/// Insert the membership, then one response row per existing announcement.
#[must_use]
pub fn join_organization(account_id: i64, organization_id: i64) -> WritePlan {
    WritePlan::new("join_organization")
        .step(Step::InsertRelation {
            relation: Relation::Membership,
            account_id,
            organization_id,
        })
        .step(Step::BackfillResponses {
            account_id,
            organization_id,
        })
}

#[must_use]
pub fn leave_organization(account_id: i64, organization_id: i64) -> WritePlan {
    let scoped = Filter::AccountInOrganization {
        account_id,
        organization_id,
    };

    WritePlan::new("leave_organization")
        .step(Step::delete(Table::Responses, scoped))
        .step(Step::delete(Table::Memberships, scoped).required("Membership not found."))
}

/// Insert the announcement, then one response row per current member.
#[must_use]
pub fn create_announcement(announcement: NewAnnouncement) -> WritePlan {
    let organization_id = announcement.organization_id;

    WritePlan::new("create_announcement")
        .step(Step::InsertAnnouncement(announcement))
        .step(Step::FanOutResponses {
            announcement: Key::Inserted,
            organization_id,
        })
}

#[must_use]
pub fn assign_manager(account_id: i64, organization_id: i64) -> WritePlan {
    WritePlan::new("assign_manager").step(Step::InsertRelation {
        relation: Relation::ManagerAssignment,
        account_id,
        organization_id,
    })
}

#[must_use]
pub fn unassign_manager(account_id: i64, organization_id: i64) -> WritePlan {
    WritePlan::new("unassign_manager").step(
        Step::delete(
            Table::ManagerAssignments,
            Filter::AccountInOrganization {
                account_id,
                organization_id,
            },
        )
        .required("Manager assignment not found."),
    )
}

#[must_use]
pub fn update_account(account_id: i64, assignments: Assignments) -> WritePlan {
    WritePlan::new("update_account").step(
        Step::update(Table::Accounts, Filter::Id(account_id), assignments)
            .required("Account not found."),
    )
}

/// Update the account. When `role` drops below manager, the manager
/// assignments it held are removed in the same transaction.
#[must_use]
pub fn update_account_role(
    account_id: i64,
    assignments: Assignments,
    role: Option<Role>,
) -> WritePlan {
    let plan = update_account(account_id, assignments);
    match role {
        Some(role) if role < Role::Manager => plan.step(Step::delete(
            Table::ManagerAssignments,
            Filter::Account(account_id),
        )),
        _ => plan,
    }
}

#[must_use]
pub fn update_organization(organization_id: i64, assignments: Assignments) -> WritePlan {
    WritePlan::new("update_organization").step(
        Step::update(Table::Organizations, Filter::Id(organization_id), assignments)
            .required("Organization not found."),
    )
}

#[must_use]
pub fn update_announcement(
    organization_id: i64,
    announcement_id: i64,
    assignments: Assignments,
) -> WritePlan {
    WritePlan::new("update_announcement").step(
        Step::update(
            Table::Announcements,
            Filter::Announcement {
                announcement_id,
                organization_id,
            },
            assignments,
        )
        .required("Announcement not found."),
    )
}

#[must_use]
pub fn set_attendance(account_id: i64, announcement_id: i64, assignments: Assignments) -> WritePlan {
    WritePlan::new("set_attendance").step(
        Step::update(
            Table::Responses,
            Filter::Response {
                account_id,
                announcement_id,
            },
            assignments,
        )
        .required("Announcement not found."),
    )
}

#[must_use]
pub fn set_email_preference(
    account_id: i64,
    organization_id: i64,
    assignments: Assignments,
) -> WritePlan {
    WritePlan::new("set_email_preference").step(
        Step::update(
            Table::Memberships,
            Filter::AccountInOrganization {
                account_id,
                organization_id,
            },
            assignments,
        )
        .required("Membership not found."),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::patch::{AccountColumn, MembershipColumn, Patch};

    #[test]
    fn organization_deletion_order() {
        let plan = delete_organization(7);
        let tables: Vec<Table> = plan.steps().iter().map(Step::table).collect();
        assert_eq!(
            tables,
            vec![
                Table::Responses,
                Table::Announcements,
                Table::Responses,
                Table::Announcements,
                Table::Memberships,
                Table::ManagerAssignments,
                Table::Organizations,
            ]
        );
        assert!(plan.validate().is_ok());
        assert!(matches!(
            plan.steps().last(),
            Some(Step::Delete {
                required: Some(_),
                ..
            })
        ));
    }

    #[test]
    fn account_deletion_ends_with_the_account() {
        let plan = delete_account(3);
        assert_eq!(plan.len(), 5);
        assert_eq!(plan.steps().first().map(Step::table), Some(Table::Sessions));
        assert_eq!(plan.steps().last().map(Step::table), Some(Table::Accounts));
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn demotion_drops_manager_assignments() -> crate::Result<()> {
        let role = |role: Role| Patch::new().set(AccountColumn::Role, role.level()).build();

        let demoted = update_account_role(4, role(Role::Member)?, Some(Role::Member));
        assert_eq!(
            demoted.steps().iter().map(Step::table).collect::<Vec<_>>(),
            vec![Table::Accounts, Table::ManagerAssignments]
        );
        assert!(demoted.validate().is_ok());

        let promoted = update_account_role(4, role(Role::Admin)?, Some(Role::Admin));
        assert_eq!(promoted.len(), 1);
        let untouched = update_account_role(4, role(Role::Manager)?, None);
        assert_eq!(untouched.len(), 1);
        Ok(())
    }

    #[test]
    fn every_named_plan_validates() -> crate::Result<()> {
        let preference = Patch::new()
            .set(MembershipColumn::ReceiveEmails, false)
            .build()?;
        let plans = [
            delete_announcement(1, 2),
            join_organization(1, 2),
            leave_organization(1, 2),
            create_announcement(NewAnnouncement {
                organization_id: 2,
                kind: AnnouncementKind::Event,
                title: "Regatta".to_string(),
                description: "Spring race".to_string(),
                date: None,
                location: None,
                members_only: false,
            }),
            assign_manager(1, 2),
            unassign_manager(1, 2),
            set_email_preference(1, 2, preference),
        ];
        for plan in &plans {
            assert!(plan.validate().is_ok(), "{} should validate", plan.name());
        }
        Ok(())
    }
}
