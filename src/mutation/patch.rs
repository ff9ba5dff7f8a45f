//! Typed partial updates.
//!
//! A [`Patch`] collects column assignments over a closed column enum, so only
//! columns that exist on the target table can be named. [`Patch::build`]
//! validates the set and produces [`Assignments`] for an update step.

use std::fmt;

use super::plan::Table;
use crate::error::{Error, Result};

/// Ceiling for image blobs stored on accounts and organizations.
pub const MAX_ASSET_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
    Integer(i64),
    Null,
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A column that may be assigned by a partial update.
pub trait Column: Copy + Eq + fmt::Debug {
    const TABLE: Table;

    fn name(self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountColumn {
    Username,
    DisplayName,
    Email,
    PhoneNumber,
    PasswordHash,
    Role,
    Image,
}

impl Column for AccountColumn {
    const TABLE: Table = Table::Accounts;

    fn name(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::DisplayName => "display_name",
            Self::Email => "email",
            Self::PhoneNumber => "phone_number",
            Self::PasswordHash => "password_hash",
            Self::Role => "role",
            Self::Image => "image",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganizationColumn {
    Name,
    Email,
    Summary,
    Description,
    Details,
    SocialLink1,
    SocialLink2,
    SocialLink3,
    Image,
}

impl OrganizationColumn {
    pub const SOCIAL_LINKS: [Self; 3] = [Self::SocialLink1, Self::SocialLink2, Self::SocialLink3];
}

impl Column for OrganizationColumn {
    const TABLE: Table = Table::Organizations;

    fn name(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Summary => "summary",
            Self::Description => "description",
            Self::Details => "details",
            Self::SocialLink1 => "social_link_1",
            Self::SocialLink2 => "social_link_2",
            Self::SocialLink3 => "social_link_3",
            Self::Image => "image",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementColumn {
    Title,
    Description,
    Date,
    Location,
    MembersOnly,
}

impl Column for AnnouncementColumn {
    const TABLE: Table = Table::Announcements;

    fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Date => "date",
            Self::Location => "location",
            Self::MembersOnly => "members_only",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseColumn {
    Attending,
}

impl Column for ResponseColumn {
    const TABLE: Table = Table::Responses;

    fn name(self) -> &'static str {
        match self {
            Self::Attending => "attending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipColumn {
    ReceiveEmails,
}

impl Column for MembershipColumn {
    const TABLE: Table = Table::Memberships;

    fn name(self) -> &'static str {
        match self {
            Self::ReceiveEmails => "receive_emails",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch<C: Column> {
    assignments: Vec<(C, Value)>,
}

impl<C: Column> Default for Patch<C> {
    fn default() -> Self {
        Self {
            assignments: Vec::new(),
        }
    }
}

impl<C: Column> Patch<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `column`; a later assignment to the same column wins.
    #[must_use]
    pub fn set(mut self, column: C, value: impl Into<Value>) -> Self {
        let value = value.into();
        if let Some(slot) = self.assignments.iter_mut().find(|(c, _)| *c == column) {
            slot.1 = value;
        } else {
            self.assignments.push((column, value));
        }
        self
    }

    /// Assign `column` only when `value` is present.
    #[must_use]
    pub fn set_some<V: Into<Value>>(self, column: C, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(column, value),
            None => self,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// # Errors
    /// `ValidationFailed` for an empty patch or a blob above [`MAX_ASSET_BYTES`].
    pub fn build(self) -> Result<Assignments> {
        if self.assignments.is_empty() {
            return Err(Error::validation("No changes provided."));
        }
        for (column, value) in &self.assignments {
            if let Value::Blob(bytes) = value {
                if bytes.len() > MAX_ASSET_BYTES {
                    return Err(Error::validation(format!(
                        "{} exceeds the 16 MiB limit.",
                        column.name()
                    )));
                }
            }
        }
        Ok(Assignments {
            table: C::TABLE,
            columns: self
                .assignments
                .into_iter()
                .map(|(column, value)| (column.name(), value))
                .collect(),
        })
    }
}

/// Validated, non-empty column assignments for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignments {
    table: Table,
    columns: Vec<(&'static str, Value)>,
}

impl Assignments {
    #[must_use]
    pub const fn table(&self) -> Table {
        self.table
    }

    #[must_use]
    pub fn columns(&self) -> &[(&'static str, Value)] {
        &self.columns
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|(name, _)| *name == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_is_rejected() {
        let result = Patch::<AccountColumn>::new().build();
        assert!(matches!(result, Err(Error::ValidationFailed(_))));
    }

    #[test]
    fn oversized_blob_is_rejected() {
        let result = Patch::new()
            .set(OrganizationColumn::Image, vec![0u8; MAX_ASSET_BYTES + 1])
            .build();
        assert!(matches!(result, Err(Error::ValidationFailed(_))));

        let ok = Patch::new()
            .set(OrganizationColumn::Image, vec![0u8; 16])
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn later_assignment_wins() -> Result<()> {
        let assignments = Patch::new()
            .set(AccountColumn::DisplayName, "First")
            .set(AccountColumn::PhoneNumber, None::<String>)
            .set(AccountColumn::DisplayName, "Second")
            .build()?;
        assert_eq!(assignments.table(), Table::Accounts);
        assert_eq!(
            assignments.columns(),
            &[
                ("display_name", Value::Text("Second".to_string())),
                ("phone_number", Value::Null),
            ]
        );
        Ok(())
    }

    #[test]
    fn set_some_skips_absent_values() {
        let patch = Patch::new()
            .set_some(AnnouncementColumn::Title, None::<String>)
            .set_some(AnnouncementColumn::Location, Some("Hall"));
        assert!(!patch.is_empty());
        assert!(patch.build().is_ok_and(|a| a.contains("location") && !a.contains("title")));
    }
}
