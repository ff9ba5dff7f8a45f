//! Organization, membership and announcement endpoints.
//!
//! Organizations are the scope boundary. Reads are public except for
//! members-only announcements. Writes go through the role gate and then the
//! relation resolver; a caller who fails the relation check gets `404` so the
//! existence of other organizations' resources is not revealed. Every write
//! is a named plan executed by the mutator.
//!
//! Flow Overview:
//! 1) Resolve the caller from the session.
//! 2) Gate on the global role.
//! 3) Check membership or manager assignment (admins bypass the latter).
//! 4) Execute the plan, then read back the result.

pub(crate) mod announcements;
pub(crate) mod membership;
pub(crate) mod organizations;
pub(crate) mod types;

/// Organizations expose at most three social links.
const MAX_SOCIAL_LINKS: usize = 3;

#[cfg(test)]
mod tests;
