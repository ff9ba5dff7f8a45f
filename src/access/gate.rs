//! Role gate: compares the caller's global role with the operation's minimum.

use super::{Caller, Role};
use crate::error::{Error, Result};

/// Allow iff the caller's role is at least `required`.
///
/// # Errors
/// `Unauthenticated` when an anonymous caller hits an operation above guest
/// level, `InsufficientRole` when an authenticated caller ranks too low.
pub fn require_role(caller: &Caller, required: Role) -> Result<()> {
    let actual = caller.role();
    if actual >= required {
        return Ok(());
    }
    match caller {
        Caller::Anonymous => Err(Error::Unauthenticated),
        Caller::Account { .. } => Err(Error::InsufficientRole { required, actual }),
    }
}

/// Same as [`require_role`] but also requires an identity and returns its account id.
///
/// # Errors
/// See [`require_role`].
pub fn require_account(caller: &Caller, required: Role) -> Result<i64> {
    require_role(caller, required.max(Role::Member))?;
    caller.account_id().ok_or(Error::Unauthenticated)
}
