//! Allow/deny decisions for a required level and optional permission.
//!
//! Denials are data: every path through [`can_access`] returns a
//! [`Decision`], none of them panic or touch I/O.

use std::fmt;

use serde::Serialize;

use super::level::{AuthLevel, resolve};
use super::permissions::PermissionLookup;
use super::session::Session;

/// Why a decision went the way it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    /// Allowed.
    None,
    /// No user at all and the required level is above public.
    NotAuthenticated,
    /// Signed in, but the account's level is too low.
    InsufficientLevel,
    /// Level is sufficient, the named permission is not held.
    MissingPermission,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "NONE",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::InsufficientLevel => "INSUFFICIENT_LEVEL",
            Self::MissingPermission => "MISSING_PERMISSION",
        })
    }
}

/// Gate verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DenyReason,
    /// Level the session resolved to when the decision was made.
    pub current_level: AuthLevel,
}

impl Decision {
    fn allow(current_level: AuthLevel) -> Self {
        Self { allowed: true, reason: DenyReason::None, current_level }
    }

    fn deny(reason: DenyReason, current_level: AuthLevel) -> Self {
        Self { allowed: false, reason, current_level }
    }
}

/// Decide whether `session` may proceed.
///
/// The level check runs first; the permission check only runs once the level
/// is satisfied, and both must pass.
pub fn can_access<P>(
    session: &Session,
    required_level: AuthLevel,
    required_permission: Option<&str>,
    permissions: &P,
) -> Decision
where
    P: PermissionLookup + ?Sized,
{
    let current = resolve(session);

    if current < required_level {
        let reason = if session.user.is_none() {
            DenyReason::NotAuthenticated
        } else {
            DenyReason::InsufficientLevel
        };
        return Decision::deny(reason, current);
    }

    if let Some(permission) = required_permission {
        if !permissions.permits(permission, session, current) {
            return Decision::deny(DenyReason::MissingPermission, current);
        }
    }

    Decision::allow(current)
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;
