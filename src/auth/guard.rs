//! Route/view guard: turns a gate decision into pending, redirect, visible
//! denial, or allowed.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every protected storefront view is wrapped in a [`Guard`]. Anonymous
//! visitors are sent to the login entry point with their requested location
//! preserved; signed-in users who lack a level or permission stay on the page
//! and are told what to do next.
//!
//! DESIGN
//! ======
//! A guard keeps no decision between evaluations. [`GuardedView`] subscribes
//! to the session store and re-evaluates on each change, and its
//! [`GuardedView::outcome`] always derives from the current snapshot, so an
//! answer computed while loading can never be applied late. Dropping the view
//! unsubscribes it.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::gate::{DenyReason, can_access};
use super::level::AuthLevel;
use super::permissions::PermissionLookup;
use super::session::{Session, SessionStore, Subscription};

pub const DEFAULT_LOGIN_PATH: &str = "/login";

// =============================================================================
// OUTCOME
// =============================================================================

/// Next step offered to a denied user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallToAction {
    VerifyEmail,
    VerifyMitid,
    RequestAccess,
}

impl CallToAction {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::VerifyEmail => "Verify your email",
            Self::VerifyMitid => "Verify with MitID",
            Self::RequestAccess => "Contact support to request access",
        }
    }

    #[must_use]
    pub fn href(self) -> &'static str {
        match self {
            Self::VerifyEmail => "/verify-email",
            Self::VerifyMitid => "/verify-mitid",
            Self::RequestAccess => "/support",
        }
    }
}

/// Visible explanation for a signed-in user who may not see the view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub reason: DenyReason,
    pub required_level: AuthLevel,
    pub current_level: AuthLevel,
    pub permission: Option<String>,
    pub message: String,
    pub action: CallToAction,
}

/// Result of one guard evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GuardOutcome {
    /// Session still loading; nothing decided yet.
    Pending,
    /// Send the visitor to `location` (the login entry point).
    Redirect { location: String },
    /// Render the fallback in place.
    Denied(Denial),
    /// Render the protected content.
    Allowed,
}

impl GuardOutcome {
    #[must_use]
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

impl fmt::Display for GuardOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Loading session..."),
            Self::Redirect { location } => write!(f, "Please log in to continue: {location}"),
            Self::Denied(denial) => write!(
                f,
                "{}\n{} ({})",
                denial.message,
                denial.action.label(),
                denial.action.href()
            ),
            Self::Allowed => f.write_str("Access granted."),
        }
    }
}

// =============================================================================
// GUARD
// =============================================================================

/// Access requirements for one view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Guard {
    required_level: AuthLevel,
    permission: Option<String>,
    fallback: Option<String>,
    login_path: String,
}

impl Guard {
    #[must_use]
    pub fn new(required_level: AuthLevel) -> Self {
        Self { required_level, permission: None, fallback: None, login_path: DEFAULT_LOGIN_PATH.to_owned() }
    }

    #[must_use]
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    /// Message shown instead of the default one when a signed-in user is denied.
    #[must_use]
    pub fn fallback(mut self, message: impl Into<String>) -> Self {
        self.fallback = Some(message.into());
        self
    }

    #[must_use]
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    #[must_use]
    pub fn required_level(&self) -> AuthLevel {
        self.required_level
    }

    #[must_use]
    pub fn required_permission(&self) -> Option<&str> {
        self.permission.as_deref()
    }

    /// Evaluate the guard for a visitor who asked for `location`.
    pub fn evaluate<P>(&self, session: &Session, location: &str, permissions: &P) -> GuardOutcome
    where
        P: PermissionLookup + ?Sized,
    {
        if session.is_loading {
            return GuardOutcome::Pending;
        }

        let decision = can_access(session, self.required_level, self.permission.as_deref(), permissions);
        match decision.reason {
            DenyReason::None => GuardOutcome::Allowed,
            DenyReason::NotAuthenticated => GuardOutcome::Redirect { location: login_redirect(&self.login_path, location) },
            reason @ (DenyReason::InsufficientLevel | DenyReason::MissingPermission) => {
                GuardOutcome::Denied(self.denial(reason, decision.current_level))
            }
        }
    }

    fn denial(&self, reason: DenyReason, current_level: AuthLevel) -> Denial {
        let action = match reason {
            DenyReason::MissingPermission => CallToAction::RequestAccess,
            _ if self.required_level == AuthLevel::MitidVerified => CallToAction::VerifyMitid,
            _ => CallToAction::VerifyEmail,
        };
        let message = self.fallback.clone().unwrap_or_else(|| match (reason, &self.permission) {
            (DenyReason::MissingPermission, Some(permission)) => {
                format!("Insufficient access: your account does not have the '{permission}' permission.")
            }
            _ => format!(
                "Insufficient access: this page requires {} ({}).",
                self.required_level.label(),
                self.required_level
            ),
        });
        Denial {
            reason,
            required_level: self.required_level,
            current_level,
            permission: self.permission.clone(),
            message,
            action,
        }
    }
}

/// Login URL that brings the visitor back to `location` afterwards.
#[must_use]
pub fn login_redirect(login_path: &str, location: &str) -> String {
    let separator = if login_path.contains('?') { '&' } else { '?' };
    format!("{login_path}{separator}next={}", urlencoding::encode(location))
}

// =============================================================================
// GUARDED VIEW
// =============================================================================

type SharedPermissions = Arc<dyn PermissionLookup + Send + Sync>;

/// A guard mounted on a location and kept in sync with the session store.
pub struct GuardedView {
    store: SessionStore,
    guard: Arc<Guard>,
    location: Arc<str>,
    permissions: SharedPermissions,
    _subscription: Subscription,
}

impl GuardedView {
    /// Render once from the current session, then again after every session
    /// change until the view is dropped.
    pub fn mount<R>(
        store: &SessionStore,
        guard: Guard,
        location: &str,
        permissions: SharedPermissions,
        render: R,
    ) -> Self
    where
        R: Fn(&GuardOutcome) + Send + Sync + 'static,
    {
        let guard = Arc::new(guard);
        let location: Arc<str> = Arc::from(location);
        render(&guard.evaluate(&store.snapshot(), &location, permissions.as_ref()));

        let subscription = {
            let guard = Arc::clone(&guard);
            let location = Arc::clone(&location);
            let permissions = Arc::clone(&permissions);
            store.subscribe(move |session| {
                render(&guard.evaluate(session, &location, permissions.as_ref()));
            })
        };

        Self { store: store.clone(), guard, location, permissions, _subscription: subscription }
    }

    /// Outcome for the session as it is right now.
    #[must_use]
    pub fn outcome(&self) -> GuardOutcome {
        self.guard.evaluate(&self.store.snapshot(), &self.location, self.permissions.as_ref())
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
