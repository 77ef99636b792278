//! Authorization-level gating for the storefront.
//!
//! SYSTEM CONTEXT
//! ==============
//! `session` holds identity, `level` maps it to a trust tier, `gate` decides
//! allow/deny, `guard` applies the decision to a view. `service` is the one
//! component allowed to write the session.

pub mod gate;
pub mod guard;
pub mod level;
pub mod permissions;
pub mod service;
pub mod session;

pub use gate::{Decision, DenyReason, can_access};
pub use guard::{CallToAction, Denial, Guard, GuardOutcome, GuardedView};
pub use level::{AuthLevel, resolve};
pub use permissions::{PermissionLookup, PermissionRule, PermissionTable};
pub use service::{AuthError, AuthService};
pub use session::{MutationTicket, Session, SessionStore, Subscription, Tokens, User, UserPatch};
