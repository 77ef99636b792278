//! Named permissions layered on top of auth levels.
//!
//! A permission is checked in addition to the required level, never instead
//! of it. Lookups go through [`PermissionLookup`] so callers can plug in a
//! backend-supplied table or an ad-hoc predicate.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::level::AuthLevel;
use super::session::Session;

pub const CREATE_PUBLICATIONS: &str = "create_publications";
pub const BUY_PRODUCTS: &str = "buy_products";
pub const VIEW_SALES: &str = "view_sales";
pub const RECEIVE_PAYMENTS: &str = "receive_payments";
pub const WITHDRAW_FUNDS: &str = "withdraw_funds";

/// Read-only permission source consulted by the gate.
pub trait PermissionLookup {
    /// Whether `session`, already resolved to `level`, holds `permission`.
    fn permits(&self, permission: &str, session: &Session, level: AuthLevel) -> bool;
}

impl<F> PermissionLookup for F
where
    F: Fn(&str, &Session, AuthLevel) -> bool,
{
    fn permits(&self, permission: &str, session: &Session, level: AuthLevel) -> bool {
        self(permission, session, level)
    }
}

/// How a single permission is granted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionRule {
    /// Granted to every session at or above this level.
    MinLevel(AuthLevel),
    /// Granted only to the listed user ids.
    AllowList(BTreeSet<String>),
}

/// Permission name → rule. Names without a rule are denied.
///
/// Serialized as a JSON object, e.g.
/// `{"view_sales": {"min_level": "light_account"}, "beta": {"allow_list": ["42"]}}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionTable {
    rules: BTreeMap<String, PermissionRule>,
}

impl PermissionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for the storefront's built-in capabilities.
    #[must_use]
    pub fn storefront_defaults() -> Self {
        Self::new()
            .with_rule(CREATE_PUBLICATIONS, PermissionRule::MinLevel(AuthLevel::LightAccount))
            .with_rule(BUY_PRODUCTS, PermissionRule::MinLevel(AuthLevel::LightAccount))
            .with_rule(VIEW_SALES, PermissionRule::MinLevel(AuthLevel::LightAccount))
            .with_rule(RECEIVE_PAYMENTS, PermissionRule::MinLevel(AuthLevel::MitidVerified))
            .with_rule(WITHDRAW_FUNDS, PermissionRule::MinLevel(AuthLevel::MitidVerified))
    }

    #[must_use]
    pub fn with_rule(mut self, name: impl Into<String>, rule: PermissionRule) -> Self {
        self.rules.insert(name.into(), rule);
        self
    }

    /// Parse a table from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `raw` is not a valid table.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Overlay `other` on top of `self`; rules in `other` win.
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self {
        self.rules.extend(other.rules);
        self
    }

    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&PermissionRule> {
        self.rules.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PermissionRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }
}

impl PermissionLookup for PermissionTable {
    fn permits(&self, permission: &str, session: &Session, level: AuthLevel) -> bool {
        match self.rules.get(permission) {
            None => false,
            Some(PermissionRule::MinLevel(min)) => level >= *min,
            Some(PermissionRule::AllowList(ids)) => session
                .user
                .as_ref()
                .is_some_and(|user| ids.contains(&user.id)),
        }
    }
}

#[cfg(test)]
#[path = "permissions_test.rs"]
mod tests;
