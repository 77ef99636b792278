//! Storefront route table.
//!
//! SYSTEM CONTEXT
//! ==============
//! Each storefront location maps to one view and the access it needs. The
//! table is the single place where routes get their guard, so a page cannot
//! be reachable under two paths with different requirements.

use serde::Serialize;

use crate::auth::guard::Guard;
use crate::auth::level::AuthLevel;
use crate::auth::permissions::{BUY_PRODUCTS, CREATE_PUBLICATIONS, RECEIVE_PAYMENTS, VIEW_SALES, WITHDRAW_FUNDS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    ProductSearch,
    ListingWizard,
    Checkout,
    Dashboard,
    Sales,
    Payments,
    Wallet,
    Profile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Route {
    pub path: &'static str,
    pub view: View,
    pub level: AuthLevel,
    pub permission: Option<&'static str>,
}

impl Route {
    const fn new(path: &'static str, view: View, level: AuthLevel, permission: Option<&'static str>) -> Self {
        Self { path, view, level, permission }
    }

    /// Guard enforcing this route's requirements.
    #[must_use]
    pub fn guard(&self, login_path: &str) -> Guard {
        let guard = Guard::new(self.level).login_path(login_path);
        match self.permission {
            Some(permission) => guard.permission(permission),
            None => guard,
        }
    }
}

pub const ROUTES: &[Route] = &[
    Route::new("/", View::ProductSearch, AuthLevel::Public, None),
    Route::new("/products", View::ProductSearch, AuthLevel::Public, None),
    Route::new("/products/new", View::ListingWizard, AuthLevel::LightAccount, Some(CREATE_PUBLICATIONS)),
    Route::new("/checkout", View::Checkout, AuthLevel::LightAccount, Some(BUY_PRODUCTS)),
    Route::new("/dashboard", View::Dashboard, AuthLevel::LightAccount, None),
    Route::new("/dashboard/sales", View::Sales, AuthLevel::LightAccount, Some(VIEW_SALES)),
    Route::new("/dashboard/payments", View::Payments, AuthLevel::MitidVerified, Some(RECEIVE_PAYMENTS)),
    Route::new("/dashboard/wallet", View::Wallet, AuthLevel::MitidVerified, Some(WITHDRAW_FUNDS)),
    Route::new("/profile", View::Profile, AuthLevel::LightAccount, None),
];

/// Path component of a location, without query or fragment.
#[must_use]
pub fn path_of(location: &str) -> &str {
    let end = location.find(['?', '#']).unwrap_or(location.len());
    &location[..end]
}

/// Query value for `key` in `location`, percent-decoded.
#[must_use]
pub fn query_param(location: &str, key: &str) -> Option<String> {
    let query = location.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or_default();
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k != key {
            return None;
        }
        let v = v.replace('+', " ");
        urlencoding::decode(&v).ok().map(std::borrow::Cow::into_owned)
    })
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Route for `location`: the longest table entry whose segments prefix the
/// location's. The root entry only matches the root itself.
#[must_use]
pub fn match_route(location: &str) -> Option<&'static Route> {
    let wanted = segments(path_of(location));
    ROUTES
        .iter()
        .filter(|route| {
            let own = segments(route.path);
            if own.is_empty() {
                wanted.is_empty()
            } else {
                wanted.starts_with(&own)
            }
        })
        .max_by_key(|route| segments(route.path).len())
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
