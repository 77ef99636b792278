use super::*;
use crate::auth::guard::GuardOutcome;
use crate::auth::permissions::PermissionTable;
use crate::auth::session::{Session, Tokens, User};

fn light_session() -> Session {
    Session::signed_in(
        User { id: "1".into(), verified: true, ..User::default() },
        Tokens { access_token: "t".into(), refresh_token: None },
    )
}

#[test]
fn root_matches_only_itself() {
    assert_eq!(match_route("/").map(|r| r.view), Some(View::ProductSearch));
    assert!(match_route("/unknown").is_none());
}

#[test]
fn longest_prefix_wins() {
    assert_eq!(match_route("/dashboard").map(|r| r.view), Some(View::Dashboard));
    assert_eq!(match_route("/dashboard/wallet").map(|r| r.view), Some(View::Wallet));
    assert_eq!(match_route("/dashboard/wallet/history").map(|r| r.view), Some(View::Wallet));
    assert_eq!(match_route("/dashboard/other").map(|r| r.view), Some(View::Dashboard));
    assert_eq!(match_route("/products/new").map(|r| r.view), Some(View::ListingWizard));
}

#[test]
fn query_and_fragment_are_ignored_for_matching() {
    assert_eq!(match_route("/checkout?item=4#pay").map(|r| r.view), Some(View::Checkout));
    assert_eq!(match_route("/products/?search=sofa").map(|r| r.view), Some(View::ProductSearch));
}

#[test]
fn segment_prefix_not_string_prefix() {
    assert!(match_route("/profiles").is_none());
}

#[test]
fn path_of_strips_query_and_fragment() {
    assert_eq!(path_of("/products?search=x"), "/products");
    assert_eq!(path_of("/profile#top"), "/profile");
    assert_eq!(path_of("/dashboard"), "/dashboard");
}

#[test]
fn query_param_decodes_value() {
    assert_eq!(query_param("/products?search=road+bike", "search").as_deref(), Some("road bike"));
    assert_eq!(query_param("/products?a=1&search=s%C3%B8fa#x", "search").as_deref(), Some("søfa"));
    assert_eq!(query_param("/products?flag", "flag").as_deref(), Some(""));
    assert!(query_param("/products", "search").is_none());
    assert!(query_param("/products?other=1", "search").is_none());
}

#[test]
fn money_routes_require_mitid() {
    for path in ["/dashboard/payments", "/dashboard/wallet"] {
        let route = match_route(path).unwrap();
        assert_eq!(route.level, AuthLevel::MitidVerified);
        assert!(route.permission.is_some());
    }
}

#[test]
fn every_route_permission_has_a_default_rule() {
    let table = PermissionTable::storefront_defaults();
    for route in ROUTES {
        if let Some(permission) = route.permission {
            assert!(table.rule(permission).is_some(), "no rule for {permission}");
        }
    }
}

#[test]
fn route_guard_carries_requirements() {
    let route = match_route("/dashboard/sales").unwrap();
    let guard = route.guard("/signin");
    assert_eq!(guard.required_level(), AuthLevel::LightAccount);
    assert_eq!(guard.required_permission(), route.permission);

    let outcome = guard.evaluate(&Session::default(), "/dashboard/sales", &PermissionTable::storefront_defaults());
    assert_eq!(outcome, GuardOutcome::Redirect { location: "/signin?next=%2Fdashboard%2Fsales".into() });
}

#[test]
fn light_account_reaches_sales_but_not_wallet() {
    let table = PermissionTable::storefront_defaults();
    let sales = match_route("/dashboard/sales").unwrap().guard("/login");
    let wallet = match_route("/dashboard/wallet").unwrap().guard("/login");
    assert!(sales.evaluate(&light_session(), "/dashboard/sales", &table).is_allowed());
    assert!(matches!(
        wallet.evaluate(&light_session(), "/dashboard/wallet", &table),
        GuardOutcome::Denied(_)
    ));
}

#[test]
fn public_pages_open_to_anonymous_visitors() {
    let table = PermissionTable::storefront_defaults();
    let guard = match_route("/products").unwrap().guard("/login");
    assert!(guard.evaluate(&Session::default(), "/products", &table).is_allowed());
}
