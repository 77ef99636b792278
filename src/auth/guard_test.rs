use std::sync::Mutex;

use super::*;
use crate::auth::permissions::{PermissionTable, RECEIVE_PAYMENTS, VIEW_SALES};
use crate::auth::session::{Tokens, User, UserPatch};

fn signed_in(verified: bool, mitid_verified: bool) -> Session {
    Session::signed_in(
        User { id: "1".into(), email: "a@example.com".into(), verified, mitid_verified, ..User::default() },
        Tokens { access_token: "t".into(), refresh_token: None },
    )
}

fn table() -> PermissionTable {
    PermissionTable::storefront_defaults()
}

// =============================================================================
// evaluate
// =============================================================================

#[test]
fn loading_session_is_pending_not_redirect() {
    let guard = Guard::new(AuthLevel::MitidVerified);
    assert_eq!(guard.evaluate(&Session::loading(), "/dashboard", &table()), GuardOutcome::Pending);
}

#[test]
fn loading_with_stale_user_is_still_pending() {
    let mut session = signed_in(true, false);
    session.is_loading = true;
    let guard = Guard::new(AuthLevel::MitidVerified);
    assert_eq!(guard.evaluate(&session, "/dashboard/wallet", &table()), GuardOutcome::Pending);
}

#[test]
fn anonymous_redirects_with_next_location() {
    let guard = Guard::new(AuthLevel::LightAccount);
    let outcome = guard.evaluate(&Session::default(), "/dashboard/sales?page=2", &table());
    assert_eq!(
        outcome,
        GuardOutcome::Redirect { location: "/login?next=%2Fdashboard%2Fsales%3Fpage%3D2".into() }
    );
}

#[test]
fn custom_login_path_is_used() {
    let guard = Guard::new(AuthLevel::LightAccount).login_path("/auth/login?lang=da");
    let outcome = guard.evaluate(&Session::default(), "/profile", &table());
    assert_eq!(outcome, GuardOutcome::Redirect { location: "/auth/login?lang=da&next=%2Fprofile".into() });
}

#[test]
fn light_user_on_mitid_route_sees_denial() {
    let guard = Guard::new(AuthLevel::MitidVerified);
    let GuardOutcome::Denied(denial) = guard.evaluate(&signed_in(true, false), "/dashboard/wallet", &table()) else {
        panic!("expected denial");
    };
    assert_eq!(denial.reason, DenyReason::InsufficientLevel);
    assert_eq!(denial.current_level, AuthLevel::LightAccount);
    assert_eq!(denial.required_level, AuthLevel::MitidVerified);
    assert_eq!(denial.action, CallToAction::VerifyMitid);
    assert!(denial.message.contains("Insufficient access"));
    assert!(denial.message.contains("mitid_verified"));
}

#[test]
fn unverified_user_is_asked_to_verify_email() {
    let guard = Guard::new(AuthLevel::LightAccount);
    let GuardOutcome::Denied(denial) = guard.evaluate(&signed_in(false, false), "/profile", &table()) else {
        panic!("expected denial");
    };
    assert_eq!(denial.action, CallToAction::VerifyEmail);
    assert_eq!(denial.action.href(), "/verify-email");
}

#[test]
fn missing_permission_names_permission() {
    let guard = Guard::new(AuthLevel::LightAccount).permission(RECEIVE_PAYMENTS);
    let GuardOutcome::Denied(denial) = guard.evaluate(&signed_in(true, false), "/dashboard/payments", &table())
    else {
        panic!("expected denial");
    };
    assert_eq!(denial.reason, DenyReason::MissingPermission);
    assert_eq!(denial.permission.as_deref(), Some(RECEIVE_PAYMENTS));
    assert_eq!(denial.action, CallToAction::RequestAccess);
    assert!(denial.message.contains("'receive_payments'"));
}

#[test]
fn anonymous_denial_offers_request_access_not_login() {
    let guard = Guard::new(AuthLevel::Public).permission(VIEW_SALES).login_path("/signin");
    let GuardOutcome::Denied(denial) = guard.evaluate(&Session::default(), "/products", &table()) else {
        panic!("expected denial");
    };
    assert_eq!(denial.reason, DenyReason::MissingPermission);
    assert_eq!(denial.action, CallToAction::RequestAccess);
    assert_eq!(denial.action.href(), "/support");
}

#[test]
fn fallback_replaces_default_message() {
    let guard = Guard::new(AuthLevel::MitidVerified).fallback("Verify with MitID to see your wallet.");
    let GuardOutcome::Denied(denial) = guard.evaluate(&signed_in(true, false), "/dashboard/wallet", &table()) else {
        panic!("expected denial");
    };
    assert_eq!(denial.message, "Verify with MitID to see your wallet.");
}

#[test]
fn sufficient_session_is_allowed() {
    let guard = Guard::new(AuthLevel::LightAccount).permission(VIEW_SALES);
    assert!(guard.evaluate(&signed_in(true, false), "/dashboard/sales", &table()).is_allowed());
}

#[test]
fn outcome_serializes_with_state_tag() {
    let json = serde_json::to_value(GuardOutcome::Redirect { location: "/login?next=%2F".into() }).unwrap();
    assert_eq!(json["state"], "redirect");
    assert_eq!(json["location"], "/login?next=%2F");
}

#[test]
fn display_pending_and_redirect() {
    assert_eq!(GuardOutcome::Pending.to_string(), "Loading session...");
    let redirect = GuardOutcome::Redirect { location: "/login?next=%2F".into() };
    assert!(redirect.to_string().contains("/login?next=%2F"));
}

#[test]
fn login_redirect_encodes_location() {
    assert_eq!(login_redirect("/login", "/checkout"), "/login?next=%2Fcheckout");
    assert_eq!(login_redirect("/login", "/products?search=road bike"), "/login?next=%2Fproducts%3Fsearch%3Droad%20bike");
}

// =============================================================================
// GuardedView
// =============================================================================

fn mount(store: &SessionStore, guard: Guard, location: &str) -> (GuardedView, Arc<Mutex<Vec<GuardOutcome>>>) {
    let rendered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&rendered);
    let view = GuardedView::mount(store, guard, location, Arc::new(table()), move |outcome| {
        sink.lock().unwrap().push(outcome.clone());
    });
    (view, rendered)
}

#[test]
fn never_redirects_while_bootstrap_loads() {
    let store = SessionStore::new();
    let (view, rendered) = mount(&store, Guard::new(AuthLevel::LightAccount), "/profile");

    assert_eq!(view.outcome(), GuardOutcome::Pending);
    store.set_session(
        User { id: "1".into(), verified: true, ..User::default() },
        Tokens { access_token: "t".into(), refresh_token: None },
    );

    let rendered = rendered.lock().unwrap();
    assert!(!rendered.iter().any(GuardOutcome::is_redirect));
    assert_eq!(rendered.last(), Some(&GuardOutcome::Allowed));
}

#[test]
fn reevaluates_after_mitid_upgrade() {
    let store = SessionStore::with_session(signed_in(true, false));
    let guard = Guard::new(AuthLevel::MitidVerified).permission(RECEIVE_PAYMENTS);
    let (view, rendered) = mount(&store, guard, "/dashboard/payments");

    assert!(matches!(view.outcome(), GuardOutcome::Denied(_)));
    store.update_user(&UserPatch { mitid_verified: Some(true), ..UserPatch::default() });

    assert!(view.outcome().is_allowed());
    assert_eq!(rendered.lock().unwrap().last(), Some(&GuardOutcome::Allowed));
}

#[test]
fn logout_turns_view_into_redirect() {
    let store = SessionStore::with_session(signed_in(true, true));
    let (view, _rendered) = mount(&store, Guard::new(AuthLevel::MitidVerified), "/dashboard/wallet");
    assert!(view.outcome().is_allowed());

    store.clear();
    assert_eq!(
        view.outcome(),
        GuardOutcome::Redirect { location: "/login?next=%2Fdashboard%2Fwallet".into() }
    );
}

#[test]
fn dropped_view_stops_rendering() {
    let store = SessionStore::with_session(signed_in(true, false));
    let (view, rendered) = mount(&store, Guard::new(AuthLevel::LightAccount), "/profile");
    assert_eq!(store.observer_count(), 1);
    assert_eq!(view.location(), "/profile");

    drop(view);
    store.clear();

    assert_eq!(store.observer_count(), 0);
    assert_eq!(rendered.lock().unwrap().len(), 1);
}
