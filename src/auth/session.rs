//! Session state for the current user of the storefront.
//!
//! SYSTEM CONTEXT
//! ==============
//! `SessionStore` is the single authoritative record of who is signed in.
//! Resolver, gate and guards only read snapshots of it; the auth service is
//! the only writer. The store performs no I/O.
//!
//! ORDERING
//! ========
//! Every `clear()` and direct `set_session()` advances an epoch counter.
//! Asynchronous writers take a [`MutationTicket`] before their network call
//! and commit through the ticketed methods, which drop the write if the epoch
//! moved in between. A refresh that resolves after a logout therefore cannot
//! bring the old session back.
//!
//! Observers are invoked after each visible change, outside the lock, so
//! they may read or write the store again. Snapshots are queued under the
//! lock and drained by one thread at a time, so every observer sees changes
//! in the order they were made. A change made while another thread is
//! draining is delivered by that thread before it returns.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// USER
// =============================================================================

/// Account record as issued by the backend.
///
/// Unknown fields (including the legacy `account_level` string) are ignored.
/// Missing or `null` verification flags read as `false`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Email ownership confirmed by the backend.
    #[serde(default, deserialize_with = "flag")]
    pub verified: bool,
    /// MitID identity proofing completed.
    #[serde(default, deserialize_with = "flag")]
    pub mitid_verified: bool,
}

impl User {
    /// Name shown in greetings; falls back to the email address.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.to_owned(),
            _ => self.email.clone(),
        }
    }
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!("invalid user id: {other}"))),
    }
}

/// Partial user update. `None` fields leave the current value untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitid_verified: Option<bool>,
}

impl UserPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply(&self, user: &mut User) {
        if let Some(email) = &self.email {
            user.email.clone_from(email);
        }
        if let Some(first_name) = &self.first_name {
            user.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &self.last_name {
            user.last_name = Some(last_name.clone());
        }
        if let Some(phone) = &self.phone {
            user.phone = Some(phone.clone());
        }
        if let Some(verified) = self.verified {
            user.verified = verified;
        }
        if let Some(mitid_verified) = self.mitid_verified {
            user.mitid_verified = mitid_verified;
        }
    }
}

// =============================================================================
// TOKENS
// =============================================================================

/// Bearer credentials issued alongside the user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for Tokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// =============================================================================
// SESSION SNAPSHOT
// =============================================================================

/// Point-in-time view of the session. Cheap to clone; gate decisions read
/// one of these and never hold the store lock.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub tokens: Option<Tokens>,
    /// User present and an access token held.
    pub is_authenticated: bool,
    /// Session still being established; gate decisions are pending.
    pub is_loading: bool,
}

impl Session {
    /// Session as it looks before hydration has finished.
    #[must_use]
    pub fn loading() -> Self {
        Self { is_loading: true, ..Self::default() }
    }

    /// Fully established session for `user`.
    #[must_use]
    pub fn signed_in(user: User, tokens: Tokens) -> Self {
        Self { user: Some(user), tokens: Some(tokens), is_authenticated: true, is_loading: false }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.as_ref().and_then(|t| t.refresh_token.as_deref())
    }
}

// =============================================================================
// STORE
// =============================================================================

type Observer = Arc<dyn Fn(&Session) + Send + Sync>;

/// Proof that a writer observed the store at a given epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MutationTicket {
    epoch: u64,
}

struct StoreInner {
    session: Session,
    epoch: u64,
    next_observer_id: u64,
    observers: Vec<(u64, Observer)>,
    pending: VecDeque<Session>,
    dispatching: bool,
}

/// Shared handle to the session. Clones refer to the same state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl SessionStore {
    /// Store in its bootstrap state: no user, loading until hydration runs.
    #[must_use]
    pub fn new() -> Self {
        Self::with_session(Session::loading())
    }

    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                session,
                epoch: 0,
                next_observer_id: 0,
                observers: Vec::new(),
                pending: VecDeque::new(),
                dispatching: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.lock().session.clone()
    }

    /// Current write epoch. Advances on `clear` and `set_session`.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Record the current epoch before starting an asynchronous write.
    #[must_use]
    pub fn begin(&self) -> MutationTicket {
        MutationTicket { epoch: self.lock().epoch }
    }

    /// Whether a write under `ticket` would still be accepted.
    #[must_use]
    pub fn is_current(&self, ticket: MutationTicket) -> bool {
        self.lock().epoch == ticket.epoch
    }

    /// Replace user and tokens, marking the session authenticated and loaded.
    pub fn set_session(&self, user: User, tokens: Tokens) {
        let inner = self.lock();
        self.install(inner, user, tokens);
    }

    /// `set_session` for a writer that started at `ticket`. Returns `false`
    /// and leaves the store untouched when the ticket is stale.
    pub fn apply(&self, ticket: MutationTicket, user: User, tokens: Tokens) -> bool {
        let inner = self.lock();
        if inner.epoch != ticket.epoch {
            tracing::debug!(ticket = ticket.epoch, epoch = inner.epoch, "discarding stale session write");
            return false;
        }
        self.install(inner, user, tokens);
        true
    }

    fn install(&self, mut inner: MutexGuard<'_, StoreInner>, user: User, tokens: Tokens) {
        inner.epoch += 1;
        tracing::debug!(user_id = %user.id, epoch = inner.epoch, "session set");
        inner.session = Session::signed_in(user, tokens);
        self.notify(inner);
    }

    /// Drop user and tokens and end any pending load.
    ///
    /// Always invalidates outstanding tickets. Observers are only notified
    /// when the visible session actually changed, so a second call is a no-op.
    /// Returns whether anything changed.
    pub fn clear(&self) -> bool {
        let inner = self.lock();
        self.clear_locked(inner)
    }

    /// `clear` for a writer that started at `ticket`; a newer session wins.
    pub fn clear_if_current(&self, ticket: MutationTicket) -> bool {
        let inner = self.lock();
        if inner.epoch != ticket.epoch {
            tracing::debug!(ticket = ticket.epoch, epoch = inner.epoch, "skipping clear from stale writer");
            return false;
        }
        self.clear_locked(inner)
    }

    fn clear_locked(&self, mut inner: MutexGuard<'_, StoreInner>) -> bool {
        inner.epoch += 1;
        let cleared = Session::default();
        if inner.session == cleared {
            return false;
        }
        tracing::debug!(epoch = inner.epoch, "session cleared");
        inner.session = cleared;
        self.notify(inner);
        true
    }

    pub fn set_loading(&self, loading: bool) {
        let mut inner = self.lock();
        if inner.session.is_loading == loading {
            return;
        }
        inner.session.is_loading = loading;
        self.notify(inner);
    }

    /// Merge `patch` into the current user.
    ///
    /// With no user present this is deliberately a no-op returning `false`:
    /// a profile update that lands after logout has nothing to update.
    pub fn update_user(&self, patch: &UserPatch) -> bool {
        let mut inner = self.lock();
        if !Self::merge(&mut inner, patch) {
            return false;
        }
        self.notify(inner);
        true
    }

    /// `update_user` for a writer that started at `ticket`.
    pub fn apply_update(&self, ticket: MutationTicket, patch: &UserPatch) -> bool {
        let mut inner = self.lock();
        if inner.epoch != ticket.epoch {
            tracing::debug!(ticket = ticket.epoch, epoch = inner.epoch, "discarding stale user update");
            return false;
        }
        if !Self::merge(&mut inner, patch) {
            return false;
        }
        self.notify(inner);
        true
    }

    /// Swap in a complete user record from the backend for a writer that
    /// started at `ticket`. Fields absent from `user` are cleared locally too.
    /// Tokens are kept; with no user present this is a no-op.
    pub fn replace_user(&self, ticket: MutationTicket, user: User) -> bool {
        let mut inner = self.lock();
        if inner.epoch != ticket.epoch {
            tracing::debug!(ticket = ticket.epoch, epoch = inner.epoch, "discarding stale user record");
            return false;
        }
        let Some(current) = inner.session.user.as_mut() else {
            tracing::debug!("user record ignored: no user in session");
            return false;
        };
        if *current == user {
            return false;
        }
        *current = user;
        self.notify(inner);
        true
    }

    fn merge(inner: &mut StoreInner, patch: &UserPatch) -> bool {
        let Some(user) = inner.session.user.as_mut() else {
            tracing::debug!("user update ignored: no user in session");
            return false;
        };
        let before = user.clone();
        patch.apply(user);
        *user != before
    }

    /// Register `observer` to run after every visible change. The returned
    /// guard unsubscribes on drop.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_observer_id;
        inner.next_observer_id += 1;
        inner.observers.push((id, Arc::new(observer)));
        Subscription { id, store: Arc::downgrade(&self.inner) }
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    fn notify<'a>(&'a self, mut inner: MutexGuard<'a, StoreInner>) {
        let session = inner.session.clone();
        inner.pending.push_back(session);
        if inner.dispatching {
            return;
        }
        inner.dispatching = true;
        let _dispatch = DispatchGuard { store: &self.inner };

        loop {
            let Some(session) = inner.pending.pop_front() else {
                inner.dispatching = false;
                return;
            };
            let observers: Vec<Observer> = inner.observers.iter().map(|(_, o)| Arc::clone(o)).collect();
            drop(inner);
            for observer in observers {
                observer(&session);
            }
            inner = self.lock();
        }
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("SessionStore")
            .field("session", &inner.session)
            .field("epoch", &inner.epoch)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the dispatcher role if an observer panics mid-delivery.
struct DispatchGuard<'a> {
    store: &'a Mutex<StoreInner>,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let mut inner = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        inner.dispatching = false;
        inner.pending.clear();
    }
}

/// Live observer registration. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    store: Weak<Mutex<StoreInner>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            let mut inner = store.lock().unwrap_or_else(PoisonError::into_inner);
            inner.observers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
