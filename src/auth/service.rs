//! Session lifecycle: the only component that writes the session store.
//!
//! SYSTEM CONTEXT
//! ==============
//! Commands call into `AuthService`; it talks to the backend through
//! `ApiClient` and commits the outcome to `SessionStore`. Guards never see
//! this module, only the snapshots it leaves behind.
//!
//! ORDERING
//! ========
//! Each network-backed write takes a ticket before the request goes out and
//! commits through it afterwards. If a logout (or another sign-in) lands in
//! between, the late result is dropped and the caller gets
//! [`AuthError::Superseded`].

use super::level::{AuthLevel, resolve};
use super::session::{MutationTicket, SessionStore, User, UserPatch};
use crate::net::api::{ApiClient, ApiError};
use crate::net::types::RegisterRequest;
use crate::storage::SessionStorage;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("session changed while the request was in flight")]
    Superseded,
    #[error(transparent)]
    Api(#[from] ApiError),
}

// =============================================================================
// SERVICE
// =============================================================================

#[derive(Clone, Debug)]
pub struct AuthService {
    api: ApiClient,
    store: SessionStore,
}

impl AuthService {
    #[must_use]
    pub fn new(api: ApiClient, store: SessionStore) -> Self {
        Self { api, store }
    }

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Access token of the current session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`] when nobody is signed in.
    pub fn access_token(&self) -> Result<String, AuthError> {
        self.store
            .snapshot()
            .access_token()
            .map(str::to_owned)
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Establish the session from `storage`, validating stored tokens against
    /// the backend. The store reports loading until this returns.
    ///
    /// Never fails: unreadable storage, rejected tokens and unusable backend
    /// answers end signed out. Only when the backend cannot be reached at all
    /// is the stored session trusted as-is.
    pub async fn bootstrap(&self, storage: &dyn SessionStorage) {
        self.store.set_loading(true);
        let ticket = self.store.begin();

        let record = match storage.load() {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.store.clear_if_current(ticket);
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "stored session unreadable; starting signed out");
                self.store.clear_if_current(ticket);
                return;
            }
        };

        match self.api.me(&record.tokens.access_token).await {
            Ok(user) => {
                self.store.apply(ticket, user, record.tokens);
            }
            Err(e) if e.is_auth_rejection() => {
                let Some(refresh_token) = record.tokens.refresh_token.as_deref() else {
                    tracing::info!("stored access token rejected; signing out");
                    self.store.clear_if_current(ticket);
                    return;
                };
                match self.api.refresh(refresh_token).await {
                    Ok(response) => {
                        let (user, tokens) = response.into_parts(Some(refresh_token));
                        self.store.apply(ticket, user, tokens);
                    }
                    Err(e) => {
                        tracing::info!(error = %e, "stored session could not be refreshed; signing out");
                        self.store.clear_if_current(ticket);
                    }
                }
            }
            Err(ApiError::Request(e)) => {
                tracing::warn!(error = %e, "backend unreachable; using stored session");
                self.store.apply(ticket, record.user, record.tokens);
            }
            Err(e) => {
                tracing::warn!(error = %e, "stored session could not be validated; signing out");
                self.store.clear_if_current(ticket);
            }
        }
    }

    /// # Errors
    ///
    /// Returns the backend error, or [`AuthError::Superseded`] if the session
    /// changed while the request was in flight.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let ticket = self.store.begin();
        let response = self.api.login(email, password).await?;
        let (user, tokens) = response.into_parts(None);
        if !self.store.apply(ticket, user.clone(), tokens) {
            return Err(AuthError::Superseded);
        }
        tracing::info!(user_id = %user.id, level = %resolve(&self.store.snapshot()), "logged in");
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns the backend error, or [`AuthError::Superseded`] if the session
    /// changed while the request was in flight.
    pub async fn register(&self, registration: &RegisterRequest) -> Result<User, AuthError> {
        let ticket = self.store.begin();
        let response = self.api.register(registration).await?;
        let (user, tokens) = response.into_parts(None);
        if !self.store.apply(ticket, user.clone(), tokens) {
            return Err(AuthError::Superseded);
        }
        tracing::info!(user_id = %user.id, "registered");
        Ok(user)
    }

    /// Exchange the refresh token for new credentials. A rejected refresh
    /// token signs the user out.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`] without a refresh token, the
    /// backend error, or [`AuthError::Superseded`].
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let refresh_token = self
            .store
            .snapshot()
            .refresh_token()
            .map(str::to_owned)
            .ok_or(AuthError::NotAuthenticated)?;
        let ticket = self.store.begin();

        match self.api.refresh(&refresh_token).await {
            Ok(response) => {
                let (user, tokens) = response.into_parts(Some(&refresh_token));
                if self.store.apply(ticket, user, tokens) {
                    Ok(())
                } else {
                    Err(AuthError::Superseded)
                }
            }
            Err(e) if e.is_auth_rejection() => {
                tracing::warn!("refresh token rejected; signing out");
                self.store.clear_if_current(ticket);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sign out locally, then tell the backend. The local clear happens first
    /// and is final; a failed backend call is only logged.
    pub async fn logout(&self) {
        let session = self.store.snapshot();
        self.store.clear();
        let Some(access_token) = session.access_token() else {
            return;
        };
        if let Err(e) = self.api.logout(access_token, session.refresh_token()).await {
            tracing::debug!(error = %e, "backend logout failed");
        }
        tracing::info!("logged out");
    }

    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`], the backend error, or
    /// [`AuthError::Superseded`].
    pub async fn update_profile(&self, patch: &UserPatch) -> Result<User, AuthError> {
        let access_token = self.access_token()?;
        let ticket = self.store.begin();
        let user = self.api.update_me(&access_token, patch).await?;
        self.commit_user(ticket, &user)?;
        Ok(user)
    }

    /// Re-read the user from the backend and merge it into the session.
    /// One refresh is attempted if the access token has expired.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`], the backend error, or
    /// [`AuthError::Superseded`].
    pub async fn sync_user(&self) -> Result<User, AuthError> {
        let access_token = self.access_token()?;
        let ticket = self.store.begin();
        let user = match self.api.me(&access_token).await {
            Ok(user) => user,
            Err(e) if e.is_auth_rejection() => {
                self.refresh().await?;
                let ticket = self.store.begin();
                let user = self.api.me(&self.access_token()?).await?;
                self.commit_user(ticket, &user)?;
                return Ok(user);
            }
            Err(e) => return Err(e.into()),
        };
        self.commit_user(ticket, &user)?;
        Ok(user)
    }

    /// Ask the backend where to send the user for MitID proofing.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`] or the backend error.
    pub async fn start_mitid(&self, return_to: &str) -> Result<String, AuthError> {
        let access_token = self.access_token()?;
        let start = self.api.start_mitid(&access_token, return_to).await?;
        Ok(start.redirect_url)
    }

    /// Pick up the result of a finished MitID flow.
    ///
    /// # Errors
    ///
    /// Same as [`AuthService::sync_user`].
    pub async fn complete_mitid(&self) -> Result<AuthLevel, AuthError> {
        let user = self.sync_user().await?;
        let level = resolve(&self.store.snapshot());
        if user.mitid_verified {
            tracing::info!(user_id = %user.id, "MitID verification confirmed");
        } else {
            tracing::info!(user_id = %user.id, "MitID verification not completed yet");
        }
        Ok(level)
    }

    fn commit_user(&self, ticket: MutationTicket, user: &User) -> Result<(), AuthError> {
        if !self.store.is_current(ticket) {
            return Err(AuthError::Superseded);
        }
        self.store.replace_user(ticket, user.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "service_test.rs"]
mod tests;
