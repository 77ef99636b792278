//! REST client for the marketplace backend.
//!
//! Thin `reqwest` wrapper: one method per endpoint, bearer auth where the
//! backend wants it, JSON in and out. The client holds no session; callers
//! pass tokens explicitly so the session store stays the single source of
//! identity.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx answers become [`ApiError::Status`] with the body preserved.
//! [`ApiError::is_auth_rejection`] tells callers when a token was refused so
//! they can clear the session instead of retrying.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use super::types::{
    AuthResponse, Listing, LoginRequest, MitidStart, MitidStartRequest, NewPublication, Payment, Publication,
    RefreshRequest, RegisterRequest, Sale, Wallet,
};
use crate::auth::session::{User, UserPatch};
use crate::config::HttpTimeouts;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ApiError {
    /// Backend refused the credentials (401/403).
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn send<T>(&self, request: RequestBuilder) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let text = self.send_text(request).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn send_text(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "backend request failed");
            return Err(ApiError::Status { status: status.as_u16(), body: text });
        }
        Ok(text)
    }

    // -------------------------------------------------------------------------
    // users
    // -------------------------------------------------------------------------

    /// `POST /api/users/login`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let request = self.http.post(self.url("/api/users/login")).json(&LoginRequest { email, password });
        self.send(request).await
    }

    /// `POST /api/users/register`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn register(&self, registration: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        let request = self.http.post(self.url("/api/users/register")).json(registration);
        self.send(request).await
    }

    /// `POST /api/users/token/refresh`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        let request = self
            .http
            .post(self.url("/api/users/token/refresh"))
            .json(&RefreshRequest { refresh_token });
        self.send(request).await
    }

    /// `POST /api/users/logout`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-2xx status.
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> Result<(), ApiError> {
        let mut request = self.http.post(self.url("/api/users/logout")).bearer_auth(access_token);
        if let Some(refresh_token) = refresh_token {
            request = request.json(&RefreshRequest { refresh_token });
        }
        self.send_text(request).await.map(|_| ())
    }

    /// `GET /api/users/me`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn me(&self, access_token: &str) -> Result<User, ApiError> {
        let request = self.http.get(self.url("/api/users/me")).bearer_auth(access_token);
        self.send(request).await
    }

    /// `PATCH /api/users/me`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn update_me(&self, access_token: &str, patch: &UserPatch) -> Result<User, ApiError> {
        let request = self
            .http
            .patch(self.url("/api/users/me"))
            .bearer_auth(access_token)
            .json(patch);
        self.send(request).await
    }

    /// `POST /api/users/mitid/start`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn start_mitid(&self, access_token: &str, return_to: &str) -> Result<MitidStart, ApiError> {
        let request = self
            .http
            .post(self.url("/api/users/mitid/start"))
            .bearer_auth(access_token)
            .json(&MitidStartRequest { return_to });
        self.send(request).await
    }

    // -------------------------------------------------------------------------
    // marketplace
    // -------------------------------------------------------------------------

    /// `GET /api/publications[?search=]`. Anonymous when `access_token` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn publications(
        &self,
        search: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<Vec<Publication>, ApiError> {
        let mut request = self.http.get(self.url("/api/publications"));
        if let Some(search) = search.filter(|s| !s.trim().is_empty()) {
            request = request.query(&[("search", search)]);
        }
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        let listing: Listing<Publication> = self.send(request).await?;
        Ok(listing.into_vec())
    }

    /// `POST /api/publications`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn create_publication(
        &self,
        access_token: &str,
        publication: &NewPublication,
    ) -> Result<Publication, ApiError> {
        let request = self
            .http
            .post(self.url("/api/publications"))
            .bearer_auth(access_token)
            .json(publication);
        self.send(request).await
    }

    /// `GET /sales`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn sales(&self, access_token: &str) -> Result<Vec<Sale>, ApiError> {
        let request = self.http.get(self.url("/sales")).bearer_auth(access_token);
        let listing: Listing<Sale> = self.send(request).await?;
        Ok(listing.into_vec())
    }

    /// `GET /payments`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn payments(&self, access_token: &str) -> Result<Vec<Payment>, ApiError> {
        let request = self.http.get(self.url("/payments")).bearer_auth(access_token);
        let listing: Listing<Payment> = self.send(request).await?;
        Ok(listing.into_vec())
    }

    /// `GET /payments/wallet`
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or a malformed body.
    pub async fn wallet(&self, access_token: &str) -> Result<Wallet, ApiError> {
        let request = self.http.get(self.url("/payments/wallet")).bearer_auth(access_token);
        self.send(request).await
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
