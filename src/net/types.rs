//! Wire types exchanged with the marketplace backend.

use serde::{Deserialize, Serialize};

use crate::auth::session::{Tokens, User, string_or_number};

// =============================================================================
// AUTH
// =============================================================================

/// Body returned by login, register and token refresh.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthResponse {
    #[serde(alias = "access")]
    pub access_token: String,
    #[serde(default, alias = "refresh")]
    pub refresh_token: Option<String>,
    pub user: User,
}

impl AuthResponse {
    /// Split into the pieces the session store takes. A refresh response that
    /// omits the refresh token keeps `fallback_refresh`.
    #[must_use]
    pub fn into_parts(self, fallback_refresh: Option<&str>) -> (User, Tokens) {
        let refresh_token = self.refresh_token.or_else(|| fallback_refresh.map(str::to_owned));
        (self.user, Tokens { access_token: self.access_token, refresh_token })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct MitidStartRequest<'a> {
    pub return_to: &'a str,
}

/// Where to send the browser to begin MitID identity proofing.
#[derive(Clone, Debug, Deserialize)]
pub struct MitidStart {
    #[serde(alias = "url")]
    pub redirect_url: String,
}

// =============================================================================
// MARKETPLACE
// =============================================================================

/// List endpoints answer either with a bare array or a paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Plain(Vec<T>),
    Paged { results: Vec<T> },
}

impl<T> Listing<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::Plain(items) | Self::Paged { results: items } => items,
        }
    }
}

/// A product listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Payload for the listing wizard's final submit.
#[derive(Clone, Debug, Default, Serialize)]
pub struct NewPublication {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub publication_title: Option<String>,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub pending: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "DKK".to_owned()
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
