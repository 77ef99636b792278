//! Account trust tiers and the session → tier mapping.
//!
//! DESIGN
//! ======
//! The backend sets `verified` (email ownership) and `mitid_verified`
//! (national identity) independently. The resolver checks the highest tier
//! first so a user carrying a higher flag is never classified lower, and it
//! never assumes one flag implies the other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::session::Session;

/// Ordered account trust tier. Variant order is the tier order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthLevel {
    /// Anonymous visitors and authenticated-but-unverified accounts.
    Public,
    /// Email ownership confirmed.
    LightAccount,
    /// Identity proven through MitID.
    MitidVerified,
}

impl AuthLevel {
    pub const ALL: [Self; 3] = [Self::Public, Self::LightAccount, Self::MitidVerified];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::LightAccount => "light_account",
            Self::MitidVerified => "mitid_verified",
        }
    }

    /// Human-readable label used in deny messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Public => "a public visitor",
            Self::LightAccount => "a verified email address",
            Self::MitidVerified => "MitID verification",
        }
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AuthLevel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "light_account" | "light" => Ok(Self::LightAccount),
            "mitid_verified" | "mitid" => Ok(Self::MitidVerified),
            other => Err(format!(
                "unknown auth level '{other}' (expected public, light_account or mitid_verified)"
            )),
        }
    }
}

/// Map a session snapshot to its trust tier.
///
/// Pure and total: an absent user, or a user whose flags are missing, lands
/// on [`AuthLevel::Public`].
#[must_use]
pub fn resolve(session: &Session) -> AuthLevel {
    let Some(user) = session.user.as_ref() else {
        return AuthLevel::Public;
    };
    if user.mitid_verified {
        AuthLevel::MitidVerified
    } else if user.verified {
        AuthLevel::LightAccount
    } else {
        AuthLevel::Public
    }
}

#[cfg(test)]
#[path = "level_test.rs"]
mod tests;
