//! Client configuration parsed from environment variables.
//!
//! `main` loads `.env` through `dotenvy` before calling [`Config::from_env`];
//! command-line flags override the resulting values.

use std::path::{Path, PathBuf};

use crate::auth::guard::DEFAULT_LOGIN_PATH;
use crate::auth::permissions::PermissionTable;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read permissions file {path}: {source}")]
    PermissionsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid permissions file {path}: {source}")]
    PermissionsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_url: String,
    pub session_file: PathBuf,
    pub login_path: String,
    pub permissions: PermissionTable,
    pub timeouts: HttpTimeouts,
}

impl Config {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `NORDBAY_API_URL`: backend base URL, default `http://127.0.0.1:8000`
    /// - `NORDBAY_SESSION_FILE`: default `$HOME/.nordbay/session.json`
    /// - `NORDBAY_LOGIN_PATH`: default `/login`
    /// - `NORDBAY_PERMISSIONS_FILE`: JSON rules layered over the built-in table
    /// - `NORDBAY_REQUEST_TIMEOUT_SECS`: default 30
    /// - `NORDBAY_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if the permissions file is set but unreadable or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = normalize_base_url(&env_or("NORDBAY_API_URL", DEFAULT_API_URL));
        let session_file = std::env::var("NORDBAY_SESSION_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| default_session_file(std::env::var("HOME").ok().as_deref()), PathBuf::from);
        let login_path = env_or("NORDBAY_LOGIN_PATH", DEFAULT_LOGIN_PATH);

        let mut permissions = PermissionTable::storefront_defaults();
        if let Ok(path) = std::env::var("NORDBAY_PERMISSIONS_FILE") {
            permissions = permissions.merged(load_permissions(Path::new(&path))?);
        }

        let timeouts = HttpTimeouts {
            request_secs: env_parse("NORDBAY_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse("NORDBAY_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        Ok(Self { api_url, session_file, login_path, permissions, timeouts })
    }
}

/// Read a JSON permission table from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load_permissions(path: &Path) -> Result<PermissionTable, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::PermissionsRead { path: path.to_path_buf(), source })?;
    PermissionTable::from_json(&raw)
        .map_err(|source| ConfigError::PermissionsParse { path: path.to_path_buf(), source })
}

pub fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

pub(crate) fn default_session_file(home: Option<&str>) -> PathBuf {
    match home.filter(|h| !h.is_empty()) {
        Some(home) => PathBuf::from(home).join(".nordbay").join(SESSION_FILE_NAME),
        None => PathBuf::from(".nordbay-session.json"),
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
