pub mod api;
pub mod types;

#[cfg(test)]
pub(crate) mod fake_backend;

pub use api::{ApiClient, ApiError};
