//! NordBay marketplace client.
//!
//! The storefront's access model lives in [`auth`]: a session store, a
//! three-tier level resolver, a capability gate and route guards. [`net`]
//! talks to the marketplace backend, [`storage`] keeps the session across
//! restarts, and [`routes`] binds storefront locations to their guards.

pub mod auth;
pub mod config;
pub mod net;
pub mod routes;
pub mod storage;
