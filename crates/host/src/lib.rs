//! HTTP client for the host business application.
//!
//! Implements every workflow port by calling the host's whitelisted methods under
//! `/api/method/…` with token authentication.

pub mod client;
pub mod error;
pub mod wire;

pub use client::HostClient;
pub use error::HostError;
