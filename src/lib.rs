//! Polls a GitHub Actions workflow for its latest successful run, downloads the configured artifacts,
//! extracts selected files and remembers which artifact versions were already processed.
//!
//! See: [`framework::run`]

pub mod config;
pub mod env;
pub mod framework;
#[cfg(feature = "telegram")]
pub mod notify;
#[cfg(feature = "git")]
pub mod repository;
pub mod shutdown;
pub mod transactions;
pub mod workflow;

/// The `User-Agent` sent with every outgoing request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
