//! Core infrastructure for the election master data basis.
//!
//! Holds the shared application state, configuration loading and the
//! persistent task scheduler. Domain logic lives in the `basis` crate.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod prelude;
pub mod scheduler;

pub use app::{App, AppBuilder, AppState};
pub use config::BasisConfig;

// vim: ts=4
