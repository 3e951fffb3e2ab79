//! Election master data basis.
//!
//! Organizational units form a tree with a cached closure. Tenants reach into
//! it through ranked scopes resolved by [`permission::PermissionResolver`].
//! Counting circles are assigned to units and inherited downwards, and get
//! retired into successors by event-sourced merge orders.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod activation;
pub mod assignment;
pub mod canton;
pub mod counting_circle;
pub mod grant;
pub mod hierarchy;
pub mod merge;
pub mod permission;
pub mod prelude;
pub mod unit;

pub use basis_core::{App, AppBuilder, AppState, BasisConfig};
pub use basis_types::principal::{Principal, perm};

// vim: ts=4
