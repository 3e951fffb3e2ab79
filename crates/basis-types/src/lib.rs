//! Shared types, entities, and adapter traits for the election master data basis.
//!
//! This crate contains the foundational types that are shared between the
//! domain crate and all adapter implementations. Adapter crates only depend
//! on this crate, so they compile in parallel with the domain logic.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![forbid(unsafe_code)]

pub mod basis_adapter;
pub mod error;
pub mod event;
pub mod prelude;
pub mod principal;
pub mod types;
pub mod utils;

// vim: ts=4
