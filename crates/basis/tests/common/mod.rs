//! Common test utilities and helpers
//!
//! Builds an `App` over a temporary SQLite store and seeds a small unit tree.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;

// vim: ts=4
