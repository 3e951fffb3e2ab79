pub use basis_core::prelude::*;
pub use basis_types::principal::Principal;

// vim: ts=4
