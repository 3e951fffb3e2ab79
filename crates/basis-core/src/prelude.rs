pub use crate::app::App;
pub use basis_types::prelude::*;

// vim: ts=4
