pub use crate::error::{ClResult, Error};
pub use crate::lock;
pub use crate::types::{Patch, Timestamp};

pub use tracing::{debug, error, info, warn};

// vim: ts=4
