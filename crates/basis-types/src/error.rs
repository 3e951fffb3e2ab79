//! Error type shared by all crates of the workspace.

use std::fmt;

pub type ClResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// The entity does not exist or is outside of the caller's readable scope.
	NotFound,
	/// The entity is visible but the caller may not modify it.
	PermissionDenied,
	/// The request itself is malformed (duplicate ids, missing fields, ...).
	ValidationError(String),
	/// The entity is in a state that forbids the operation (merge locks,
	/// already activated mergers, concurrent modification).
	Conflict(String),
	DbError,
	Parse,
	ConfigError(String),
	Internal(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::NotFound => write!(f, "not found"),
			Error::PermissionDenied => write!(f, "permission denied"),
			Error::ValidationError(msg) => write!(f, "validation failed: {}", msg),
			Error::Conflict(msg) => write!(f, "conflict: {}", msg),
			Error::DbError => write!(f, "database error"),
			Error::Parse => write!(f, "parse error"),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		tracing::warn!("JSON error: {}", err);
		Error::Parse
	}
}

impl From<uuid::Error> for Error {
	fn from(_err: uuid::Error) -> Self {
		Error::Parse
	}
}

// vim: ts=4
