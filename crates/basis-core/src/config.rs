//! Runtime configuration, read from the environment

use std::{env, path::PathBuf, str::FromStr};

use crate::prelude::*;
use crate::scheduler::CronSchedule;

pub const DEFAULT_DB_DIR: &str = "./data";
pub const DEFAULT_MERGE_ACTIVATION_CRON: &str = "5 0 * * *";
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct BasisConfig {
	/// Directory of the SQLite database
	pub db_dir: PathBuf,
	/// When the activation task looks for due mergers
	pub merge_activation_cron: Box<str>,
	pub event_channel_capacity: usize,
}

impl Default for BasisConfig {
	fn default() -> Self {
		Self {
			db_dir: PathBuf::from(DEFAULT_DB_DIR),
			merge_activation_cron: DEFAULT_MERGE_ACTIVATION_CRON.into(),
			event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
		}
	}
}

impl BasisConfig {
	pub fn from_env() -> ClResult<Self> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Build the config from an arbitrary variable source
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClResult<Self> {
		let defaults = Self::default();

		let db_dir = lookup("DB_DIR").map_or(defaults.db_dir, PathBuf::from);

		let merge_activation_cron =
			lookup("MERGE_ACTIVATION_CRON").map_or(defaults.merge_activation_cron, Into::into);
		CronSchedule::parse(&merge_activation_cron).map_err(|_| {
			Error::ConfigError(format!(
				"MERGE_ACTIVATION_CRON: invalid cron expression '{}'",
				merge_activation_cron
			))
		})?;

		let event_channel_capacity = match lookup("EVENT_CHANNEL_CAPACITY") {
			Some(val) => match usize::from_str(&val) {
				Ok(cap) if cap > 0 => cap,
				_ => {
					return Err(Error::ConfigError(format!(
						"EVENT_CHANNEL_CAPACITY: expected a positive integer, got '{}'",
						val
					)));
				}
			},
			None => defaults.event_channel_capacity,
		};

		Ok(Self { db_dir, merge_activation_cron, event_channel_capacity })
	}
}


// vim: ts=4
