//! Common types used throughout the basis.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::SystemTime;

pub const SECONDS_PER_DAY: i64 = 86_400;

// Timestamp //
//***********//
/// Unix timestamp in seconds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
	pub fn now() -> Timestamp {
		let res = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default();
		Timestamp(i64::try_from(res.as_secs()).unwrap_or(i64::MAX))
	}

	pub fn from_now(seconds: i64) -> Timestamp {
		Timestamp::now().add_seconds(seconds)
	}

	pub fn add_seconds(self, seconds: i64) -> Timestamp {
		Timestamp(self.0.saturating_add(seconds))
	}

	pub fn add_days(self, days: i64) -> Timestamp {
		self.add_seconds(days.saturating_mul(SECONDS_PER_DAY))
	}

	/// RFC 3339 representation, falls back to the raw number for out-of-range values
	pub fn to_iso(self) -> String {
		chrono::DateTime::<chrono::Utc>::from_timestamp(self.0, 0)
			.map_or_else(|| self.0.to_string(), |dt| dt.to_rfc3339())
	}
}

impl std::fmt::Display for Timestamp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

pub fn serialize_timestamp_iso<S>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&ts.to_iso())
}

// Patch //
//*******//
/// Tri-state field for partial updates: absent, explicitly cleared, or set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Patch<T> {
	#[default]
	Undefined,
	Null,
	Value(T),
}

impl<T> Patch<T> {
	pub fn is_undefined(&self) -> bool {
		matches!(self, Patch::Undefined)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Patch::Null)
	}

	pub fn as_value(&self) -> Option<&T> {
		match self {
			Patch::Value(v) => Some(v),
			_ => None,
		}
	}

	/// Resolve against the current value of an optional field
	pub fn apply_to(self, current: Option<T>) -> Option<T> {
		match self {
			Patch::Undefined => current,
			Patch::Null => None,
			Patch::Value(v) => Some(v),
		}
	}
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
	T: Deserialize<'de>,
{
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		Option::<T>::deserialize(deserializer).map(|v| v.map_or(Patch::Null, Patch::Value))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_patch_apply() {
		assert_eq!(Patch::Undefined.apply_to(Some(1)), Some(1));
		assert_eq!(Patch::<i32>::Null.apply_to(Some(1)), None);
		assert_eq!(Patch::Value(2).apply_to(None), Some(2));
	}

	#[test]
	fn test_patch_deserialize() {
		#[derive(Deserialize)]
		struct Doc {
			#[serde(default)]
			name: Patch<String>,
			#[serde(default)]
			email: Patch<String>,
			#[serde(default)]
			bfs: Patch<String>,
		}

		let doc: Doc = serde_json::from_str(r#"{"name": "Stadt", "email": null}"#).unwrap();
		assert_eq!(doc.name, Patch::Value("Stadt".to_string()));
		assert_eq!(doc.email, Patch::Null);
		assert!(doc.bfs.is_undefined());
	}

	#[test]
	fn test_timestamp_days() {
		let ts = Timestamp(1_000);
		assert_eq!(ts.add_days(1), Timestamp(1_000 + SECONDS_PER_DAY));
		assert!(ts.add_days(-1) < ts);
	}
}

// vim: ts=4
