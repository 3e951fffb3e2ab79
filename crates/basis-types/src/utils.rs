//! Utility functions and macros

/// Lock a std mutex, mapping poisoning to an internal error
#[macro_export]
macro_rules! lock {
	($mutex:expr) => {
		$mutex.lock().map_err(|_| $crate::error::Error::Internal("mutex poisoned".into()))
	};
	($mutex:expr, $name:literal) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal(concat!("mutex poisoned: ", $name).into()))
	};
}

/// Generate a new random entity id
pub fn new_id() -> Box<str> {
	uuid::Uuid::new_v4().to_string().into_boxed_str()
}

/// Sort and deduplicate a list of ids
pub fn normalize_ids(ids: &[Box<str>]) -> Vec<Box<str>> {
	let mut ids = ids.to_vec();
	ids.sort();
	ids.dedup();
	ids
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_new_id_is_unique() {
		assert_ne!(new_id(), new_id());
	}

	#[test]
	fn test_normalize_ids() {
		let ids: Vec<Box<str>> = vec!["b".into(), "a".into(), "b".into()];
		assert_eq!(normalize_ids(&ids), vec![Box::<str>::from("a"), Box::from("b")]);
	}
}

// vim: ts=4
