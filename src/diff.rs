//! Tag diff engine
use crate::models::{TagSet, TagUpdatePlan};

/// Compute the minimal plan converging `current` to `desired`.
///
/// Keys only present in `current` are removed; keys of `desired` that are
/// missing from `current` or carry a different value are upserted.
/// Neither input is modified.
pub fn diff(current: &TagSet, desired: &TagSet) -> TagUpdatePlan {
    // TagSet iterates in key order, so `remove_keys` comes out sorted.
    let remove_keys = current
        .keys()
        .filter(|key| !desired.contains_key(key))
        .cloned()
        .collect();

    let upsert = desired
        .iter()
        .filter(|(key, value)| current.get(key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    TagUpdatePlan {
        remove_keys,
        upsert,
    }
}
