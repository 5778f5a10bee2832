use serde::{Deserialize, Serialize};

use super::tag_set::TagSet;

/// TagUpdatePlan is the minimal set of changes that converges a resource's
/// current tags to the desired ones.
/// `remove_keys` and the keys of `upsert` never overlap.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagUpdatePlan {
    /// Keys present on the resource but not desired. Sorted.
    pub remove_keys: Vec<String>,

    /// Desired tags that are missing on the resource or carry another value.
    pub upsert: TagSet,
}

impl TagUpdatePlan {
    /// Nothing to do, no API calls should be issued.
    pub fn is_empty(&self) -> bool {
        self.remove_keys.is_empty() && self.upsert.is_empty()
    }

    /// Apply the plan to `current`: removals first, then upserts.
    pub fn apply(&self, current: &TagSet) -> TagSet {
        let mut next = current.clone();
        for key in &self.remove_keys {
            next.remove(key);
        }
        next.extend_from(&self.upsert);
        next
    }
}

/// Counts of what a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub upserted: usize,
    pub removed: usize,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.upserted == 0 && self.removed == 0
    }
}
