use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Collapsed/expanded state for detail cards and synthetic groups, keyed by id.
///
/// Defaults are seeded when an id is first seen; explicit user decisions are
/// tracked separately so refreshes never overwrite them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollapseState {
    by_id: BTreeMap<String, bool>,
    #[serde(skip)]
    explicit: BTreeSet<String>,
}

impl CollapseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_defaults(by_id: BTreeMap<String, bool>) -> Self {
        Self {
            by_id,
            explicit: BTreeSet::new(),
        }
    }

    pub fn is_collapsed(&self, id: &str) -> Option<bool> {
        self.by_id.get(id).copied()
    }

    /// Record a default for an id not seen before.
    pub fn seed(&mut self, id: &str, collapsed: bool) {
        self.by_id.entry(id.to_string()).or_insert(collapsed);
    }

    /// Record an explicit user decision.
    pub fn set(&mut self, id: &str, collapsed: bool) {
        self.by_id.insert(id.to_string(), collapsed);
        self.explicit.insert(id.to_string());
    }

    pub fn is_explicit(&self, id: &str) -> bool {
        self.explicit.contains(id)
    }

    /// Merge a refreshed set of defaults key-wise.
    ///
    /// Ids already known keep their value; new ids take the refreshed
    /// default; ids outside `live_ids` are dropped.
    pub fn merge_refreshed(&mut self, refreshed: BTreeMap<String, bool>, live_ids: &BTreeSet<String>) {
        for (id, collapsed) in refreshed {
            self.by_id.entry(id).or_insert(collapsed);
        }
        self.by_id.retain(|id, _| live_ids.contains(id));
        self.explicit.retain(|id| live_ids.contains(id));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.by_id.iter().map(|(id, collapsed)| (id.as_str(), *collapsed))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
