//! Collaboration-item index, fed from every thread regardless of focus.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use threadline_core::item::entry_from_item;
use threadline_core::{CollabEntry, Entry, InboundEvent, ProtocolEvent, ThreadSnapshot};
use tracing::debug;

/// Latest copy of every collaboration tool call, keyed by owning thread and
/// item id, plus a discovery sequence per item.
#[derive(Debug, Clone, Default)]
pub struct CollabIndex {
    items_by_thread: BTreeMap<String, BTreeMap<String, CollabEntry>>,
    seq_by_item: HashMap<String, u64>,
    next_seq: u64,
    fork_parents: BTreeMap<String, String>,
    running_threads: BTreeSet<String>,
}

impl CollabIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` under `thread_id`. The first sighting of an item id
    /// assigns its sequence number. Returns whether anything changed.
    pub fn ingest(&mut self, thread_id: &str, entry: CollabEntry) -> bool {
        if thread_id.is_empty() || entry.id.is_empty() {
            return false;
        }
        if !self.seq_by_item.contains_key(&entry.id) {
            self.seq_by_item.insert(entry.id.clone(), self.next_seq);
            self.next_seq += 1;
        }
        let items = self.items_by_thread.entry(thread_id.to_string()).or_default();
        if items.get(&entry.id) == Some(&entry) {
            return false;
        }
        items.insert(entry.id.clone(), entry);
        true
    }

    /// Ingest a raw item if it is a collaboration tool call.
    pub fn ingest_item(&mut self, thread_id: &str, item: &Value) -> bool {
        match entry_from_item(item) {
            Some(Entry::Collab(entry)) => self.ingest(thread_id, entry),
            _ => false,
        }
    }

    /// Ingest every collaboration item of a persisted thread.
    pub fn ingest_snapshot(&mut self, snapshot: &ThreadSnapshot) -> bool {
        let mut changed = false;
        for item in snapshot.turns.iter().flat_map(|turn| &turn.items) {
            changed |= self.ingest_item(&snapshot.id, item);
        }
        changed
    }

    /// Track collaboration items and running turns from a live event of any thread.
    pub fn ingest_event(&mut self, event: &InboundEvent) -> bool {
        let Some(thread_id) = event.thread_id.as_deref() else {
            return false;
        };
        match &event.event {
            ProtocolEvent::ItemStarted { item, .. } | ProtocolEvent::ItemCompleted { item, .. } => {
                self.ingest_item(thread_id, item)
            }
            ProtocolEvent::TurnStarted { .. } => self.set_running(thread_id, true),
            ProtocolEvent::TurnCompleted { .. } => self.set_running(thread_id, false),
            _ => false,
        }
    }

    /// Record that `child` was forked from `parent`.
    pub fn record_fork(&mut self, child: &str, parent: &str) {
        if child.is_empty() || parent.is_empty() || child == parent {
            debug!(child, parent, "ignoring invalid fork record");
            return;
        }
        self.fork_parents.insert(child.to_string(), parent.to_string());
    }

    pub fn set_running(&mut self, thread_id: &str, running: bool) -> bool {
        if running {
            self.running_threads.insert(thread_id.to_string())
        } else {
            self.running_threads.remove(thread_id)
        }
    }

    pub fn running_threads(&self) -> &BTreeSet<String> {
        &self.running_threads
    }

    pub fn fork_parents(&self) -> &BTreeMap<String, String> {
        &self.fork_parents
    }

    pub fn seq(&self, item_id: &str) -> Option<u64> {
        self.seq_by_item.get(item_id).copied()
    }

    /// Every known item with its owning thread and sequence.
    pub fn items(&self) -> impl Iterator<Item = (&str, &CollabEntry, u64)> {
        self.items_by_thread.iter().flat_map(move |(thread_id, items)| {
            items
                .values()
                .map(move |entry| (thread_id.as_str(), entry, self.seq(&entry.id).unwrap_or(u64::MAX)))
        })
    }

    pub fn len(&self) -> usize {
        self.items_by_thread.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
