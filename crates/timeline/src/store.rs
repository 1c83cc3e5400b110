//! Turn Store: ordered turn ids plus turn state by id.

use std::collections::HashMap;
use threadline_core::{Entry, PENDING_TURN_ID, Turn, TurnStatus};

use crate::merge::{is_same_entry, merge_entry};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnStore {
    order: Vec<String>,
    turns: HashMap<String, Turn>,
}

impl TurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an order plus turns; ids missing from `turns` are skipped.
    pub fn from_parts(order: Vec<String>, mut turns: HashMap<String, Turn>) -> Self {
        let mut store = Self::new();
        for id in order {
            if let Some(turn) = turns.remove(&id) {
                store.order.push(id.clone());
                store.turns.insert(id, turn);
            }
        }
        store
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, turn_id: &str) -> Option<&Turn> {
        self.turns.get(turn_id)
    }

    pub fn get_mut(&mut self, turn_id: &str) -> Option<&mut Turn> {
        self.turns.get_mut(turn_id)
    }

    pub fn contains(&self, turn_id: &str) -> bool {
        self.turns.contains_key(turn_id)
    }

    /// Turns in display order.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.order.iter().filter_map(|id| self.turns.get(id))
    }

    pub fn any_in_progress(&self) -> bool {
        self.turns.values().any(Turn::is_in_progress)
    }

    pub fn pending_in_progress(&self) -> bool {
        self.get(PENDING_TURN_ID).is_some_and(Turn::is_in_progress)
    }

    /// Existing turn, or a new one with `status` appended to the order.
    pub fn ensure_turn(&mut self, turn_id: &str, status: TurnStatus) -> &mut Turn {
        if !self.turns.contains_key(turn_id) {
            self.order.push(turn_id.to_string());
        }
        self.turns
            .entry(turn_id.to_string())
            .or_insert_with(|| Turn::new(turn_id, status))
    }

    /// Move a turn's status forward. Returns whether it changed.
    pub fn set_status(&mut self, turn_id: &str, status: TurnStatus) -> bool {
        let turn = self.ensure_turn(turn_id, TurnStatus::Unknown);
        if turn.status != status && turn.status.can_advance_to(status) {
            turn.status = status;
            return true;
        }
        false
    }

    pub fn merge_into(&mut self, turn_id: &str, status_if_new: TurnStatus, entry: Entry) {
        merge_entry(&mut self.ensure_turn(turn_id, status_if_new).entries, entry);
    }

    /// Retire `PENDING` into `turn_id`.
    ///
    /// Pending entries come first; entries already in `turn_id` are merged
    /// onto them so a user message seen through both paths stays single.
    /// `turn_id` takes `PENDING`'s slot in the order unless it already has one.
    pub fn migrate_pending(&mut self, turn_id: &str) {
        let pending = self.turns.remove(PENDING_TURN_ID);
        let pending_pos = self.order.iter().position(|id| id == PENDING_TURN_ID);
        self.order.retain(|id| id != PENDING_TURN_ID);

        let Some(pending) = pending else {
            self.ensure_turn(turn_id, TurnStatus::InProgress);
            return;
        };

        if !self.turns.contains_key(turn_id) {
            let pos = pending_pos.unwrap_or(self.order.len()).min(self.order.len());
            self.order.insert(pos, turn_id.to_string());
            self.turns.insert(turn_id.to_string(), Turn::new(turn_id, TurnStatus::InProgress));
        }

        if let Some(target) = self.turns.get_mut(turn_id) {
            let existing = std::mem::replace(&mut target.entries, pending.entries);
            for entry in existing {
                merge_entry(&mut target.entries, entry);
            }
        }
    }

    /// Fold a refreshed copy of `turn_id` into the live one.
    ///
    /// Entries follow the snapshot's order, each merged onto its live copy.
    /// Live-only entries keep their relative order after them.
    pub fn reconcile_turn(&mut self, turn_id: &str, status: TurnStatus, snapshot_entries: &[Entry]) {
        self.ensure_turn(turn_id, status);
        self.set_status(turn_id, status);
        let Some(turn) = self.turns.get_mut(turn_id) else {
            return;
        };
        let mut live = std::mem::take(&mut turn.entries);
        for incoming in snapshot_entries {
            if let Some(pos) = live.iter().position(|e| is_same_entry(e, incoming)) {
                turn.entries.push(live.remove(pos));
            }
            merge_entry(&mut turn.entries, incoming.clone());
        }
        for entry in live {
            merge_entry(&mut turn.entries, entry);
        }
    }

    /// Remove `PENDING` entries for which `placed` holds, dropping `PENDING`
    /// once it is empty and idle.
    pub fn prune_pending(&mut self, placed: impl Fn(&Entry) -> bool) {
        let Some(pending) = self.turns.get_mut(PENDING_TURN_ID) else {
            return;
        };
        pending.entries.retain(|e| !placed(e));
        if pending.entries.is_empty() && pending.status != TurnStatus::InProgress {
            self.remove(PENDING_TURN_ID);
        }
    }

    /// Put `leading` ids first, in that order; the remaining turns keep their
    /// relative order after them.
    pub fn adopt_order(&mut self, leading: &[String]) {
        let mut order: Vec<String> = leading
            .iter()
            .filter(|id| self.turns.contains_key(*id))
            .cloned()
            .collect();
        for id in &self.order {
            if !order.contains(id) {
                order.push(id.clone());
            }
        }
        self.order = order;
    }

    pub fn remove(&mut self, turn_id: &str) -> Option<Turn> {
        self.order.retain(|id| id != turn_id);
        self.turns.remove(turn_id)
    }

    /// Entry `entry_id` in `turn_id`, whatever its kind.
    pub fn find_entry_mut(&mut self, turn_id: &str, entry_id: &str) -> Option<&mut Entry> {
        self.turns
            .get_mut(turn_id)?
            .entries
            .iter_mut()
            .find(|e| e.id() == entry_id)
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.turns.values_mut().flat_map(|turn| turn.entries.iter_mut())
    }
}
