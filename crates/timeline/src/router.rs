//! Turn Router: decides which turn an event belongs to.

use std::collections::HashMap;
use threadline_core::PENDING_TURN_ID;
use tracing::trace;

/// Which rule of the fallback chain produced a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    Explicit,
    ItemMapping,
    ActiveTurn,
    PendingInProgress,
    PendingDefault,
}

#[derive(Debug, Clone, Default)]
pub struct TurnRouter {
    active_turn: Option<String>,
    item_to_turn: HashMap<String, String>,
}

impl TurnRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_turn(&self) -> Option<&str> {
        self.active_turn.as_deref()
    }

    pub fn set_active_turn(&mut self, turn_id: Option<String>) {
        self.active_turn = turn_id;
    }

    /// Clear the active pointer if it names `turn_id`.
    pub fn clear_active_if(&mut self, turn_id: &str) {
        if self.active_turn.as_deref() == Some(turn_id) {
            self.active_turn = None;
        }
    }

    pub fn turn_for_item(&self, item_id: &str) -> Option<&str> {
        self.item_to_turn.get(item_id).map(String::as_str)
    }

    pub fn item_to_turn(&self) -> &HashMap<String, String> {
        &self.item_to_turn
    }

    /// Resolve a destination turn: explicit id, then the sticky item mapping,
    /// then the active turn, then `PENDING`.
    pub fn resolve(
        &self,
        explicit_turn_id: Option<&str>,
        item_id: Option<&str>,
        pending_in_progress: bool,
    ) -> (String, RouteSource) {
        let (turn_id, source) = if let Some(turn_id) = explicit_turn_id.filter(|id| !id.is_empty()) {
            (turn_id, RouteSource::Explicit)
        } else if let Some(turn_id) = item_id.and_then(|id| self.turn_for_item(id)) {
            (turn_id, RouteSource::ItemMapping)
        } else if let Some(turn_id) = self.active_turn() {
            (turn_id, RouteSource::ActiveTurn)
        } else if pending_in_progress {
            (PENDING_TURN_ID, RouteSource::PendingInProgress)
        } else {
            (PENDING_TURN_ID, RouteSource::PendingDefault)
        };
        trace!(turn_id, ?source, item_id, "routed event");
        (turn_id.to_string(), source)
    }

    /// Remember which turn an item lives in.
    pub fn record(&mut self, item_id: &str, turn_id: &str) {
        self.item_to_turn.insert(item_id.to_string(), turn_id.to_string());
    }

    /// Point every item mapped to `PENDING` at `turn_id`.
    pub fn rehome_pending(&mut self, turn_id: &str) {
        for mapped in self.item_to_turn.values_mut() {
            if mapped == PENDING_TURN_ID {
                *mapped = turn_id.to_string();
            }
        }
    }

    /// Take over mappings from a snapshot; snapshot placement wins.
    pub fn absorb(&mut self, mappings: HashMap<String, String>) {
        self.item_to_turn.extend(mappings);
    }

    /// Replace all routing state, as on a fresh load.
    pub fn reset(&mut self, mappings: HashMap<String, String>, active_turn: Option<String>) {
        self.item_to_turn = mappings;
        self.active_turn = active_turn;
    }
}
