//! Snapshot Reconciler: persisted thread → turn store.

use std::collections::{BTreeMap, HashMap};
use threadline_core::assistant::should_hide_while_streaming;
use threadline_core::command::{CommandKind, resolve_parsed_command};
use threadline_core::item::entry_from_item;
use threadline_core::{AssistantRole, Entry, PENDING_TURN_ID, SystemEntry, ThreadSnapshot, Turn, TurnStatus};

use crate::store::TurnStore;

pub const READ_GROUP_PREFIX: &str = "read-group-";

/// Id of the system entry shown when a snapshot cannot be parsed.
pub const PARSE_ERROR_ENTRY_ID: &str = "system-parse";
/// Id of the system entry shown when a snapshot cannot be loaded.
pub const LOAD_ERROR_ENTRY_ID: &str = "system-error";

#[derive(Debug, Clone, Default)]
pub struct DerivedTimeline {
    pub store: TurnStore,
    pub item_to_turn: HashMap<String, String>,
    pub collapsed: BTreeMap<String, bool>,
    /// Last snapshot turn still in progress.
    pub active_turn: Option<String>,
}

/// Read commands without a pending approval render inside a reading group.
pub fn is_groupable_read(entry: &Entry) -> bool {
    match entry {
        Entry::Command(cmd) if cmd.approval.is_none() => {
            resolve_parsed_command(&cmd.command, &cmd.command_actions).kind == CommandKind::Read
        }
        _ => false,
    }
}

/// Ids that carry collapse state: collapsible entries and the first read of
/// every run of consecutive groupable reads (as `read-group-<id>`).
pub fn collapse_ids(entries: &[Entry]) -> Vec<String> {
    let mut ids = Vec::new();
    let mut in_read_run = false;
    for entry in entries {
        if entry.is_collapsible() {
            ids.push(entry.id().to_string());
        }
        if is_groupable_read(entry) {
            if !in_read_run {
                ids.push(format!("{READ_GROUP_PREFIX}{}", entry.id()));
                in_read_run = true;
            }
        } else {
            in_read_run = false;
        }
    }
    ids
}

/// Convert a persisted thread into turns.
///
/// In an in-progress turn whose last item is an assistant message, that
/// message is still streaming; every other message is final. A snapshot
/// with no turns yields one empty `PENDING` turn.
pub fn derive_timeline(snapshot: &ThreadSnapshot, default_collapse: bool) -> DerivedTimeline {
    let mut order = Vec::new();
    let mut turns = HashMap::new();
    let mut item_to_turn = HashMap::new();
    let mut collapsed = BTreeMap::new();
    let mut active_turn = None;

    for raw in &snapshot.turns {
        if raw.id.is_empty() || turns.contains_key(&raw.id) {
            continue;
        }
        let status = TurnStatus::parse(raw.status.as_deref());
        let last_idx = raw.items.len().checked_sub(1);
        let mut turn = Turn::new(raw.id.clone(), status);

        for (idx, item) in raw.items.iter().enumerate() {
            let Some(mut entry) = entry_from_item(item) else {
                continue;
            };
            if let Entry::Assistant(message) = &mut entry
                && message.role == AssistantRole::Message
            {
                let streaming = status == TurnStatus::InProgress && Some(idx) == last_idx;
                message.streaming = streaming;
                message.completed = !streaming;
                message.hide_while_streaming = streaming && should_hide_while_streaming(&message.text);
                if streaming {
                    message.structured_output = None;
                }
            }
            item_to_turn.insert(entry.id().to_string(), raw.id.clone());
            turn.entries.push(entry);
        }

        for id in collapse_ids(&turn.entries) {
            collapsed.insert(id, default_collapse);
        }
        if status == TurnStatus::InProgress {
            active_turn = Some(raw.id.clone());
        }
        order.push(raw.id.clone());
        turns.insert(raw.id.clone(), turn);
    }

    if order.is_empty() {
        order.push(PENDING_TURN_ID.to_string());
        turns.insert(PENDING_TURN_ID.to_string(), Turn::new(PENDING_TURN_ID, TurnStatus::Unknown));
    }

    DerivedTimeline {
        store: TurnStore::from_parts(order, turns),
        item_to_turn,
        collapsed,
        active_turn,
    }
}

fn failure_timeline(status: TurnStatus, entry_id: &str, text: String) -> DerivedTimeline {
    let mut turn = Turn::new(PENDING_TURN_ID, status);
    turn.entries.push(Entry::System(SystemEntry::error(entry_id, text)));
    DerivedTimeline {
        store: TurnStore::from_parts(
            vec![PENDING_TURN_ID.to_string()],
            HashMap::from([(PENDING_TURN_ID.to_string(), turn)]),
        ),
        ..DerivedTimeline::default()
    }
}

/// Timeline shown when the thread payload cannot be decoded.
pub fn parse_failure_timeline() -> DerivedTimeline {
    failure_timeline(
        TurnStatus::Unknown,
        PARSE_ERROR_ENTRY_ID,
        "Failed to parse thread response.".to_string(),
    )
}

/// Timeline shown when the thread could not be fetched at all.
pub fn load_failure_timeline(message: &str) -> DerivedTimeline {
    let text = if message.trim().is_empty() {
        "Failed to load thread".to_string()
    } else {
        message.to_string()
    };
    failure_timeline(TurnStatus::Failed, LOAD_ERROR_ENTRY_ID, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::testing::{agent_message_item, command_item, snapshot, user_item};

    fn derive(value: serde_json::Value) -> DerivedTimeline {
        derive_timeline(&ThreadSnapshot::from_value(value).unwrap(), true)
    }

    #[test]
    fn last_message_of_in_progress_turn_streams() {
        let derived = derive(snapshot(
            "th",
            vec![
                ("T1", "completed", vec![user_item("u1", "hi"), agent_message_item("a1", "hello")]),
                (
                    "T2",
                    "inProgress",
                    vec![agent_message_item("a2", "looking"), agent_message_item("a3", "{\"partial")],
                ),
            ],
        ));

        let t1 = derived.store.get("T1").unwrap();
        assert!(t1.entries[1].as_assistant().unwrap().completed);

        let t2 = derived.store.get("T2").unwrap();
        let earlier = t2.entries[0].as_assistant().unwrap();
        let last = t2.entries[1].as_assistant().unwrap();
        assert!(earlier.completed && !earlier.streaming);
        assert!(last.streaming && !last.completed);
        assert!(last.hide_while_streaming);

        assert_eq!(derived.active_turn.as_deref(), Some("T2"));
        assert_eq!(derived.item_to_turn["a3"], "T2");
    }

    #[test]
    fn seeds_collapse_for_cards_and_read_groups() {
        let derived = derive(snapshot(
            "th",
            vec![(
                "T1",
                "completed",
                vec![
                    command_item("c1", "cat a.txt", "completed"),
                    command_item("c2", "cat b.txt", "completed"),
                    command_item("c3", "cargo build", "completed"),
                    command_item("c4", "cat c.txt", "completed"),
                ],
            )],
        ));
        let keys: Vec<&str> = derived.collapsed.keys().map(String::as_str).collect();
        assert_eq!(keys, ["c1", "c2", "c3", "c4", "read-group-c1", "read-group-c4"]);
    }

    #[test]
    fn unknown_items_are_skipped_and_empty_thread_gets_pending() {
        let derived = derive(snapshot(
            "th",
            vec![("T1", "completed", vec![serde_json::json!({ "type": "hologram", "id": "h" })])],
        ));
        assert!(derived.store.get("T1").unwrap().entries.is_empty());

        let empty = derive(snapshot("th", vec![]));
        assert_eq!(empty.store.order(), [PENDING_TURN_ID]);
        assert_eq!(empty.store.get(PENDING_TURN_ID).unwrap().status, TurnStatus::Unknown);
    }

    #[test]
    fn failure_timelines_carry_system_entries() {
        let parse = parse_failure_timeline();
        let turn = parse.store.get(PENDING_TURN_ID).unwrap();
        assert_eq!(turn.status, TurnStatus::Unknown);
        assert_eq!(turn.entries[0].id(), PARSE_ERROR_ENTRY_ID);

        let load = load_failure_timeline("connection refused");
        let turn = load.store.get(PENDING_TURN_ID).unwrap();
        assert_eq!(turn.status, TurnStatus::Failed);
        assert_eq!(turn.entries[0].id(), LOAD_ERROR_ENTRY_ID);
    }
}
