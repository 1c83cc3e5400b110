//! Delta Accumulator.

use threadline_core::assistant::should_hide_while_streaming;
use threadline_core::{AssistantEntry, AssistantRole, Entry, ReasoningTarget};
use tracing::debug;

/// Upper bound on a reasoning part index; larger values are treated as malformed.
pub const MAX_REASONING_PART_INDEX: i64 = 4096;

fn find_or_insert<'a>(entries: &'a mut Vec<Entry>, id: &str, role: AssistantRole) -> &'a mut AssistantEntry {
    let idx = entries
        .iter()
        .position(|e| matches!(e, Entry::Assistant(a) if a.id == id && a.role == role));
    let idx = match idx {
        Some(idx) => idx,
        None => {
            entries.push(Entry::Assistant(AssistantEntry {
                id: id.to_string(),
                role,
                text: String::new(),
                streaming: true,
                completed: false,
                hide_while_streaming: false,
                structured_output: None,
                reasoning_summary: (role == AssistantRole::Reasoning).then(Vec::new),
                reasoning_content: (role == AssistantRole::Reasoning).then(Vec::new),
            }));
            entries.len() - 1
        }
    };
    match &mut entries[idx] {
        Entry::Assistant(a) => a,
        _ => unreachable!("index points at an assistant entry"),
    }
}

/// Append streamed text onto the assistant entry `(id, role)`, creating it if needed.
pub fn append_delta(entries: &mut Vec<Entry>, id: &str, role: AssistantRole, delta: &str) {
    let entry = find_or_insert(entries, id, role);
    entry.text.push_str(delta);
    entry.streaming = true;
    entry.completed = false;
    entry.structured_output = None;
    if role == AssistantRole::Message {
        entry.hide_while_streaming = should_hide_while_streaming(&entry.text);
    }
}

/// Usable buffer index, or `None` for missing, negative or oversized indices.
pub fn reasoning_part_index(index: Option<i64>) -> Option<usize> {
    index
        .filter(|idx| (0..=MAX_REASONING_PART_INDEX).contains(idx))
        .and_then(|idx| usize::try_from(idx).ok())
}

fn valid_index(index: Option<i64>, id: &str) -> Option<usize> {
    let valid = reasoning_part_index(index);
    if valid.is_none() {
        debug!(item_id = id, index = ?index, "ignoring reasoning part with invalid index");
    }
    valid
}

fn buffer_mut(entry: &mut AssistantEntry, target: ReasoningTarget) -> &mut Vec<String> {
    let slot = match target {
        ReasoningTarget::Summary => &mut entry.reasoning_summary,
        ReasoningTarget::Content => &mut entry.reasoning_content,
    };
    slot.get_or_insert_with(Vec::new)
}

fn pad_to(buffer: &mut Vec<String>, index: usize) {
    if buffer.len() <= index {
        buffer.resize(index + 1, String::new());
    }
}

/// Append `delta` to reasoning buffer `target[index]`, padding earlier slots with empty strings.
pub fn apply_reasoning_delta(
    entries: &mut Vec<Entry>,
    id: &str,
    delta: &str,
    index: Option<i64>,
    target: ReasoningTarget,
) {
    let Some(index) = valid_index(index, id) else {
        return;
    };
    let entry = find_or_insert(entries, id, AssistantRole::Reasoning);
    let buffer = buffer_mut(entry, target);
    pad_to(buffer, index);
    buffer[index].push_str(delta);
    entry.streaming = true;
    entry.completed = false;
    entry.rebuild_reasoning_text();
}

/// Open a new reasoning segment boundary: padding only, no text.
pub fn apply_reasoning_part_added(entries: &mut Vec<Entry>, id: &str, index: Option<i64>, target: ReasoningTarget) {
    let Some(index) = valid_index(index, id) else {
        return;
    };
    let entry = find_or_insert(entries, id, AssistantRole::Reasoning);
    pad_to(buffer_mut(entry, target), index);
    entry.rebuild_reasoning_text();
}

/// Set the progress message of an `mcp` entry. Returns whether the entry exists.
pub fn apply_mcp_progress(entries: &mut [Entry], id: &str, message: &str) -> bool {
    match entries.iter_mut().find(|e| matches!(e, Entry::Mcp(m) if m.id == id)) {
        Some(Entry::Mcp(mcp)) => {
            mcp.message = Some(message.to_string());
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(entries: &[Entry], idx: usize) -> &str {
        &entries[idx].as_assistant().unwrap().text
    }

    #[test]
    fn deltas_concatenate_in_order() {
        let mut entries = Vec::new();
        for delta in ["Hel", "lo ", "there"] {
            append_delta(&mut entries, "a1", AssistantRole::Message, delta);
        }
        assert_eq!(entries.len(), 1);
        assert_eq!(text_of(&entries, 0), "Hello there");
        let entry = entries[0].as_assistant().unwrap();
        assert!(entry.streaming && !entry.completed);
        assert!(!entry.hide_while_streaming);
    }

    #[test]
    fn json_like_message_is_hidden_while_streaming() {
        let mut entries = Vec::new();
        append_delta(&mut entries, "a1", AssistantRole::Message, "  {\"find");
        assert!(entries[0].as_assistant().unwrap().hide_while_streaming);
    }

    #[test]
    fn reasoning_index_law() {
        let mut entries = Vec::new();
        apply_reasoning_part_added(&mut entries, "r1", Some(2), ReasoningTarget::Summary);
        apply_reasoning_delta(&mut entries, "r1", "x", Some(2), ReasoningTarget::Summary);
        apply_reasoning_delta(&mut entries, "r1", "y", Some(2), ReasoningTarget::Summary);

        let entry = entries[0].as_assistant().unwrap();
        assert_eq!(entry.summary_parts(), ["", "", "xy"]);
        assert!(entry.content_parts().is_empty());
        assert_eq!(entry.text, "xy");
    }

    #[test]
    fn sparse_content_index_pads_and_text_orders_summary_first() {
        let mut entries = Vec::new();
        apply_reasoning_delta(&mut entries, "r1", "detail", Some(1), ReasoningTarget::Content);
        apply_reasoning_delta(&mut entries, "r1", "**Plan**", Some(0), ReasoningTarget::Summary);

        let entry = entries[0].as_assistant().unwrap();
        assert_eq!(entry.content_parts(), ["", "detail"]);
        assert_eq!(entry.text, "**Plan**\ndetail");
    }

    #[test]
    fn invalid_indices_are_ignored() {
        let mut entries = Vec::new();
        apply_reasoning_delta(&mut entries, "r1", "x", Some(-1), ReasoningTarget::Summary);
        apply_reasoning_delta(&mut entries, "r1", "x", None, ReasoningTarget::Summary);
        apply_reasoning_part_added(&mut entries, "r1", Some(MAX_REASONING_PART_INDEX + 1), ReasoningTarget::Content);
        assert!(entries.is_empty());
    }

    #[test]
    fn message_and_reasoning_with_same_id_stay_separate() {
        let mut entries = Vec::new();
        append_delta(&mut entries, "x", AssistantRole::Message, "answer");
        apply_reasoning_delta(&mut entries, "x", "thinking", Some(0), ReasoningTarget::Summary);
        assert_eq!(entries.len(), 2);
        assert!(entries[1].is_reasoning());
        assert_eq!(entries[1].id(), "x");
    }
}
