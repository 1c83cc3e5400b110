//! Render-ready per-turn views.

use serde::Serialize;
use threadline_core::command::CommandKind;
use threadline_core::{AssistantEntry, AssistantRole, Entry, Turn, TurnStatus, UserEntry};

use crate::segment::{
    SegmentedItem, WorkingItem, count_rendered_working_items, count_working_items, parsed,
    segment_exploration_items,
};
use crate::snapshot::READ_GROUP_PREFIX;

pub const REASONING_GROUP_PREFIX: &str = "reasoning-group-";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnView {
    pub id: String,
    pub status: TurnStatus,
    pub user_entries: Vec<UserEntry>,
    /// The final reply: the turn's last assistant message.
    pub reply: Option<AssistantEntry>,
    pub working_items: Vec<SegmentedItem>,
    pub working_item_count: usize,
    pub working_render_count: usize,
}

impl TurnView {
    /// Ids this view renders: explorations, groups and working items,
    /// including the items nested in an exploration.
    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.working_items.iter().flat_map(|segment| {
            let (head, items): (Option<&str>, &[WorkingItem]) = match segment {
                SegmentedItem::Exploration(span) => (Some(span.id.as_str()), &span.items),
                SegmentedItem::Item { item } => (None, std::slice::from_ref(item)),
            };
            head.into_iter().chain(items.iter().map(WorkingItem::id))
        })
    }
}

fn non_blank(parts: &[String]) -> Vec<&str> {
    parts
        .iter()
        .map(String::as_str)
        .filter(|part| !part.trim().is_empty())
        .collect()
}

/// Split a reasoning entry into renderable segments.
///
/// Each non-blank summary part becomes `<id>-summary-<i>`, with the content
/// text folded into the last one; without a summary a single `<id>-content`
/// segment carries the content (or the flat text). Only the last segment of a
/// live entry streams.
fn reasoning_segments(entry: &AssistantEntry) -> Vec<AssistantEntry> {
    let summary = non_blank(entry.summary_parts());
    let content = non_blank(entry.content_parts()).join("\n");

    let mut segments: Vec<(String, String)> = Vec::new();
    if summary.is_empty() {
        let text = if content.is_empty() { entry.text.clone() } else { content };
        if !text.trim().is_empty() {
            segments.push((format!("{}-content", entry.id), text));
        }
    } else {
        let last = summary.len() - 1;
        for (idx, part) in summary.iter().enumerate() {
            let text = if idx == last && !content.is_empty() {
                format!("{part}\n\n{content}")
            } else {
                part.to_string()
            };
            segments.push((format!("{}-summary-{idx}", entry.id), text));
        }
    }

    let live = entry.is_live();
    let count = segments.len();
    segments
        .into_iter()
        .enumerate()
        .map(|(idx, (id, text))| {
            let streaming = live && idx + 1 == count;
            AssistantEntry {
                id,
                text,
                streaming,
                completed: !streaming,
                ..entry.clone()
            }
        })
        .collect()
}

pub fn expand_reasoning_entries(entries: Vec<Entry>) -> Vec<Entry> {
    entries
        .into_iter()
        .flat_map(|entry| match entry {
            Entry::Assistant(reasoning) if entry_is_reasoning(&reasoning) => {
                reasoning_segments(&reasoning).into_iter().map(Entry::Assistant).collect()
            }
            other => vec![other],
        })
        .collect()
}

fn entry_is_reasoning(entry: &AssistantEntry) -> bool {
    entry.role == AssistantRole::Reasoning
}

/// Gather consecutive read commands without an approval into reading groups.
pub fn merge_reading_entries(entries: Vec<Entry>) -> Vec<WorkingItem> {
    let mut grouped: Vec<WorkingItem> = Vec::new();
    for entry in entries {
        match entry {
            Entry::Command(cmd) if cmd.approval.is_none() && parsed(&cmd).kind == CommandKind::Read => {
                if let Some(WorkingItem::ReadingGroup { entries, .. }) = grouped.last_mut() {
                    entries.push(cmd);
                } else {
                    grouped.push(WorkingItem::ReadingGroup {
                        id: format!("{READ_GROUP_PREFIX}{}", cmd.id),
                        entries: vec![cmd],
                    });
                }
            }
            other => grouped.push(WorkingItem::Entry(other)),
        }
    }
    grouped
}

/// Gather runs of two or more reasoning entries into reasoning groups.
pub fn group_reasoning_entries(items: Vec<WorkingItem>) -> Vec<WorkingItem> {
    let mut out = Vec::new();
    let mut run: Vec<AssistantEntry> = Vec::new();

    fn flush(run: &mut Vec<AssistantEntry>, out: &mut Vec<WorkingItem>) {
        match run.len() {
            0 => {}
            1 => out.extend(run.drain(..).map(|e| WorkingItem::Entry(Entry::Assistant(e)))),
            _ => {
                let entries = std::mem::take(run);
                out.push(WorkingItem::ReasoningGroup {
                    id: format!("{REASONING_GROUP_PREFIX}{}", entries[0].id),
                    entries,
                });
            }
        }
    }

    for item in items {
        match item {
            WorkingItem::Entry(Entry::Assistant(entry)) if entry_is_reasoning(&entry) => run.push(entry),
            other => {
                flush(&mut run, &mut out);
                out.push(other);
            }
        }
    }
    flush(&mut run, &mut out);
    out
}

fn is_working_entry(entry: &Entry, reply_id: Option<&str>) -> bool {
    match entry {
        Entry::System(_) => true,
        Entry::Assistant(a) if entry_is_reasoning(a) => true,
        Entry::Assistant(a) => Some(a.id.as_str()) != reply_id,
        other => other.is_activity(),
    }
}

pub fn build_turn_view(turn: &Turn, show_reasoning: bool) -> TurnView {
    let visible: Vec<&Entry> = turn
        .entries
        .iter()
        .filter(|e| show_reasoning || !e.is_reasoning())
        .collect();

    let user_entries = visible
        .iter()
        .filter_map(|e| match e {
            Entry::User(user) => Some(user.clone()),
            _ => None,
        })
        .collect();
    let reply = visible
        .iter()
        .rev()
        .find_map(|e| e.as_assistant().filter(|a| !entry_is_reasoning(a)))
        .cloned();
    let reply_id = reply.as_ref().map(|r| r.id.as_str());

    let working: Vec<Entry> = visible
        .iter()
        .filter(|e| is_working_entry(e, reply_id))
        .map(|e| (*e).clone())
        .collect();
    let items = group_reasoning_entries(merge_reading_entries(expand_reasoning_entries(working)));
    let working_items = segment_exploration_items(items, turn.status == TurnStatus::InProgress);

    TurnView {
        id: turn.id.clone(),
        status: turn.status,
        user_entries,
        working_item_count: count_working_items(&working_items),
        working_render_count: count_rendered_working_items(&working_items),
        working_items,
        reply,
    }
}

pub fn build_turn_views<'a>(turns: impl IntoIterator<Item = &'a Turn>, show_reasoning: bool) -> Vec<TurnView> {
    turns
        .into_iter()
        .map(|turn| build_turn_view(turn, show_reasoning))
        .collect()
}
