//! Working-Item Segmenter: groups a turn's working items into exploration spans.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use threadline_core::command::{CommandKind, ParsedCommand, resolve_parsed_command};
use threadline_core::{AssistantEntry, CommandEntry, Entry};

/// A renderable unit in a turn's working area.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkingItem {
    /// Consecutive file reads.
    ReadingGroup { id: String, entries: Vec<CommandEntry> },
    /// Consecutive reasoning segments.
    ReasoningGroup { id: String, entries: Vec<AssistantEntry> },
    #[serde(untagged)]
    Entry(Entry),
}

impl WorkingItem {
    pub fn id(&self) -> &str {
        match self {
            Self::ReadingGroup { id, .. } | Self::ReasoningGroup { id, .. } => id,
            Self::Entry(entry) => entry.id(),
        }
    }

    /// Entries this item stands for; groups count their members.
    pub fn member_count(&self) -> usize {
        match self {
            Self::ReasoningGroup { entries, .. } => entries.len(),
            _ => 1,
        }
    }

    fn is_exploration(&self) -> bool {
        match self {
            Self::ReadingGroup { .. } | Self::ReasoningGroup { .. } => true,
            Self::Entry(Entry::Command(cmd)) => parsed(cmd).kind.is_exploration(),
            Self::Entry(entry) => entry.is_reasoning(),
        }
    }

    fn commands(&self) -> &[CommandEntry] {
        match self {
            Self::ReadingGroup { entries, .. } => entries,
            Self::Entry(Entry::Command(cmd)) => std::slice::from_ref(cmd),
            _ => &[],
        }
    }
}

pub(crate) fn parsed(cmd: &CommandEntry) -> ParsedCommand {
    resolve_parsed_command(&cmd.command, &cmd.command_actions)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExplorationStatus {
    Exploring,
    Explored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exploration {
    pub id: String,
    pub status: ExplorationStatus,
    pub items: Vec<WorkingItem>,
    pub unique_file_count: usize,
}

impl Exploration {
    fn open(items: Vec<WorkingItem>, status: ExplorationStatus) -> Self {
        let id = match &items[0] {
            WorkingItem::ReadingGroup { id, .. } => format!("explore-{id}"),
            first => format!("explore-{}-explore", first.id()),
        };
        let unique_file_count = exploration_counts(&items).unique_read_files;
        Self {
            id,
            status,
            items,
            unique_file_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SegmentedItem {
    Exploration(Exploration),
    Item { item: WorkingItem },
}

/// Fold consecutive exploration items (reads, searches, listings, reasoning)
/// into spans. The trailing span is `exploring` while the turn is in progress.
///
/// Reading groups always open or extend a span, so a read that follows a
/// span closed by another item starts the next span instead of standing alone.
pub fn segment_exploration_items(items: Vec<WorkingItem>, turn_in_progress: bool) -> Vec<SegmentedItem> {
    let mut out = Vec::new();
    let mut current: Vec<WorkingItem> = Vec::new();

    for item in items {
        if item.is_exploration() {
            current.push(item);
            continue;
        }
        if !current.is_empty() {
            let span = std::mem::take(&mut current);
            out.push(SegmentedItem::Exploration(Exploration::open(span, ExplorationStatus::Explored)));
        }
        out.push(SegmentedItem::Item { item });
    }

    if !current.is_empty() {
        let status = if turn_in_progress {
            ExplorationStatus::Exploring
        } else {
            ExplorationStatus::Explored
        };
        out.push(SegmentedItem::Exploration(Exploration::open(current, status)));
    }
    out
}

/// Working entries represented, counting reasoning-group members individually.
pub fn count_working_items(items: &[SegmentedItem]) -> usize {
    items
        .iter()
        .map(|item| match item {
            SegmentedItem::Exploration(span) => span.items.iter().map(WorkingItem::member_count).sum(),
            SegmentedItem::Item { item } => item.member_count(),
        })
        .sum()
}

/// Top-level blocks rendered for a turn.
pub fn count_rendered_working_items(items: &[SegmentedItem]) -> usize {
    items.len()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorationCounts {
    pub unique_read_files: usize,
    pub searches: usize,
    pub lists: usize,
}

impl fmt::Display for ExplorationCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.unique_read_files > 0 {
            let noun = if self.unique_read_files == 1 { "file" } else { "files" };
            parts.push(format!("{} {noun}", self.unique_read_files));
        }
        if self.searches > 0 {
            let noun = if self.searches == 1 { "search" } else { "searches" };
            parts.push(format!("{} {noun}", self.searches));
        }
        if self.lists > 0 {
            parts.push(format!("{} list", self.lists));
        }
        f.write_str(&parts.join(", "))
    }
}

pub fn exploration_counts(items: &[WorkingItem]) -> ExplorationCounts {
    let mut files = BTreeSet::new();
    let mut counts = ExplorationCounts::default();
    for cmd in items.iter().flat_map(WorkingItem::commands) {
        let parsed = parsed(cmd);
        match parsed.kind {
            CommandKind::Read => {
                if let Some(name) = parsed.name {
                    files.insert(name);
                }
            }
            CommandKind::Search => counts.searches += 1,
            CommandKind::ListFiles => counts.lists += 1,
            _ => {}
        }
    }
    counts.unique_read_files = files.len();
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(id: &str, command: &str) -> CommandEntry {
        CommandEntry {
            id: id.into(),
            command: command.into(),
            status: "completed".into(),
            cwd: None,
            output: None,
            exit_code: None,
            duration_ms: None,
            command_actions: vec![],
            approval: None,
        }
    }

    fn reading(ids: &[(&str, &str)]) -> WorkingItem {
        WorkingItem::ReadingGroup {
            id: format!("read-group-{}", ids[0].0),
            entries: ids.iter().map(|(id, cmd)| command(id, cmd)).collect(),
        }
    }

    fn cmd_item(id: &str, cmd: &str) -> WorkingItem {
        WorkingItem::Entry(Entry::Command(command(id, cmd)))
    }

    #[test]
    fn reads_around_a_listing_form_one_exploration() {
        let items = vec![
            reading(&[("r1", "cat a.txt"), ("r2", "cat b.txt")]),
            cmd_item("l1", "ls src/"),
            reading(&[("r3", "cat c.txt")]),
        ];
        let segmented = segment_exploration_items(items, true);
        assert_eq!(segmented.len(), 1);
        let SegmentedItem::Exploration(span) = &segmented[0] else {
            panic!("expected exploration");
        };
        assert_eq!(span.status, ExplorationStatus::Exploring);
        assert_eq!(span.id, "explore-read-group-r1");
        assert_eq!(span.items.len(), 3);
        assert_eq!(span.unique_file_count, 3);
        assert_eq!(count_working_items(&segmented), 3);
        assert_eq!(count_rendered_working_items(&segmented), 1);
    }

    #[test]
    fn other_commands_close_the_span() {
        let reasoning = AssistantEntry::reasoning("t1", vec!["plan".into()], vec![]);
        let items = vec![
            WorkingItem::Entry(Entry::Assistant(reasoning)),
            cmd_item("b1", "cargo build"),
            reading(&[("r1", "cat a.txt")]),
        ];
        let segmented = segment_exploration_items(items, false);
        assert_eq!(segmented.len(), 3);
        match &segmented[0] {
            SegmentedItem::Exploration(span) => {
                assert_eq!(span.id, "explore-t1-explore");
                assert_eq!(span.status, ExplorationStatus::Explored);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&segmented[1], SegmentedItem::Item { item } if item.id() == "b1"));
        assert!(matches!(&segmented[2], SegmentedItem::Exploration(span) if span.status == ExplorationStatus::Explored));
    }

    #[test]
    fn reasoning_group_members_are_counted() {
        let group = WorkingItem::ReasoningGroup {
            id: "reasoning-group-t1".into(),
            entries: vec![
                AssistantEntry::reasoning("t1", vec!["a".into()], vec![]),
                AssistantEntry::reasoning("t2", vec!["b".into()], vec![]),
            ],
        };
        let segmented = segment_exploration_items(vec![group, cmd_item("e1", "cargo test")], true);
        assert_eq!(count_working_items(&segmented), 3);
        assert_eq!(count_rendered_working_items(&segmented), 2);
    }

    #[test]
    fn counts_label() {
        let items = vec![
            reading(&[("r1", "cat a.txt"), ("r2", "cat a.txt"), ("r3", "head -n 5 b.txt")]),
            cmd_item("s1", "rg foo src"),
            cmd_item("s2", "grep -n bar"),
            cmd_item("l1", "ls"),
        ];
        let counts = exploration_counts(&items);
        assert_eq!(counts.to_string(), "2 files, 2 searches, 1 list");
        assert_eq!(ExplorationCounts::default().to_string(), "");
    }
}
