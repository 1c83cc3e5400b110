//! Entry Merger.
//!
//! One idempotent merge function reconciles tentative local state (the
//! optimistic user echo, live deltas) with confirmed backend state
//! (`item/*` events, snapshots). Fields are only replaced when the incoming
//! value is present and not an older prefix of what is already shown.

use threadline_core::{
    AssistantEntry, AssistantRole, CollabEntry, CommandEntry, Entry, FileChangeEntry, McpEntry, UserEntry,
    merge_attachments,
};

/// Prefix used for ids of optimistic local entries.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Whether `incoming` is a copy of `existing`: user entries by trimmed text,
/// every other kind by `(kind, id)`.
pub fn is_same_entry(existing: &Entry, incoming: &Entry) -> bool {
    match (existing, incoming) {
        (Entry::User(prev), Entry::User(next)) if prev.text.trim() == next.text.trim() => true,
        _ => existing.same_identity(incoming),
    }
}

/// Merge `incoming` into `entries`, appending when nothing matches.
///
/// User entries match any user entry with the same trimmed text; every
/// other kind matches on `(kind, id)`.
pub fn merge_entry(entries: &mut Vec<Entry>, incoming: Entry) {
    if let Entry::User(user) = &incoming {
        let text = user.text.trim();
        if let Some(Entry::User(prev)) = entries
            .iter_mut()
            .find(|e| matches!(e, Entry::User(u) if u.text.trim() == text))
        {
            *prev = merge_user(prev, user);
            return;
        }
    }

    let Some(prev) = entries.iter_mut().find(|e| e.same_identity(&incoming)) else {
        entries.push(incoming);
        return;
    };

    *prev = match (&*prev, incoming) {
        (Entry::Assistant(prev), Entry::Assistant(next)) => Entry::Assistant(merge_assistant(prev, next)),
        (Entry::Command(prev), Entry::Command(next)) => Entry::Command(merge_command(prev, next)),
        (Entry::FileChange(prev), Entry::FileChange(next)) => Entry::FileChange(merge_file_change(prev, next)),
        (Entry::Mcp(prev), Entry::Mcp(next)) => Entry::Mcp(merge_mcp(prev, next)),
        (Entry::Collab(prev), Entry::Collab(next)) => Entry::Collab(merge_collab(prev, next)),
        (_, next) => next,
    };
}

fn merge_user(prev: &UserEntry, incoming: &UserEntry) -> UserEntry {
    // The persisted id is stable; a local echo merged later must not replace it.
    let id = if incoming.id.starts_with(LOCAL_ID_PREFIX) && !prev.id.starts_with(LOCAL_ID_PREFIX) {
        prev.id.clone()
    } else {
        incoming.id.clone()
    };
    UserEntry {
        id,
        text: incoming.text.clone(),
        attachments: merge_attachments(&prev.attachments, &incoming.attachments),
    }
}

/// `prev` when `incoming` is a strict prefix of it (a stale copy), else `incoming`.
fn fresher(prev: &str, incoming: String) -> String {
    if prev.len() > incoming.len() && prev.starts_with(incoming.as_str()) {
        prev.to_string()
    } else {
        incoming
    }
}

fn merge_parts(prev: Option<&Vec<String>>, incoming: Option<Vec<String>>) -> Option<Vec<String>> {
    let Some(incoming) = incoming else {
        return prev.cloned();
    };
    let Some(prev) = prev else {
        return Some(incoming);
    };
    let len = prev.len().max(incoming.len());
    let mut incoming = incoming.into_iter();
    let merged = (0..len)
        .map(|idx| {
            let next = incoming.next().unwrap_or_default();
            fresher(prev.get(idx).map(String::as_str).unwrap_or_default(), next)
        })
        .collect();
    Some(merged)
}

fn merge_assistant(prev: &AssistantEntry, next: AssistantEntry) -> AssistantEntry {
    // Completion is sticky: a stale in-progress copy must not reopen a finished entry.
    let (streaming, completed) = if prev.completed && !next.completed {
        (false, true)
    } else {
        (next.streaming, next.completed)
    };

    let mut merged = AssistantEntry {
        id: next.id,
        role: next.role,
        text: String::new(),
        streaming,
        completed,
        hide_while_streaming: next.hide_while_streaming && streaming,
        structured_output: next.structured_output.or_else(|| prev.structured_output.clone()),
        reasoning_summary: merge_parts(prev.reasoning_summary.as_ref(), next.reasoning_summary),
        reasoning_content: merge_parts(prev.reasoning_content.as_ref(), next.reasoning_content),
    };

    match merged.role {
        AssistantRole::Reasoning => merged.rebuild_reasoning_text(),
        AssistantRole::Message => merged.text = fresher(&prev.text, next.text),
    }
    if merged.is_live() {
        merged.structured_output = None;
    }
    merged
}

fn merge_command(prev: &CommandEntry, next: CommandEntry) -> CommandEntry {
    CommandEntry {
        cwd: next.cwd.or_else(|| prev.cwd.clone()),
        output: next.output.or_else(|| prev.output.clone()),
        exit_code: next.exit_code.or(prev.exit_code),
        duration_ms: next.duration_ms.or(prev.duration_ms),
        command_actions: if next.command_actions.is_empty() {
            prev.command_actions.clone()
        } else {
            next.command_actions
        },
        approval: next.approval.or_else(|| prev.approval.clone()),
        ..next
    }
}

fn merge_file_change(prev: &FileChangeEntry, next: FileChangeEntry) -> FileChangeEntry {
    FileChangeEntry {
        changes: if next.changes.is_empty() {
            prev.changes.clone()
        } else {
            next.changes
        },
        approval: next.approval.or_else(|| prev.approval.clone()),
        ..next
    }
}

fn merge_mcp(prev: &McpEntry, next: McpEntry) -> McpEntry {
    McpEntry {
        result: next.result.or_else(|| prev.result.clone()),
        error: next.error.or_else(|| prev.error.clone()),
        duration_ms: next.duration_ms.or(prev.duration_ms),
        message: next.message.or_else(|| prev.message.clone()),
        ..next
    }
}

fn merge_collab(prev: &CollabEntry, next: CollabEntry) -> CollabEntry {
    CollabEntry {
        prompt: next.prompt.or_else(|| prev.prompt.clone()),
        agents_states: if next.agents_states.is_empty() {
            prev.agents_states.clone()
        } else {
            next.agents_states
        },
        ..next
    }
}
