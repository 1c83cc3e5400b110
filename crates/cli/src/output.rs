//! Plain-text rendering of turn views.

use std::fmt::Write;

use threadline_core::assistant::extract_heading;
use threadline_core::command::{command_summary, normalize_command_output, resolve_parsed_command};
use threadline_core::mcp::{args_preview, content_to_text};
use threadline_core::{AssistantEntry, CommandEntry, Entry, Tone, UserEntry};
use threadline_timeline::segment::exploration_counts;
use threadline_timeline::{CollapseState, ExplorationStatus, SegmentedItem, TurnView, WorkingItem};

/// Output format for timeline data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

const INDENT: &str = "  ";

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

fn is_finished(status: &str) -> bool {
    !matches!(status, "inProgress" | "in_progress" | "running" | "pending" | "")
}

fn command_line(cmd: &CommandEntry) -> String {
    let parsed = resolve_parsed_command(&cmd.command, &cmd.command_actions);
    let (verb, content) = command_summary(&parsed, is_finished(&cmd.status), Some(&cmd.command));
    let mut line = format!("{verb} {content}");
    match cmd.exit_code {
        Some(code) => {
            let _ = write!(line, " ({}, exit {code})", cmd.status);
        }
        None => {
            let _ = write!(line, " ({})", cmd.status);
        }
    }
    if let Some(approval) = &cmd.approval {
        match approval.decision {
            Some(decision) => {
                let _ = write!(line, " [approval {}]", decision.as_str());
            }
            None => line.push_str(" [awaiting approval]"),
        }
    }
    line
}

fn user_line(user: &UserEntry) -> String {
    let mut line = format!("user: {}", user.text);
    match user.attachments.len() {
        0 => {}
        1 => line.push_str(" (+1 attachment)"),
        n => {
            let _ = write!(line, " (+{n} attachments)");
        }
    }
    line
}

fn reasoning_line(entry: &AssistantEntry) -> String {
    let (heading, body) = extract_heading(&entry.text);
    let title = heading.unwrap_or_else(|| first_line(&body).to_string());
    let marker = if entry.streaming { "..." } else { "" };
    format!("thinking: {title}{marker}")
}

fn push_line(out: &mut String, depth: usize, line: &str) {
    out.push_str(&INDENT.repeat(depth));
    out.push_str(line);
    out.push('\n');
}

fn push_details(out: &mut String, depth: usize, body: &str) {
    for line in body.lines() {
        push_line(out, depth, line);
    }
}

fn render_entry(out: &mut String, depth: usize, entry: &Entry, collapse: &CollapseState) {
    let expanded = collapse.is_collapsed(entry.id()) == Some(false);
    match entry {
        Entry::User(user) => push_line(out, depth, &user_line(user)),
        Entry::Assistant(message) if entry.is_reasoning() => push_line(out, depth, &reasoning_line(message)),
        Entry::Assistant(message) => push_line(out, depth, &format!("note: {}", first_line(&message.text))),
        Entry::Command(cmd) => {
            push_line(out, depth, &format!("* {}", command_line(cmd)));
            if expanded {
                push_details(out, depth + 2, &normalize_command_output(cmd.output.as_deref()));
            }
        }
        Entry::FileChange(change) => {
            let paths: Vec<&str> = change.changes.iter().map(|c| c.path.as_str()).collect();
            let noun = if paths.len() == 1 { "file" } else { "files" };
            push_line(
                out,
                depth,
                &format!("* Edited {} {noun}: {} ({})", paths.len(), paths.join(", "), change.status),
            );
        }
        Entry::WebSearch(search) => push_line(out, depth, &format!("* Searched the web for {}", search.query)),
        Entry::Mcp(call) => {
            let mut line = format!("* {}.{}({}) ({})", call.server, call.tool, args_preview(&call.arguments), call.status);
            if let Some(message) = &call.message {
                let _ = write!(line, " {message}");
            }
            push_line(out, depth, &line);
            if expanded && let Some(result) = &call.result {
                push_details(out, depth + 2, &content_to_text(&result.content));
            }
        }
        Entry::Collab(collab) => {
            let tool = serde_json::to_value(&collab.tool)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            push_line(
                out,
                depth,
                &format!(
                    "* {tool} {} -> {} ({})",
                    collab.sender_thread_id,
                    collab.receiver_thread_ids.join(", "),
                    collab.status
                ),
            );
        }
        Entry::System(system) => {
            let tag = match system.tone {
                Tone::Info => "info",
                Tone::Warning => "warning",
                Tone::Error => "error",
            };
            push_line(out, depth, &format!("! {tag}: {}", system.text));
        }
    }
}

fn render_working_item(out: &mut String, depth: usize, item: &WorkingItem, collapse: &CollapseState) {
    match item {
        WorkingItem::ReadingGroup { entries, .. } => {
            let names: Vec<String> = entries
                .iter()
                .map(|cmd| {
                    let parsed = resolve_parsed_command(&cmd.command, &cmd.command_actions);
                    parsed.name.unwrap_or(parsed.cmd)
                })
                .collect();
            push_line(out, depth, &format!("* Read {}", names.join(", ")));
        }
        WorkingItem::ReasoningGroup { entries, .. } => {
            push_line(out, depth, &format!("thinking ({} steps)", entries.len()));
            for entry in entries {
                push_line(out, depth + 1, &reasoning_line(entry));
            }
        }
        WorkingItem::Entry(entry) => render_entry(out, depth, entry, collapse),
    }
}

/// Render turn views as indented text.
pub fn render_turn_views(views: &[TurnView], collapse: &CollapseState) -> String {
    let mut out = String::new();
    for view in views {
        push_line(&mut out, 0, &format!("turn {} [{}]", view.id, view.status.as_str()));
        for user in &view.user_entries {
            push_line(&mut out, 1, &user_line(user));
        }
        for item in &view.working_items {
            match item {
                SegmentedItem::Exploration(span) => {
                    let verb = match span.status {
                        ExplorationStatus::Exploring => "Exploring",
                        ExplorationStatus::Explored => "Explored",
                    };
                    push_line(&mut out, 1, &format!("{verb} {}", exploration_counts(&span.items)));
                    for inner in &span.items {
                        render_working_item(&mut out, 2, inner, collapse);
                    }
                }
                SegmentedItem::Item { item } => render_working_item(&mut out, 1, item, collapse),
            }
        }
        if let Some(reply) = &view.reply {
            let text = if reply.hide_while_streaming && reply.streaming {
                "(streaming structured output)"
            } else {
                reply.text.trim()
            };
            push_line(&mut out, 1, &format!("reply: {text}"));
            if let Some(review) = &reply.structured_output {
                for finding in &review.findings {
                    push_line(&mut out, 2, &format!("- {}", finding.title));
                }
            }
        }
    }
    out
}
