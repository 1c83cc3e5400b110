//! Raw backend item → [`Entry`] normalization.
//!
//! Items arrive as loosely-typed JSON whose `type` tag and field names vary
//! between backend versions (`agentMessage`, `agent_message`, `agent-message`).
//! Tags are normalized once here; everything downstream matches on [`Entry`].

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::assistant::parse_code_review_output;
use crate::command::normalize_command_actions;
use crate::entry::{
    AssistantEntry, Attachment, CollabAgentState, CollabEntry, CollabTool, CommandEntry, Entry, FileChange,
    FileChangeEntry, McpEntry, McpError, McpResult, SystemEntry, Tone, UserEntry, WebSearchEntry,
};

/// Lowercase with `-` and `_` removed.
pub fn normalize_type_tag(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// First of `keys` holding a non-empty string.
pub fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
}

/// First of `keys` present and not null.
pub fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| value.get(*key)).find(|v| !v.is_null())
}

/// Integer field that tolerates floats with no fractional part.
pub fn int_field(value: &Value, keys: &[&str]) -> Option<i64> {
    let raw = field(value, keys)?;
    raw.as_i64()
        .or_else(|| raw.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0).map(|f| f as i64))
}

fn string_or_empty(value: &Value, keys: &[&str]) -> String {
    field(value, keys)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Reasoning parts: arrays keep every element, a bare string counts only when non-blank.
pub fn coerce_reasoning_parts(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

pub fn basename(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    match normalized.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => path.to_string(),
    }
}

/// `data:image/jpeg;base64,...` → `image.jpg`.
pub fn image_name_from_data_url(url: &str) -> String {
    let mime = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(mime, _)| mime)
        .filter(|mime| mime.starts_with("image/") && !mime.contains(';'));
    let Some(mime) = mime else {
        return "image".to_string();
    };
    let ext = mime["image/".len()..].to_lowercase().replace("jpeg", "jpg");
    let ext = ext.split('+').next().unwrap_or_default();
    if ext.is_empty() {
        "image".to_string()
    } else {
        format!("image.{ext}")
    }
}

fn user_entry(item: &Value, id: String) -> Entry {
    let inputs = item.get("content").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();

    let text = inputs
        .iter()
        .filter(|input| input.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|input| input.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    let mut seen = HashSet::new();
    let attachments = inputs
        .iter()
        .filter_map(|input| match input.get("type").and_then(Value::as_str)? {
            "skill" => Some(Attachment::Skill {
                name: input.get("name")?.as_str()?.to_string(),
            }),
            "image" => {
                let url = input.get("url")?.as_str()?;
                Some(Attachment::Image {
                    url: url.to_string(),
                    name: image_name_from_data_url(url),
                })
            }
            "localImage" => {
                let path = input.get("path")?.as_str()?;
                Some(Attachment::LocalImage {
                    path: path.to_string(),
                    name: basename(path),
                })
            }
            _ => None,
        })
        .filter(|att| seen.insert(att.dedup_key()))
        .collect();

    Entry::User(UserEntry { id, text, attachments })
}

fn agent_message_entry(item: &Value, id: String) -> Entry {
    let text = string_or_empty(item, &["text"]);
    let mut entry = AssistantEntry::message(id, text);
    entry.structured_output = parse_code_review_output(&entry.text);
    Entry::Assistant(entry)
}

fn command_entry(item: &Value, id: String) -> Entry {
    Entry::Command(CommandEntry {
        id,
        command: string_or_empty(item, &["command"]),
        status: string_or_empty(item, &["status"]),
        cwd: str_field(item, &["cwd"]).map(str::to_string),
        output: field(item, &["aggregatedOutput", "aggregated_output"])
            .and_then(Value::as_str)
            .map(str::to_string),
        exit_code: int_field(item, &["exitCode", "exit_code"]),
        duration_ms: int_field(item, &["durationMs", "duration_ms"]).and_then(|ms| u64::try_from(ms).ok()),
        command_actions: normalize_command_actions(field(item, &["commandActions", "command_actions"])),
        approval: None,
    })
}

fn file_change_entry(item: &Value, id: String) -> Entry {
    let changes = item
        .get("changes")
        .and_then(Value::as_array)
        .map(|changes| {
            changes
                .iter()
                .filter_map(|change| {
                    Some(FileChange {
                        path: change.get("path")?.as_str()?.to_string(),
                        diff: change.get("diff").and_then(Value::as_str).map(str::to_string),
                        kind: field(change, &["kind"]).cloned(),
                        line_numbers_available: field(change, &["lineNumbersAvailable", "line_numbers_available"])
                            .and_then(Value::as_bool),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Entry::FileChange(FileChangeEntry {
        id,
        status: string_or_empty(item, &["status"]),
        changes,
        approval: None,
    })
}

fn mcp_entry(item: &Value, id: String) -> Entry {
    let result = field(item, &["result"]).filter(|r| r.is_object()).map(|r| McpResult {
        content: r.get("content").and_then(Value::as_array).cloned().unwrap_or_default(),
        structured_content: field(r, &["structuredContent", "structured_content"]).cloned(),
    });
    let error = field(item, &["error"])
        .and_then(|e| str_field(e, &["message"]))
        .map(|message| McpError {
            message: message.to_string(),
        });

    Entry::Mcp(McpEntry {
        id,
        server: string_or_empty(item, &["server"]),
        tool: string_or_empty(item, &["tool"]),
        arguments: item.get("arguments").cloned().unwrap_or(Value::Null),
        message: error.as_ref().map(|e| e.message.clone()),
        result,
        error,
        duration_ms: int_field(item, &["durationMs", "duration_ms"]).and_then(|ms| u64::try_from(ms).ok()),
        status: string_or_empty(item, &["status"]),
    })
}

fn collab_entry(item: &Value, id: String) -> Entry {
    let receiver_thread_ids = field(item, &["receiverThreadIds", "receiver_thread_ids"])
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let agents_states = field(item, &["agentsStates", "agents_states"])
        .and_then(Value::as_object)
        .map(|states| {
            states
                .iter()
                .filter_map(|(thread_id, state)| {
                    let status = str_field(state, &["status"])?.to_string();
                    let message = str_field(state, &["message"]).map(str::to_string);
                    Some((thread_id.clone(), CollabAgentState { status, message }))
                })
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    Entry::Collab(CollabEntry {
        id,
        tool: CollabTool::parse(&string_or_empty(item, &["tool"])),
        status: string_or_empty(item, &["status"]),
        sender_thread_id: string_or_empty(item, &["senderThreadId", "sender_thread_id"]),
        receiver_thread_ids,
        prompt: str_field(item, &["prompt"]).map(str::to_string),
        agents_states,
    })
}

/// Convert a raw backend item into an [`Entry`].
///
/// Returns `None` for items without an id and for unknown type tags.
pub fn entry_from_item(item: &Value) -> Option<Entry> {
    let raw_type = item.get("type").and_then(Value::as_str).unwrap_or_default();
    let Some(id) = str_field(item, &["id"]).map(str::to_string) else {
        debug!(item_type = raw_type, "dropping item without id");
        return None;
    };

    let entry = match normalize_type_tag(raw_type).as_str() {
        "usermessage" => user_entry(item, id),
        "agentmessage" => agent_message_entry(item, id),
        "reasoning" => Entry::Assistant(AssistantEntry::reasoning(
            id,
            coerce_reasoning_parts(item.get("summary")),
            coerce_reasoning_parts(item.get("content")),
        )),
        "error" => Entry::System(SystemEntry {
            id,
            text: string_or_empty(item, &["message"]),
            tone: Tone::Error,
            will_retry: field(item, &["willRetry", "will_retry"]).and_then(Value::as_bool),
            additional_details: str_field(item, &["additionalDetails", "additional_details"]).map(str::to_string),
        }),
        "commandexecution" => command_entry(item, id),
        "filechange" => file_change_entry(item, id),
        "websearch" => Entry::WebSearch(WebSearchEntry {
            id,
            query: string_or_empty(item, &["query"]),
        }),
        "mcptoolcall" => mcp_entry(item, id),
        "collabagenttoolcall" => collab_entry(item, id),
        _ => {
            debug!(item_type = raw_type, item_id = %id, "dropping unknown item type");
            return None;
        }
    };
    Some(entry)
}

/// Item id without building an entry; used for routing before normalization.
pub fn item_id(item: &Value) -> Option<&str> {
    str_field(item, &["id"])
}
