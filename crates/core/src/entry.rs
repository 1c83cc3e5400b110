use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::assistant::CodeReviewOutput;
use crate::command::CommandAction;

/// One typed unit of conversation content inside a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Entry {
    User(UserEntry),
    Assistant(AssistantEntry),
    Command(CommandEntry),
    FileChange(FileChangeEntry),
    WebSearch(WebSearchEntry),
    Mcp(McpEntry),
    Collab(CollabEntry),
    System(SystemEntry),
}

/// Discriminant of [`Entry`], used together with the id as merge identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    User,
    Assistant,
    Command,
    FileChange,
    WebSearch,
    Mcp,
    Collab,
    System,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Command => "command",
            Self::FileChange => "fileChange",
            Self::WebSearch => "webSearch",
            Self::Mcp => "mcp",
            Self::Collab => "collab",
            Self::System => "system",
        }
    }
}

impl Entry {
    pub fn id(&self) -> &str {
        match self {
            Self::User(e) => &e.id,
            Self::Assistant(e) => &e.id,
            Self::Command(e) => &e.id,
            Self::FileChange(e) => &e.id,
            Self::WebSearch(e) => &e.id,
            Self::Mcp(e) => &e.id,
            Self::Collab(e) => &e.id,
            Self::System(e) => &e.id,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Self::User(_) => EntryKind::User,
            Self::Assistant(_) => EntryKind::Assistant,
            Self::Command(_) => EntryKind::Command,
            Self::FileChange(_) => EntryKind::FileChange,
            Self::WebSearch(_) => EntryKind::WebSearch,
            Self::Mcp(_) => EntryKind::Mcp,
            Self::Collab(_) => EntryKind::Collab,
            Self::System(_) => EntryKind::System,
        }
    }

    /// Same `(kind, id)` pair. User text matching is handled by the merger.
    pub fn same_identity(&self, other: &Entry) -> bool {
        self.kind() == other.kind() && self.id() == other.id()
    }

    /// Entries that render as an expandable detail card.
    pub fn is_collapsible(&self) -> bool {
        matches!(
            self,
            Self::Command(_) | Self::FileChange(_) | Self::WebSearch(_) | Self::Mcp(_) | Self::Collab(_)
        )
    }

    /// Tool activity shown in the "working" area of a turn.
    pub fn is_activity(&self) -> bool {
        self.is_collapsible()
    }

    pub fn as_assistant(&self) -> Option<&AssistantEntry> {
        match self {
            Self::Assistant(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_command(&self) -> Option<&CommandEntry> {
        match self {
            Self::Command(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_reasoning(&self) -> bool {
        matches!(self, Self::Assistant(e) if e.role == AssistantRole::Reasoning)
    }

    pub fn is_assistant_message(&self) -> bool {
        matches!(self, Self::Assistant(e) if e.role == AssistantRole::Message)
    }

    pub fn approval(&self) -> Option<&Approval> {
        match self {
            Self::Command(e) => e.approval.as_ref(),
            Self::FileChange(e) => e.approval.as_ref(),
            _ => None,
        }
    }
}

// ── User ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Attachment {
    File { path: String, name: String },
    Skill { name: String },
    Prompt { name: String },
    Image { url: String, name: String },
    LocalImage { path: String, name: String },
}

impl Attachment {
    /// Composite `type:key` used to deduplicate attachment lists.
    pub fn dedup_key(&self) -> String {
        match self {
            Self::File { path, .. } => format!("file:{path}"),
            Self::Skill { name } => format!("skill:{name}"),
            Self::Prompt { name } => format!("prompt:{name}"),
            Self::Image { url, .. } => image_url_dedup_key(url),
            Self::LocalImage { path, .. } => format!("localImage:{path}"),
        }
    }
}

// Data urls can be megabytes long; key on length plus both ends instead.
fn image_url_dedup_key(url: &str) -> String {
    let chars: Vec<char> = url.chars().collect();
    let head: String = chars.iter().take(24).collect();
    let tail: String = chars[chars.len().saturating_sub(24)..].iter().collect();
    format!("image:{}:{head}:{tail}", url.len())
}

/// Union of two attachment lists, first occurrence wins.
pub fn merge_attachments(prev: &[Attachment], incoming: &[Attachment]) -> Vec<Attachment> {
    let mut seen = std::collections::HashSet::new();
    prev.iter()
        .chain(incoming)
        .filter(|att| seen.insert(att.dedup_key()))
        .cloned()
        .collect()
}

// ── Assistant ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssistantRole {
    Message,
    Reasoning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantEntry {
    pub id: String,
    pub role: AssistantRole,
    pub text: String,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub completed: bool,
    /// Partial JSON or fenced output is hidden until the message completes.
    #[serde(default)]
    pub hide_while_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<CodeReviewOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_summary: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<Vec<String>>,
}

impl AssistantEntry {
    pub fn message(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: AssistantRole::Message,
            text: text.into(),
            streaming: false,
            completed: true,
            hide_while_streaming: false,
            structured_output: None,
            reasoning_summary: None,
            reasoning_content: None,
        }
    }

    pub fn reasoning(id: impl Into<String>, summary: Vec<String>, content: Vec<String>) -> Self {
        let text = reasoning_text(&summary, &content);
        Self {
            id: id.into(),
            role: AssistantRole::Reasoning,
            text,
            streaming: false,
            completed: false,
            hide_while_streaming: false,
            structured_output: None,
            reasoning_summary: Some(summary),
            reasoning_content: Some(content),
        }
    }

    pub fn summary_parts(&self) -> &[String] {
        self.reasoning_summary.as_deref().unwrap_or_default()
    }

    pub fn content_parts(&self) -> &[String] {
        self.reasoning_content.as_deref().unwrap_or_default()
    }

    /// Recompute `text` from the reasoning buffers.
    pub fn rebuild_reasoning_text(&mut self) {
        self.text = reasoning_text(self.summary_parts(), self.content_parts());
    }

    pub fn is_live(&self) -> bool {
        self.streaming && !self.completed
    }
}

/// Flattened reasoning text: non-empty summary parts, then non-empty content parts.
pub fn reasoning_text(summary: &[String], content: &[String]) -> String {
    summary
        .iter()
        .chain(content)
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Tool activity ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Integer(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(id) => write!(f, "{id}"),
            Self::String(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalDecision {
    Accept,
    Decline,
}

impl ApprovalDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<ApprovalDecision>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEntry {
    pub id: String,
    pub command: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command_actions: Vec<CommandAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_numbers_available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeEntry {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub changes: Vec<FileChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchEntry {
    pub id: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpResult {
    #[serde(default)]
    pub content: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpEntry {
    pub id: String,
    pub server: String,
    pub tool: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<McpResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub status: String,
    /// Latest progress message, or the error message once failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ── Collaboration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollabTool {
    SpawnAgent,
    SendInput,
    Wait,
    CloseAgent,
    #[serde(untagged)]
    Other(String),
}

impl CollabTool {
    pub fn parse(raw: &str) -> Self {
        match crate::item::normalize_type_tag(raw).as_str() {
            "spawnagent" => Self::SpawnAgent,
            "sendinput" => Self::SendInput,
            "wait" => Self::Wait,
            "closeagent" => Self::CloseAgent,
            _ => Self::Other(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollabAgentState {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollabEntry {
    pub id: String,
    pub tool: CollabTool,
    pub status: String,
    pub sender_thread_id: String,
    #[serde(default)]
    pub receiver_thread_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub agents_states: BTreeMap<String, CollabAgentState>,
}

// ── System ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Tone {
    #[default]
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEntry {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub will_retry: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_details: Option<String>,
}

impl SystemEntry {
    pub fn error(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            tone: Tone::Error,
            will_retry: None,
            additional_details: None,
        }
    }
}
