//! Inbound protocol envelopes from the agent backend.
//!
//! Each line of a recorded session (or each message on the live channel) is a
//! JSON envelope `{kind, message}`. [`RawEnvelope::decode`] turns the
//! JSON-RPC payload into a typed [`ProtocolEvent`]; methods the timeline does
//! not consume decode to `None`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::entry::{ApprovalDecision, RequestId};
use crate::item::{field, int_field, str_field};
use crate::turn::TurnStatus;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope is missing `kind`")]
    MissingKind,
    #[error("envelope `message` must be an object for kind {kind}")]
    InvalidMessage { kind: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeKind {
    Notification,
    Request,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEnvelope {
    pub kind: EnvelopeKind,
    #[serde(default)]
    pub message: Value,
}

/// Which reasoning buffer a delta targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReasoningTarget {
    Summary,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ApprovalKind {
    CommandExecution,
    FileChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub total_tokens: u64,
    pub context_window: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    TurnStarted {
        turn_id: String,
    },
    TurnCompleted {
        turn_id: String,
        status: TurnStatus,
    },
    ItemStarted {
        item: Value,
        turn_id: Option<String>,
    },
    ItemCompleted {
        item: Value,
        turn_id: Option<String>,
    },
    AgentMessageDelta {
        item_id: String,
        delta: String,
        turn_id: Option<String>,
    },
    /// `index` is `None` when missing or not an integer; the accumulator ignores those.
    ReasoningDelta {
        item_id: String,
        delta: String,
        index: Option<i64>,
        target: ReasoningTarget,
        turn_id: Option<String>,
    },
    ReasoningPartAdded {
        item_id: String,
        index: Option<i64>,
        target: ReasoningTarget,
        turn_id: Option<String>,
    },
    McpProgress {
        item_id: String,
        message: String,
    },
    TokenUsage(TokenUsage),
    Error {
        message: String,
        will_retry: Option<bool>,
        additional_details: Option<String>,
    },
    ApprovalRequest {
        request_id: RequestId,
        kind: ApprovalKind,
        item_id: String,
        reason: Option<String>,
        turn_id: Option<String>,
    },
}

impl ProtocolEvent {
    /// Item id the event refers to, if any.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::ItemStarted { item, .. } | Self::ItemCompleted { item, .. } => crate::item::item_id(item),
            Self::AgentMessageDelta { item_id, .. }
            | Self::ReasoningDelta { item_id, .. }
            | Self::ReasoningPartAdded { item_id, .. }
            | Self::McpProgress { item_id, .. }
            | Self::ApprovalRequest { item_id, .. } => Some(item_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub thread_id: Option<String>,
    pub event: ProtocolEvent,
}

/// Correlated reply to an approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub id: RequestId,
    pub result: ApprovalResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResult {
    pub decision: ApprovalDecision,
}

/// Parse one envelope line.
pub fn parse_envelope_line(line: &str) -> Result<RawEnvelope, ProtocolError> {
    let value: Value = serde_json::from_str(line.trim())?;
    if value.get("kind").is_none() {
        return Err(ProtocolError::MissingKind);
    }
    let envelope: RawEnvelope = serde_json::from_value(value)?;
    if envelope.kind != EnvelopeKind::Stderr && !envelope.message.is_object() {
        return Err(ProtocolError::InvalidMessage {
            kind: format!("{:?}", envelope.kind).to_lowercase(),
        });
    }
    Ok(envelope)
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn turn_id_of(params: &Value) -> Option<String> {
    owned(str_field(params, &["turnId", "turn_id"]).or_else(|| {
        params
            .get("turn")
            .and_then(|turn| str_field(turn, &["id"]))
    }))
}

fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn request_id(value: &Value) -> Option<RequestId> {
    match value {
        Value::Number(n) => n.as_i64().map(RequestId::Integer),
        Value::String(s) if !s.is_empty() => Some(RequestId::String(s.clone())),
        _ => None,
    }
}

impl RawEnvelope {
    pub fn method(&self) -> Option<&str> {
        str_field(&self.message, &["method"])
    }

    /// Decode into a typed event. Diagnostics, unknown methods and malformed
    /// payloads yield `None`.
    pub fn decode(&self) -> Option<InboundEvent> {
        let method = self.method().unwrap_or_default();
        let params = self.message.get("params").unwrap_or(&Value::Null);
        let thread_id = owned(str_field(params, &["threadId", "thread_id"]));

        let event = match self.kind {
            EnvelopeKind::Stderr => return None,
            EnvelopeKind::Notification => decode_notification(method, params),
            EnvelopeKind::Request => decode_request(method, params, self.message.get("id")),
        };
        if event.is_none() {
            debug!(method, kind = ?self.kind, "ignoring envelope");
        }
        Some(InboundEvent {
            thread_id,
            event: event?,
        })
    }
}

fn reasoning_index(params: &Value, target: ReasoningTarget) -> Option<i64> {
    match target {
        ReasoningTarget::Summary => int_field(params, &["summaryIndex", "summary_index", "index"]),
        ReasoningTarget::Content => int_field(params, &["contentIndex", "content_index", "index"]),
    }
}

fn decode_notification(method: &str, params: &Value) -> Option<ProtocolEvent> {
    let item_id = || owned(str_field(params, &["itemId", "item_id"]));
    let delta = || owned(str_field(params, &["delta"]));

    let event = match method {
        "turn/started" => ProtocolEvent::TurnStarted {
            turn_id: turn_id_of(params)?,
        },
        "turn/completed" => {
            let status = params
                .get("turn")
                .and_then(|turn| turn.get("status"))
                .and_then(Value::as_str)
                .unwrap_or("completed");
            ProtocolEvent::TurnCompleted {
                turn_id: turn_id_of(params)?,
                status: TurnStatus::parse(Some(status)),
            }
        }
        "item/started" | "item/completed" => {
            let item = params.get("item").filter(|item| item.is_object())?.clone();
            let turn_id = turn_id_of(params);
            if method == "item/started" {
                ProtocolEvent::ItemStarted { item, turn_id }
            } else {
                ProtocolEvent::ItemCompleted { item, turn_id }
            }
        }
        "item/agentMessage/delta" => ProtocolEvent::AgentMessageDelta {
            item_id: item_id()?,
            delta: delta()?,
            turn_id: turn_id_of(params),
        },
        "item/reasoning/summaryTextDelta" | "item/reasoning/textDelta" => {
            let target = if method.ends_with("summaryTextDelta") {
                ReasoningTarget::Summary
            } else {
                ReasoningTarget::Content
            };
            ProtocolEvent::ReasoningDelta {
                item_id: item_id()?,
                delta: delta()?,
                index: reasoning_index(params, target),
                target,
                turn_id: turn_id_of(params),
            }
        }
        "item/reasoning/summaryPartAdded" | "item/reasoning/contentPartAdded" => {
            let target = if method.ends_with("summaryPartAdded") {
                ReasoningTarget::Summary
            } else {
                ReasoningTarget::Content
            };
            ProtocolEvent::ReasoningPartAdded {
                item_id: item_id()?,
                index: reasoning_index(params, target),
                target,
                turn_id: turn_id_of(params),
            }
        }
        "item/mcpToolCall/progress" => ProtocolEvent::McpProgress {
            item_id: item_id()?,
            message: owned(str_field(params, &["message"]))?,
        },
        "thread/tokenUsage/updated" => {
            let usage = field(params, &["tokenUsage", "token_usage"])?;
            let total = usage.get("total").and_then(|t| field(t, &["totalTokens", "total_tokens"]));
            let Some(total_tokens) = total.and_then(as_count) else {
                debug!("ignoring token usage without a numeric total");
                return None;
            };
            ProtocolEvent::TokenUsage(TokenUsage {
                total_tokens,
                context_window: field(usage, &["modelContextWindow", "model_context_window"]).and_then(as_count),
            })
        }
        "error" => {
            let error = params.get("error")?;
            ProtocolEvent::Error {
                message: owned(str_field(error, &["message"]))?,
                will_retry: field(error, &["willRetry", "will_retry"]).and_then(Value::as_bool),
                additional_details: owned(
                    field(error, &["additionalDetails", "additional_details"]).and_then(Value::as_str),
                ),
            }
        }
        _ => return None,
    };
    Some(event)
}

fn decode_request(method: &str, params: &Value, id: Option<&Value>) -> Option<ProtocolEvent> {
    let kind = match method {
        "item/commandExecution/requestApproval" => ApprovalKind::CommandExecution,
        "item/fileChange/requestApproval" => ApprovalKind::FileChange,
        _ => return None,
    };
    let reason = match params.get("reason") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };
    Some(ProtocolEvent::ApprovalRequest {
        request_id: request_id(id?)?,
        kind,
        item_id: owned(str_field(params, &["itemId", "item_id"]))?,
        reason,
        turn_id: owned(str_field(params, &["turnId", "turn_id"])),
    })
}
