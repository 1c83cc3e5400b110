//! JSON fixtures for protocol-level tests.

use serde_json::{Value, json};

/// Notification envelope for `method` with `params`.
pub fn notification(method: &str, params: Value) -> Value {
    json!({ "kind": "notification", "message": { "method": method, "params": params } })
}

/// Request envelope with a JSON-RPC id.
pub fn request(id: i64, method: &str, params: Value) -> Value {
    json!({ "kind": "request", "message": { "id": id, "method": method, "params": params } })
}

pub fn user_item(id: &str, text: &str) -> Value {
    json!({ "type": "userMessage", "id": id, "content": [{ "type": "text", "text": text }] })
}

pub fn agent_message_item(id: &str, text: &str) -> Value {
    json!({ "type": "agentMessage", "id": id, "text": text })
}

pub fn reasoning_item(id: &str, summary: &[&str], content: &[&str]) -> Value {
    json!({ "type": "reasoning", "id": id, "summary": summary, "content": content })
}

pub fn command_item(id: &str, command: &str, status: &str) -> Value {
    json!({ "type": "commandExecution", "id": id, "command": command, "status": status, "cwd": "/repo" })
}

pub fn file_change_item(id: &str, path: &str) -> Value {
    json!({ "type": "fileChange", "id": id, "status": "inProgress", "changes": [{ "path": path, "diff": "+x" }] })
}

pub fn mcp_item(id: &str, server: &str, tool: &str) -> Value {
    json!({
        "type": "mcpToolCall", "id": id, "server": server, "tool": tool,
        "arguments": {}, "status": "inProgress"
    })
}

pub fn spawn_item(id: &str, sender: &str, receivers: &[&str]) -> Value {
    json!({
        "type": "collabAgentToolCall", "id": id, "tool": "spawnAgent", "status": "completed",
        "senderThreadId": sender, "receiverThreadIds": receivers, "agentsStates": {}
    })
}

pub fn item_started(thread_id: &str, turn_id: Option<&str>, item: Value) -> Value {
    notification("item/started", item_params(thread_id, turn_id, item))
}

pub fn item_completed(thread_id: &str, turn_id: Option<&str>, item: Value) -> Value {
    notification("item/completed", item_params(thread_id, turn_id, item))
}

fn item_params(thread_id: &str, turn_id: Option<&str>, item: Value) -> Value {
    let mut params = json!({ "threadId": thread_id, "item": item });
    if let Some(turn_id) = turn_id {
        params["turnId"] = json!(turn_id);
    }
    params
}

pub fn turn_started(thread_id: &str, turn_id: &str) -> Value {
    notification("turn/started", json!({ "threadId": thread_id, "turn": { "id": turn_id } }))
}

pub fn turn_completed(thread_id: &str, turn_id: &str, status: &str) -> Value {
    notification(
        "turn/completed",
        json!({ "threadId": thread_id, "turn": { "id": turn_id, "status": status } }),
    )
}

pub fn message_delta(thread_id: &str, item_id: &str, delta: &str) -> Value {
    notification(
        "item/agentMessage/delta",
        json!({ "threadId": thread_id, "itemId": item_id, "delta": delta }),
    )
}

pub fn summary_delta(thread_id: &str, item_id: &str, index: i64, delta: &str) -> Value {
    notification(
        "item/reasoning/summaryTextDelta",
        json!({ "threadId": thread_id, "itemId": item_id, "summaryIndex": index, "delta": delta }),
    )
}

pub fn summary_part_added(thread_id: &str, item_id: &str, index: i64) -> Value {
    notification(
        "item/reasoning/summaryPartAdded",
        json!({ "threadId": thread_id, "itemId": item_id, "summaryIndex": index }),
    )
}

/// Thread snapshot `{id, turns}` from `(turn id, status, items)` triples.
pub fn snapshot(thread_id: &str, turns: Vec<(&str, &str, Vec<Value>)>) -> Value {
    let turns: Vec<Value> = turns
        .into_iter()
        .map(|(id, status, items)| json!({ "id": id, "status": status, "items": items }))
        .collect();
    json!({ "id": thread_id, "cwd": "/repo", "turns": turns })
}
