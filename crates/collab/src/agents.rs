//! Per-thread agent status and auto-focus selection.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::graph::CollabGraph;
use crate::index::CollabIndex;

pub const RUNNING_STATUS: &str = "running";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Sequence of the collab call that reported this state.
    pub seq: u64,
}

impl AgentState {
    pub fn is_running(&self) -> bool {
        self.status == RUNNING_STATUS
    }
}

/// Latest reported state for every thread named in any `agentsStates` map.
pub fn agent_states(index: &CollabIndex) -> BTreeMap<String, AgentState> {
    let mut out: BTreeMap<String, AgentState> = BTreeMap::new();
    for (_, entry, seq) in index.items() {
        for (thread_id, state) in &entry.agents_states {
            if out.get(thread_id).is_some_and(|prev| prev.seq >= seq) {
                continue;
            }
            out.insert(
                thread_id.clone(),
                AgentState {
                    status: state.status.clone(),
                    message: state.message.clone(),
                    seq,
                },
            );
        }
    }
    out
}

/// Thread to bring into focus: a running worker (newest report first), then
/// the orchestrator if running, then any running agent, then any thread with
/// a running turn. Never `selected` or `last_focused`.
pub fn auto_focus_candidate(
    states: &BTreeMap<String, AgentState>,
    graph: &CollabGraph,
    running_threads: impl IntoIterator<Item = impl AsRef<str>>,
    selected: Option<&str>,
    last_focused: Option<&str>,
) -> Option<String> {
    let mut running: Vec<(&String, &AgentState)> = states.iter().filter(|(_, st)| st.is_running()).collect();
    running.sort_by(|a, b| b.1.seq.cmp(&a.1.seq).then_with(|| a.0.cmp(b.0)));
    let running: Vec<&str> = running.into_iter().map(|(id, _)| id.as_str()).collect();

    let candidate = running
        .iter()
        .find(|id| graph.workers.iter().any(|w| w == **id))
        .map(|id| id.to_string())
        .or_else(|| graph.orchestrator.clone().filter(|o| running.contains(&o.as_str())))
        .or_else(|| running.first().map(|id| id.to_string()))
        .or_else(|| {
            running_threads
                .into_iter()
                .next()
                .map(|id| id.as_ref().to_string())
        })?;

    if Some(candidate.as_str()) == selected || Some(candidate.as_str()) == last_focused {
        return None;
    }
    Some(candidate)
}

/// Remembers the last auto-focused thread so the same thread is not
/// re-focused on every update.
#[derive(Debug, Clone, Default)]
pub struct AutoFocus {
    last_focused: Option<String>,
}

impl AutoFocus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_focused(&self) -> Option<&str> {
        self.last_focused.as_deref()
    }

    /// Next thread to focus, if any; recorded as the last focused thread.
    pub fn next(&mut self, index: &CollabIndex, graph: &CollabGraph, selected: Option<&str>) -> Option<String> {
        let states = agent_states(index);
        let candidate = auto_focus_candidate(
            &states,
            graph,
            index.running_threads(),
            selected,
            self.last_focused.as_deref(),
        )?;
        self.last_focused = Some(candidate.clone());
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spawn_with_states(id: &str, sender: &str, receivers: &[&str], states: serde_json::Value) -> serde_json::Value {
        json!({
            "type": "collabAgentToolCall", "id": id, "tool": "spawnAgent", "status": "completed",
            "senderThreadId": sender, "receiverThreadIds": receivers, "agentsStates": states
        })
    }

    #[test]
    fn latest_state_wins() {
        let mut index = CollabIndex::new();
        index.ingest_item("root", &spawn_with_states("s1", "root", &["w"], json!({ "w": { "status": "running" } })));
        index.ingest_item(
            "root",
            &spawn_with_states("s2", "root", &[], json!({ "w": { "status": "completed", "message": "done" } })),
        );
        let states = agent_states(&index);
        assert_eq!(states["w"].status, "completed");
        assert_eq!(states["w"].message.as_deref(), Some("done"));
        assert_eq!(states["w"].seq, 1);
    }

    #[test]
    fn prefers_running_worker_then_skips_repeats() {
        let mut index = CollabIndex::new();
        index.ingest_item("root", &spawn_with_states("s1", "root", &["orch"], json!({ "orch": { "status": "running" } })));
        index.ingest_item(
            "orch",
            &spawn_with_states("s2", "orch", &["w1"], json!({ "w1": { "status": "running" } })),
        );
        let graph = CollabGraph::from_index(&index, Some("root"), None);
        assert_eq!(graph.workers, ["w1"]);

        let mut focus = AutoFocus::new();
        assert_eq!(focus.next(&index, &graph, Some("root")).as_deref(), Some("w1"));
        assert_eq!(focus.next(&index, &graph, Some("root")), None);
        assert_eq!(focus.last_focused(), Some("w1"));
    }

    #[test]
    fn falls_back_to_running_turns() {
        let mut index = CollabIndex::new();
        index.set_running("solo", true);
        let graph = CollabGraph::from_index(&index, None, None);
        let states = agent_states(&index);
        assert_eq!(
            auto_focus_candidate(&states, &graph, index.running_threads(), None, None).as_deref(),
            Some("solo")
        );
        assert_eq!(auto_focus_candidate(&states, &graph, index.running_threads(), Some("solo"), None), None);
    }
}
