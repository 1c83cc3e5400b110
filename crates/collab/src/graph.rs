//! Collaboration Graph Builder: spawn/fork edges and derived thread roles.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use threadline_core::CollabTool;

use crate::index::CollabIndex;

/// Sequence given to fork edges, which sort after every spawn.
pub const FORK_SEQ: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    Spawn,
    Fork,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub seq: u64,
    /// Position among the receivers of one spawn call.
    #[serde(skip)]
    pub slot: usize,
    pub kind: EdgeKind,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ThreadRole {
    Root,
    Orchestrator,
    Worker,
    Thread,
}

impl ThreadRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Orchestrator => "orchestrator",
            Self::Worker => "worker",
            Self::Thread => "thread",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildLink {
    pub thread_id: String,
    pub kind: EdgeKind,
    pub seq: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollabGraph {
    pub edges: Vec<Edge>,
    pub root_candidates: Vec<String>,
    pub root: Option<String>,
    pub orchestrator: Option<String>,
    pub workers: Vec<String>,
    /// Spawn children before fork children, then by sequence.
    pub children_by_parent: BTreeMap<String, Vec<ChildLink>>,
}

/// Spawn edges from every indexed `spawnAgent` call plus recorded forks.
pub fn collect_edges(index: &CollabIndex) -> Vec<Edge> {
    let mut edges = Vec::new();
    for (_, entry, seq) in index.items() {
        if entry.tool != CollabTool::SpawnAgent || entry.sender_thread_id.is_empty() {
            continue;
        }
        for (slot, to) in entry.receiver_thread_ids.iter().enumerate() {
            if to.is_empty() {
                continue;
            }
            edges.push(Edge {
                seq,
                slot,
                kind: EdgeKind::Spawn,
                from: entry.sender_thread_id.clone(),
                to: to.clone(),
            });
        }
    }
    for (child, parent) in index.fork_parents() {
        edges.push(Edge {
            seq: FORK_SEQ,
            slot: 0,
            kind: EdgeKind::Fork,
            from: parent.clone(),
            to: child.clone(),
        });
    }
    edges
}

fn spawns_from<'a>(edges: &'a [Edge], parent: Option<&'a str>) -> impl Iterator<Item = &'a Edge> {
    edges
        .iter()
        .filter(move |e| e.kind == EdgeKind::Spawn && Some(e.from.as_str()) == parent)
}

impl CollabGraph {
    pub fn from_index(index: &CollabIndex, current: Option<&str>, pinned_root: Option<&str>) -> Self {
        Self::build(collect_edges(index), current, pinned_root)
    }

    /// Derive roles from `edges`. The result depends only on the edge set,
    /// not on the order edges are supplied in.
    ///
    /// Root: `pinned_root`, else `current` unless it has an incoming edge,
    /// else the lexically smallest thread without incoming edges. A current
    /// thread with no edges at all is its own root.
    pub fn build(mut edges: Vec<Edge>, current: Option<&str>, pinned_root: Option<&str>) -> Self {
        edges.sort();
        edges.dedup();

        let mut threads = BTreeSet::new();
        let mut has_incoming = BTreeSet::new();
        for edge in &edges {
            threads.insert(edge.from.as_str());
            threads.insert(edge.to.as_str());
            has_incoming.insert(edge.to.as_str());
        }
        let root_candidates: Vec<String> = threads
            .difference(&has_incoming)
            .map(|t| t.to_string())
            .collect();

        let root = pinned_root
            .or_else(|| current.filter(|c| !has_incoming.contains(c)))
            .or_else(|| root_candidates.first().map(String::as_str))
            .map(str::to_string);

        let orchestrator = spawns_from(&edges, root.as_deref()).next().map(|e| e.to.clone());
        let mut workers: Vec<String> = Vec::new();
        for edge in spawns_from(&edges, orchestrator.as_deref()) {
            if !workers.contains(&edge.to) {
                workers.push(edge.to.clone());
            }
        }

        let mut children_by_parent: BTreeMap<String, Vec<ChildLink>> = BTreeMap::new();
        let mut by_kind = edges.clone();
        by_kind.sort_by(|a, b| (a.kind, a.seq, a.slot, &a.to).cmp(&(b.kind, b.seq, b.slot, &b.to)));
        for edge in by_kind {
            children_by_parent.entry(edge.from).or_default().push(ChildLink {
                thread_id: edge.to,
                kind: edge.kind,
                seq: edge.seq,
            });
        }

        Self {
            edges,
            root_candidates,
            root,
            orchestrator,
            workers,
            children_by_parent,
        }
    }

    pub fn role(&self, thread_id: &str) -> ThreadRole {
        if self.root.as_deref() == Some(thread_id) {
            ThreadRole::Root
        } else if self.orchestrator.as_deref() == Some(thread_id) {
            ThreadRole::Orchestrator
        } else if self.workers.iter().any(|w| w == thread_id) {
            ThreadRole::Worker
        } else {
            ThreadRole::Thread
        }
    }

    pub fn has_spawn_edges(&self) -> bool {
        self.edges.iter().any(|e| e.kind == EdgeKind::Spawn)
    }

    pub fn children(&self, thread_id: &str) -> &[ChildLink] {
        self.children_by_parent.get(thread_id).map(Vec::as_slice).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn(from: &str, to: &str, seq: u64) -> Edge {
        Edge {
            seq,
            slot: 0,
            kind: EdgeKind::Spawn,
            from: from.into(),
            to: to.into(),
        }
    }

    fn fork(parent: &str, child: &str) -> Edge {
        Edge {
            seq: FORK_SEQ,
            slot: 0,
            kind: EdgeKind::Fork,
            from: parent.into(),
            to: child.into(),
        }
    }

    #[test]
    fn roles_follow_lowest_sequence_spawns() {
        let graph = CollabGraph::build(
            vec![
                spawn("root", "orch", 0),
                spawn("root", "late", 5),
                spawn("orch", "w2", 2),
                spawn("orch", "w1", 1),
                spawn("orch", "w1", 3),
            ],
            None,
            None,
        );
        assert_eq!(graph.root.as_deref(), Some("root"));
        assert_eq!(graph.orchestrator.as_deref(), Some("orch"));
        assert_eq!(graph.workers, ["w1", "w2"]);
        assert_eq!(graph.role("w2"), ThreadRole::Worker);
        assert_eq!(graph.role("late"), ThreadRole::Thread);
    }

    #[test]
    fn current_thread_wins_only_without_incoming_edges() {
        let edges = vec![spawn("b", "c", 0), spawn("a", "d", 1)];
        let graph = CollabGraph::build(edges.clone(), Some("b"), None);
        assert_eq!(graph.root.as_deref(), Some("b"));

        let graph = CollabGraph::build(edges.clone(), Some("c"), None);
        assert_eq!(graph.root.as_deref(), Some("a"));

        let graph = CollabGraph::build(edges, Some("c"), Some("c"));
        assert_eq!(graph.root.as_deref(), Some("c"));
        assert_eq!(graph.orchestrator, None);
    }

    #[test]
    fn current_thread_without_edges_is_its_own_root() {
        let graph = CollabGraph::build(vec![spawn("a", "b", 0)], Some("solo"), None);
        assert_eq!(graph.root.as_deref(), Some("solo"));
        assert_eq!(graph.orchestrator, None);
        assert!(graph.workers.is_empty());
    }

    #[test]
    fn children_list_spawns_before_forks() {
        let graph = CollabGraph::build(vec![fork("p", "f1"), spawn("p", "s2", 4), spawn("p", "s1", 1)], None, None);
        let kids: Vec<&str> = graph.children("p").iter().map(|c| c.thread_id.as_str()).collect();
        assert_eq!(kids, ["s1", "s2", "f1"]);
        assert!(graph.has_spawn_edges());
        assert!(graph.children("nobody").is_empty());
    }
}
