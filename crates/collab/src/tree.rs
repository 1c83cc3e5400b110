//! Sidebar session tree rooted at the graph root.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::graph::{CollabGraph, EdgeKind, ThreadRole};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNode {
    pub thread_id: String,
    pub role: ThreadRole,
    /// How this node was reached from its parent; `None` for the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<EdgeKind>,
    pub running: bool,
    pub children: Vec<SessionNode>,
}

impl SessionNode {
    /// Nodes in the subtree, this one included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(SessionNode::size).sum::<usize>()
    }

    /// Indented `role thread-id` lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(self.role.as_str());
        out.push(' ');
        out.push_str(&self.thread_id);
        if self.via == Some(EdgeKind::Fork) {
            out.push_str(" (fork)");
        }
        if self.running {
            out.push_str(" [running]");
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}

/// Tree from the graph root along the children-by-parent adjacency. A thread
/// already on the tree is not expanded again, which cuts cycles.
pub fn session_tree(graph: &CollabGraph, running: &BTreeSet<String>) -> Option<SessionNode> {
    let root = graph.root.as_deref()?;
    let mut visited = BTreeSet::new();
    visited.insert(root.to_string());
    Some(build_node(graph, running, root, None, &mut visited))
}

fn build_node(
    graph: &CollabGraph,
    running: &BTreeSet<String>,
    thread_id: &str,
    via: Option<EdgeKind>,
    visited: &mut BTreeSet<String>,
) -> SessionNode {
    let mut children = Vec::new();
    for link in graph.children(thread_id) {
        if !visited.insert(link.thread_id.clone()) {
            continue;
        }
        children.push(build_node(graph, running, &link.thread_id, Some(link.kind), visited));
    }
    SessionNode {
        thread_id: thread_id.to_string(),
        role: graph.role(thread_id),
        via,
        running: running.contains(thread_id),
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, FORK_SEQ};

    fn edge(kind: EdgeKind, from: &str, to: &str, seq: u64) -> Edge {
        Edge {
            seq,
            slot: 0,
            kind,
            from: from.into(),
            to: to.into(),
        }
    }

    #[test]
    fn tree_follows_roles_and_cuts_cycles() {
        let graph = CollabGraph::build(
            vec![
                edge(EdgeKind::Spawn, "root", "orch", 0),
                edge(EdgeKind::Spawn, "orch", "w1", 1),
                edge(EdgeKind::Spawn, "w1", "orch", 2),
                edge(EdgeKind::Fork, "root", "alt", FORK_SEQ),
            ],
            Some("root"),
            None,
        );
        let running = BTreeSet::from(["w1".to_string()]);
        let tree = session_tree(&graph, &running).unwrap();

        assert_eq!(tree.size(), 4);
        assert_eq!(
            tree.render(),
            "root root\n  orchestrator orch\n    worker w1 [running]\n  thread alt (fork)\n"
        );
    }

    #[test]
    fn no_root_means_no_tree() {
        assert!(session_tree(&CollabGraph::default(), &BTreeSet::new()).is_none());
    }
}
