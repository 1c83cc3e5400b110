pub mod agents;
pub mod graph;
pub mod index;
pub mod tree;

pub use agents::{AgentState, AutoFocus, agent_states, auto_focus_candidate};
pub use graph::{ChildLink, CollabGraph, Edge, EdgeKind, ThreadRole};
pub use index::CollabIndex;
pub use tree::{SessionNode, session_tree};
