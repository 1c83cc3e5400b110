use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use threadline_collab::{AgentState, CollabGraph, CollabIndex, SessionNode, agent_states, auto_focus_candidate, session_tree};
use threadline_runtime_config::ThreadlineConfig;

use crate::events::read_events;
use crate::output::OutputFormat;

#[derive(Debug, Clone, clap::Args)]
pub struct GraphArgs {
    /// Envelope logs; events from every thread feed the graph
    #[arg(required = true)]
    pub events: Vec<PathBuf>,

    /// Thread the user is looking at (preferred root when it has no parent)
    #[arg(long)]
    pub current: Option<String>,

    /// Pin the workbench root
    #[arg(long)]
    pub root: Option<String>,

    /// Fork relation, repeatable
    #[arg(long = "fork", value_name = "CHILD=PARENT", value_parser = parse_fork)]
    pub forks: Vec<(String, String)>,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Shorthand for `--format json`
    #[arg(long)]
    pub json: bool,
}

fn parse_fork(raw: &str) -> Result<(String, String)> {
    let Some((child, parent)) = raw.split_once('=') else {
        bail!("expected CHILD=PARENT, got `{raw}`");
    };
    let (child, parent) = (child.trim(), parent.trim());
    if child.is_empty() || parent.is_empty() {
        bail!("expected CHILD=PARENT, got `{raw}`");
    }
    Ok((child.to_string(), parent.to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphReport {
    graph: CollabGraph,
    tree: Option<SessionNode>,
    agents: BTreeMap<String, AgentState>,
    running_threads: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    focus: Option<String>,
}

fn build_report(args: &GraphArgs, config: &ThreadlineConfig) -> Result<GraphReport> {
    let mut index = CollabIndex::new();
    for path in &args.events {
        for event in read_events(path).with_context(|| format!("Failed to load {}", path.display()))? {
            index.ingest_event(&event);
        }
    }
    for (child, parent) in &args.forks {
        index.record_fork(child, parent);
    }

    let graph = CollabGraph::from_index(&index, args.current.as_deref(), args.root.as_deref());
    let agents = agent_states(&index);
    let focus = if config.workbench.auto_focus {
        auto_focus_candidate(&agents, &graph, index.running_threads(), args.current.as_deref(), None)
    } else {
        None
    };
    Ok(GraphReport {
        tree: session_tree(&graph, index.running_threads()),
        running_threads: index.running_threads().iter().cloned().collect(),
        graph,
        agents,
        focus,
    })
}

fn render_text(report: &GraphReport) -> String {
    let mut out = String::new();
    match &report.tree {
        Some(tree) => out.push_str(&tree.render()),
        None => out.push_str("no collaboration edges\n"),
    }
    for (thread_id, state) in &report.agents {
        out.push_str(&format!("agent {thread_id}: {}", state.status));
        if let Some(message) = &state.message {
            out.push_str(&format!(" ({message})"));
        }
        out.push('\n');
    }
    if let Some(focus) = &report.focus {
        out.push_str(&format!("focus: {focus}\n"));
    }
    out
}

pub fn run_graph(args: GraphArgs, config: &ThreadlineConfig) -> Result<()> {
    let report = build_report(&args, config)?;
    let format = if args.json { OutputFormat::Json } else { args.format };
    match format {
        OutputFormat::Json => {
            let body = serde_json::to_string_pretty(&report).context("Failed to serialize graph")?;
            println!("{body}");
        }
        OutputFormat::Text => print!("{}", render_text(&report)),
    }
    Ok(())
}
