mod config;
mod events;
mod follow;
mod graph_cmd;
mod output;
mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use threadline_core::command::{command_summary, parse_command};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "threadline", about = "Reconcile agent app-server protocol logs into turn timelines")]
struct Cli {
    /// Config file (default: ~/.config/threadline/threadline.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded envelope log and print the resulting timeline
    Replay(replay::ReplayArgs),

    /// Tail a live envelope log, re-reading the snapshot through the refresh gate
    Follow(follow::FollowArgs),

    /// Build the collaboration graph from one or more envelope logs
    Graph(graph_cmd::GraphArgs),

    /// Classify a shell command the way working items are grouped
    Classify {
        /// Command line as reported by the agent
        command: String,

        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration
    Config,
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_classify(command: &str, json: bool) -> Result<()> {
    let parsed = parse_command(command);
    let (verb, content) = command_summary(&parsed, true, Some(command));
    if json {
        let body = serde_json::json!({ "parsed": parsed, "summary": format!("{verb} {content}") });
        let body = serde_json::to_string_pretty(&body).context("Failed to serialize classification")?;
        println!("{body}");
    } else {
        println!("kind: {}", parsed.kind.as_str());
        if let Some(name) = &parsed.name {
            println!("name: {name}");
        }
        if let Some(query) = &parsed.query {
            println!("query: {query}");
        }
        if let Some(path) = &parsed.path {
            println!("path: {path}");
        }
        println!("summary: {verb} {content}");
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let resolved = config::load_config(cli.config.as_deref())?;
    init_logging(&resolved.config.logging.filter);
    let settings = &resolved.config;

    match cli.command {
        Commands::Replay(args) => replay::run_replay(args, settings),
        Commands::Follow(args) => follow::run_follow(args, settings).await,
        Commands::Graph(args) => graph_cmd::run_graph(args, settings),
        Commands::Classify { command, json } => run_classify(&command, json),
        Commands::Config => config::show_config(&resolved),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
