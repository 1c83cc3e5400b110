use anyhow::{Context, Result};
use std::path::PathBuf;
use threadline_runtime_config::ThreadlineConfig;
use threadline_timeline::{ThreadTimeline, build_turn_views};
use tracing::debug;

use crate::events::{read_events, read_snapshot};
use crate::output::{OutputFormat, render_turn_views};

#[derive(Debug, Clone, clap::Args)]
pub struct ReplayArgs {
    /// Envelope log, one JSON envelope per line
    pub events: PathBuf,

    /// Thread to reduce; defaults to the snapshot's thread, else every thread
    #[arg(long)]
    pub thread: Option<String>,

    /// Thread snapshot (JSON) loaded before the log is applied
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Shorthand for `--format json`
    #[arg(long)]
    pub json: bool,

    /// Leave reasoning segments out of turn views
    #[arg(long)]
    pub hide_reasoning: bool,
}

/// Load the optional snapshot, then apply every event of the log.
pub fn build_timeline(args: &ReplayArgs, config: &ThreadlineConfig) -> Result<ThreadTimeline> {
    let snapshot = args.snapshot.as_deref().map(read_snapshot);
    let thread_id = args.thread.clone().or_else(|| match &snapshot {
        Some(Ok(snap)) if !snap.id.is_empty() => Some(snap.id.clone()),
        _ => None,
    });

    let mut timeline = ThreadTimeline::new(thread_id, config.chat.default_collapse_details);
    match snapshot {
        Some(Ok(snap)) => timeline.apply_snapshot(&snap),
        Some(Err(e)) => timeline.apply_snapshot_error(&e),
        None => {}
    }

    let events = read_events(&args.events)?;
    let total = events.len();
    let mut applied = 0usize;
    for event in events {
        if timeline.apply(event) {
            applied += 1;
        }
    }
    debug!(total, applied, "replayed event log");
    Ok(timeline)
}

pub fn run_replay(args: ReplayArgs, config: &ThreadlineConfig) -> Result<()> {
    let timeline = build_timeline(&args, config)?;
    let format = if args.json { OutputFormat::Json } else { args.format };
    match format {
        OutputFormat::Json => {
            let body = serde_json::to_string_pretty(&timeline.state()).context("Failed to serialize timeline")?;
            println!("{body}");
        }
        OutputFormat::Text => {
            let show_reasoning = config.chat.show_reasoning && !args.hide_reasoning;
            let views = build_turn_views(timeline.turns(), show_reasoning);
            print!("{}", render_turn_views(&views, timeline.collapse()));
        }
    }
    Ok(())
}
