//! Live mode: tail an envelope log and keep the timeline reconciled.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use threadline_core::ProtocolEvent;
use threadline_runtime_config::ThreadlineConfig;
use threadline_timeline::{RefreshDecision, RefreshGate, ThreadTimeline, TurnView, build_turn_views};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

use crate::events::{decode_line, read_snapshot};
use crate::output::render_turn_views;

#[derive(Debug, Clone, clap::Args)]
pub struct FollowArgs {
    /// Envelope log to tail
    pub events: PathBuf,

    /// Thread to follow; defaults to the snapshot's thread, else every thread
    #[arg(long)]
    pub thread: Option<String>,

    /// Thread snapshot (JSON) re-read after turns complete or the file changes
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Exit after this many milliseconds without new log lines
    #[arg(long)]
    pub idle_exit_ms: Option<u64>,
}

/// Byte-offset tailer over a growing log. Only complete lines are returned;
/// a trailing partial line stays unread until its newline lands.
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    lines_read: usize,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            lines_read: 0,
        }
    }

    /// Complete lines appended since the last call, with 1-based line numbers.
    pub async fn read_new_lines(&mut self) -> Result<Vec<(usize, String)>> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("Cannot stat {}", self.path.display()))?;
        let size = metadata.len();

        if size < self.offset {
            info!(path = %self.path.display(), "log truncated, rereading from start");
            self.offset = 0;
            self.lines_read = 0;
        }
        if size == self.offset {
            return Ok(Vec::new());
        }

        let mut file = tokio::fs::File::open(&self.path)
            .await
            .with_context(|| format!("Cannot open {}", self.path.display()))?;
        file.seek(std::io::SeekFrom::Start(self.offset))
            .await
            .with_context(|| format!("Cannot seek in {}", self.path.display()))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .with_context(|| format!("Cannot read {}", self.path.display()))?;

        let Some(end) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(Vec::new());
        };
        self.offset += end as u64 + 1;

        let text = String::from_utf8_lossy(&buf[..end]);
        let mut lines = Vec::new();
        for line in text.split('\n') {
            self.lines_read += 1;
            lines.push((self.lines_read, line.to_string()));
        }
        Ok(lines)
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn reload_snapshot(timeline: &mut ThreadTimeline, path: &Path) {
    match read_snapshot(path) {
        Ok(snapshot) => {
            debug!(turns = snapshot.turns.len(), "snapshot refreshed");
            timeline.apply_snapshot(&snapshot);
        }
        Err(e) => timeline.apply_snapshot_error(&e),
    }
}

/// Print the views that changed since the last call.
fn print_changed(timeline: &ThreadTimeline, show_reasoning: bool, printed: &mut HashMap<String, TurnView>) {
    let changed: Vec<TurnView> = build_turn_views(timeline.turns(), show_reasoning)
        .into_iter()
        .filter(|view| printed.get(&view.id) != Some(view))
        .collect();
    if changed.is_empty() {
        return;
    }
    print!("{}", render_turn_views(&changed, timeline.collapse()));
    for view in changed {
        printed.insert(view.id.clone(), view);
    }
}

pub async fn run_follow(args: FollowArgs, config: &ThreadlineConfig) -> Result<()> {
    let snapshot_path = args.snapshot.clone();
    let initial = snapshot_path.as_deref().map(read_snapshot);
    let thread_id = args.thread.clone().or_else(|| match &initial {
        Some(Ok(snap)) if !snap.id.is_empty() => Some(snap.id.clone()),
        _ => None,
    });

    let mut timeline = ThreadTimeline::new(thread_id, config.chat.default_collapse_details);
    let mut gate = RefreshGate::new(
        Duration::from_millis(config.refresh.min_interval_ms),
        config.refresh.suppress_while_streaming,
    );
    match initial {
        Some(Ok(snap)) => {
            timeline.apply_snapshot(&snap);
            gate.mark_refreshed(Instant::now());
        }
        Some(Err(e)) => timeline.apply_snapshot_error(&e),
        None => {}
    }
    let mut snapshot_mtime = snapshot_path.as_deref().and_then(modified_at);

    let show_reasoning = config.chat.show_reasoning;
    let mut printed = HashMap::new();
    print_changed(&timeline, show_reasoning, &mut printed);

    let mut tailer = LogTailer::new(&args.events);
    let mut tick = tokio::time::interval(Duration::from_millis(config.refresh.poll_interval_ms));
    let idle_limit = args.idle_exit_ms.map(Duration::from_millis);
    let mut last_activity = Instant::now();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                debug!("interrupted, stopping follow");
                break;
            }
        }

        let mut want_refresh = false;
        let lines = match tailer.read_new_lines().await {
            Ok(lines) => lines,
            Err(e) => {
                warn!("{e:#}");
                Vec::new()
            }
        };
        if !lines.is_empty() {
            last_activity = Instant::now();
        }
        for (line_no, line) in lines {
            let Some(event) = decode_line(&line, line_no) else {
                continue;
            };
            let turn_ended = matches!(event.event, ProtocolEvent::TurnCompleted { .. });
            if timeline.apply(event) && turn_ended {
                want_refresh = true;
            }
        }

        if let Some(path) = snapshot_path.as_deref() {
            let mtime = modified_at(path);
            if mtime != snapshot_mtime {
                snapshot_mtime = mtime;
                want_refresh = true;
            }
            let now = Instant::now();
            let streaming = timeline.is_streaming();
            let run = if want_refresh {
                gate.request(now, streaming) == RefreshDecision::Run
            } else {
                gate.poll(now, streaming)
            };
            if run {
                reload_snapshot(&mut timeline, path);
            }
        }

        print_changed(&timeline, show_reasoning, &mut printed);

        if let Some(limit) = idle_limit
            && last_activity.elapsed() >= limit
        {
            debug!("no new log lines, stopping follow");
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn tailer_holds_back_partial_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "one\ntw").expect("write");

        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.read_new_lines().await.expect("read"), [(1, "one".to_string())]);
        assert!(tailer.read_new_lines().await.expect("read").is_empty());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).expect("open");
        file.write_all(b"o\nthree\n").expect("append");
        assert_eq!(
            tailer.read_new_lines().await.expect("read"),
            [(2, "two".to_string()), (3, "three".to_string())]
        );
    }

    #[tokio::test]
    async fn tailer_restarts_after_truncation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "first line\nsecond line\n").expect("write");
        let mut tailer = LogTailer::new(&path);
        assert_eq!(tailer.read_new_lines().await.expect("read").len(), 2);

        std::fs::write(&path, "new\n").expect("rewrite");
        assert_eq!(tailer.read_new_lines().await.expect("read"), [(1, "new".to_string())]);
    }
}
