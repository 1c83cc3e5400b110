//! Reading recorded envelope logs (one JSON envelope per line).

use anyhow::{Context, Result};
use std::path::Path;
use threadline_core::{InboundEvent, SnapshotError, ThreadSnapshot, parse_envelope_line};
use tracing::warn;

/// Decode one log line. Blank lines, unparsable envelopes and envelopes that
/// carry no engine event yield `None`; parse failures are logged.
pub fn decode_line(line: &str, line_no: usize) -> Option<InboundEvent> {
    if line.trim().is_empty() {
        return None;
    }
    match parse_envelope_line(line) {
        Ok(envelope) => envelope.decode(),
        Err(e) => {
            warn!(line = line_no, error = %e, "skipping envelope line");
            None
        }
    }
}

/// Every decodable event of a log file, in file order.
pub fn read_events(path: &Path) -> Result<Vec<InboundEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event log {}", path.display()))?;
    Ok(content
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| decode_line(line, idx + 1))
        .collect())
}

/// Read a thread snapshot file. IO failures map to [`SnapshotError::Load`] so
/// the reconciler can render them like a failed fetch.
pub fn read_snapshot(path: &Path) -> Result<ThreadSnapshot, SnapshotError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SnapshotError::Load(format!("{}: {e}", path.display())))?;
    ThreadSnapshot::from_json(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadline_core::ProtocolEvent;
    use threadline_core::testing::turn_started;

    #[test]
    fn garbage_and_blank_lines_are_skipped() {
        assert!(decode_line("", 1).is_none());
        assert!(decode_line("not json", 2).is_none());
        assert!(decode_line("{\"message\":{}}", 3).is_none());
        let event = decode_line(&turn_started("th", "T1").to_string(), 4).expect("event");
        assert!(matches!(event.event, ProtocolEvent::TurnStarted { .. }));
        assert_eq!(event.thread_id.as_deref(), Some("th"));
    }

    #[test]
    fn missing_snapshot_is_a_load_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = read_snapshot(&dir.path().join("thread.json")).unwrap_err();
        assert!(matches!(err, SnapshotError::Load(_)));
    }
}
