//! Snapshot refresh throttling.

use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Fetch now.
    Run,
    /// Too soon after the last fetch; queued.
    Throttled { retry_after: Duration },
    /// A turn is streaming; queued until it ends.
    Deferred,
}

/// Enforces a minimum spacing between snapshot fetches and holds requests
/// made while a turn is streaming.
#[derive(Debug, Clone)]
pub struct RefreshGate {
    min_interval: Duration,
    suppress_while_streaming: bool,
    last_refresh: Option<Instant>,
    queued: bool,
}

impl RefreshGate {
    pub fn new(min_interval: Duration, suppress_while_streaming: bool) -> Self {
        Self {
            min_interval,
            suppress_while_streaming,
            last_refresh: None,
            queued: false,
        }
    }

    fn remaining(&self, now: Instant) -> Duration {
        match self.last_refresh {
            Some(last) => self.min_interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn request(&mut self, now: Instant, streaming: bool) -> RefreshDecision {
        let decision = if streaming && self.suppress_while_streaming {
            RefreshDecision::Deferred
        } else {
            let retry_after = self.remaining(now);
            if retry_after.is_zero() {
                RefreshDecision::Run
            } else {
                RefreshDecision::Throttled { retry_after }
            }
        };
        match decision {
            RefreshDecision::Run => {
                self.queued = false;
                self.last_refresh = Some(now);
            }
            _ => self.queued = true,
        }
        trace!(?decision, "refresh requested");
        decision
    }

    /// Replay a queued request once spacing allows and streaming has ended.
    /// Returns whether the caller should fetch now.
    pub fn poll(&mut self, now: Instant, streaming: bool) -> bool {
        if !self.queued {
            return false;
        }
        self.request(now, streaming) == RefreshDecision::Run
    }

    /// Record a fetch that happened outside [`RefreshGate::request`].
    pub fn mark_refreshed(&mut self, now: Instant) {
        self.last_refresh = Some(now);
        self.queued = false;
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPACING: Duration = Duration::from_millis(500);

    #[test]
    fn first_request_runs_then_throttles() {
        let start = Instant::now();
        let mut gate = RefreshGate::new(SPACING, true);
        assert_eq!(gate.request(start, false), RefreshDecision::Run);
        assert_eq!(
            gate.request(start + Duration::from_millis(200), false),
            RefreshDecision::Throttled {
                retry_after: Duration::from_millis(300)
            }
        );
        assert!(gate.is_queued());
        assert!(!gate.poll(start + Duration::from_millis(400), false));
        assert!(gate.poll(start + SPACING, false));
        assert!(!gate.is_queued());
    }

    #[test]
    fn streaming_defers_until_turn_ends() {
        let start = Instant::now();
        let mut gate = RefreshGate::new(SPACING, true);
        assert_eq!(gate.request(start, true), RefreshDecision::Deferred);
        assert!(!gate.poll(start + Duration::from_secs(5), true));
        assert!(gate.poll(start + Duration::from_secs(6), false));
        assert!(!gate.poll(start + Duration::from_secs(7), false));
    }

    #[test]
    fn suppression_can_be_disabled() {
        let mut gate = RefreshGate::new(SPACING, false);
        assert_eq!(gate.request(Instant::now(), true), RefreshDecision::Run);
    }
}
