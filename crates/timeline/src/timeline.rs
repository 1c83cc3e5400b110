//! The per-thread reducer. Every mutation of a thread's turns goes through
//! [`ThreadTimeline`].

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use threadline_core::assistant::{parse_code_review_output, should_hide_while_streaming};
use threadline_core::item::entry_from_item;
use threadline_core::protocol::{ApprovalKind, ApprovalResponse, ApprovalResult, TokenUsage};
use threadline_core::{
    Approval, ApprovalDecision, AssistantRole, Attachment, Entry, InboundEvent, PENDING_TURN_ID, ProtocolEvent,
    ReasoningTarget, RequestId, SnapshotError, SystemEntry, ThreadSnapshot, Tone, Turn, TurnStatus, UserEntry,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collapse::CollapseState;
use crate::delta::{append_delta, apply_mcp_progress, apply_reasoning_delta, apply_reasoning_part_added, reasoning_part_index};
use crate::merge::LOCAL_ID_PREFIX;
use crate::router::TurnRouter;
use crate::snapshot::{DerivedTimeline, collapse_ids, derive_timeline, load_failure_timeline, parse_failure_timeline};
use crate::store::TurnStore;
use crate::views::build_turn_views;

/// Serializable view of a timeline.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineState<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<&'a str>,
    pub active_turn_id: Option<&'a str>,
    pub streaming: bool,
    pub turns: Vec<&'a Turn>,
    pub collapsed: &'a CollapseState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

#[derive(Debug, Clone)]
pub struct ThreadTimeline {
    thread_id: Option<String>,
    store: TurnStore,
    router: TurnRouter,
    collapse: CollapseState,
    token_usage: Option<TokenUsage>,
    /// Approvals whose item has not been observed yet, by item id.
    pending_approvals: HashMap<String, BufferedApproval>,
    default_collapse: bool,
    loaded: bool,
}

/// An approval waiting for its item, with the turn it was routed to.
#[derive(Debug, Clone)]
struct BufferedApproval {
    turn_id: String,
    approval: Approval,
}

fn approval_slot(entry: &mut Entry) -> Option<&mut Option<Approval>> {
    match entry {
        Entry::Command(cmd) => Some(&mut cmd.approval),
        Entry::FileChange(change) => Some(&mut change.approval),
        _ => None,
    }
}

fn accepts_approval(entry: &Entry, kind: ApprovalKind) -> bool {
    matches!(
        (entry, kind),
        (Entry::Command(_), ApprovalKind::CommandExecution) | (Entry::FileChange(_), ApprovalKind::FileChange)
    )
}

impl ThreadTimeline {
    /// A timeline for `thread_id`; with `None` every event is accepted.
    pub fn new(thread_id: Option<String>, default_collapse: bool) -> Self {
        Self {
            thread_id,
            store: TurnStore::new(),
            router: TurnRouter::new(),
            collapse: CollapseState::new(),
            token_usage: None,
            pending_approvals: HashMap::new(),
            default_collapse,
            loaded: false,
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn store(&self) -> &TurnStore {
        &self.store
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.store.turns()
    }

    pub fn router(&self) -> &TurnRouter {
        &self.router
    }

    pub fn collapse(&self) -> &CollapseState {
        &self.collapse
    }

    pub fn token_usage(&self) -> Option<TokenUsage> {
        self.token_usage
    }

    pub fn active_turn(&self) -> Option<&str> {
        self.router.active_turn()
    }

    /// A turn is active or any turn is still in progress.
    pub fn is_streaming(&self) -> bool {
        self.router.active_turn().is_some() || self.store.any_in_progress()
    }

    pub fn state(&self) -> TimelineState<'_> {
        TimelineState {
            thread_id: self.thread_id(),
            active_turn_id: self.active_turn(),
            streaming: self.is_streaming(),
            turns: self.store.turns().collect(),
            collapsed: &self.collapse,
            token_usage: self.token_usage,
        }
    }

    fn accepts(&self, event_thread: Option<&str>) -> bool {
        match (self.thread_id.as_deref(), event_thread) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        }
    }

    /// Apply one protocol event. Returns `false` when the event belongs to
    /// another thread.
    pub fn apply(&mut self, event: InboundEvent) -> bool {
        if !self.accepts(event.thread_id.as_deref()) {
            return false;
        }
        match event.event {
            ProtocolEvent::TurnStarted { turn_id } => self.on_turn_started(&turn_id),
            ProtocolEvent::TurnCompleted { turn_id, status } => self.on_turn_completed(&turn_id, status),
            ProtocolEvent::ItemStarted { item, turn_id } => self.on_item(&item, turn_id.as_deref(), false),
            ProtocolEvent::ItemCompleted { item, turn_id } => self.on_item(&item, turn_id.as_deref(), true),
            ProtocolEvent::AgentMessageDelta { item_id, delta, turn_id } => {
                let turn_id = self.route_live(turn_id.as_deref(), &item_id);
                let turn = self.store.ensure_turn(&turn_id, TurnStatus::InProgress);
                append_delta(&mut turn.entries, &item_id, AssistantRole::Message, &delta);
            }
            ProtocolEvent::ReasoningDelta {
                item_id,
                delta,
                index,
                target,
                turn_id,
            } => self.on_reasoning(&item_id, Some(&delta), index, target, turn_id.as_deref()),
            ProtocolEvent::ReasoningPartAdded {
                item_id,
                index,
                target,
                turn_id,
            } => self.on_reasoning(&item_id, None, index, target, turn_id.as_deref()),
            ProtocolEvent::McpProgress { item_id, message } => {
                let (turn_id, _) = self.router.resolve(None, Some(&item_id), self.store.pending_in_progress());
                let applied = self
                    .store
                    .get_mut(&turn_id)
                    .is_some_and(|turn| apply_mcp_progress(&mut turn.entries, &item_id, &message));
                if !applied {
                    debug!(item_id, "progress for unknown mcp call");
                }
            }
            ProtocolEvent::TokenUsage(usage) => self.token_usage = Some(usage),
            ProtocolEvent::Error {
                message,
                will_retry,
                additional_details,
            } => {
                let turn_id = self.router.active_turn().unwrap_or(PENDING_TURN_ID).to_string();
                let entry = Entry::System(SystemEntry {
                    id: format!("system-err-{}", Uuid::new_v4()),
                    text: message,
                    tone: Tone::Error,
                    will_retry,
                    additional_details,
                });
                self.store.merge_into(&turn_id, TurnStatus::Unknown, entry);
            }
            ProtocolEvent::ApprovalRequest {
                request_id,
                kind,
                item_id,
                reason,
                turn_id,
            } => {
                let approval = Approval {
                    request_id,
                    reason,
                    decision: None,
                };
                self.on_approval_request(&item_id, kind, approval, turn_id.as_deref());
            }
        }
        true
    }

    fn on_turn_started(&mut self, turn_id: &str) {
        self.router.set_active_turn(Some(turn_id.to_string()));
        self.router.rehome_pending(turn_id);
        self.store.migrate_pending(turn_id);
        self.store.set_status(turn_id, TurnStatus::InProgress);
        self.seed_collapse(turn_id);
    }

    /// A completed turn always ends in a terminal status; values the parser
    /// does not know count as `completed`.
    fn on_turn_completed(&mut self, turn_id: &str, status: TurnStatus) {
        let status = if status.is_terminal() {
            status
        } else {
            debug!(turn_id, status = status.as_str(), "non-terminal completion status, treating as completed");
            TurnStatus::Completed
        };
        self.store.set_status(turn_id, status);
        self.router.clear_active_if(turn_id);

        let before = self.pending_approvals.len();
        self.pending_approvals.retain(|_, buffered| buffered.turn_id != turn_id);
        let dropped = before - self.pending_approvals.len();
        if dropped > 0 {
            debug!(turn_id, dropped, "dropping approvals whose item never arrived");
        }
    }

    /// Route a live event for `item_id` and pin the item to the result.
    fn route_live(&mut self, explicit: Option<&str>, item_id: &str) -> String {
        let (turn_id, _) = self
            .router
            .resolve(explicit, Some(item_id), self.store.pending_in_progress());
        self.router.record(item_id, &turn_id);
        turn_id
    }

    fn on_item(&mut self, item: &serde_json::Value, explicit: Option<&str>, completed: bool) {
        let Some(mut entry) = entry_from_item(item) else {
            return;
        };
        if let Entry::Assistant(assistant) = &mut entry {
            assistant.streaming = !completed;
            assistant.completed = completed;
            if assistant.role == AssistantRole::Message {
                assistant.hide_while_streaming = !completed && should_hide_while_streaming(&assistant.text);
                assistant.structured_output = if completed {
                    parse_code_review_output(&assistant.text)
                } else {
                    None
                };
            }
        }
        if let Some(buffered) = self.pending_approvals.remove(entry.id())
            && let Some(slot) = approval_slot(&mut entry)
            && slot.is_none()
        {
            *slot = Some(buffered.approval);
        }

        let turn_id = self.route_live(explicit, &entry.id().to_string());
        self.store.merge_into(&turn_id, TurnStatus::InProgress, entry);
        self.seed_collapse(&turn_id);
    }

    fn on_reasoning(
        &mut self,
        item_id: &str,
        delta: Option<&str>,
        index: Option<i64>,
        target: ReasoningTarget,
        explicit: Option<&str>,
    ) {
        if reasoning_part_index(index).is_none() {
            debug!(item_id, ?index, "ignoring reasoning event with invalid index");
            return;
        }
        let turn_id = self.route_live(explicit, item_id);
        let turn = self.store.ensure_turn(&turn_id, TurnStatus::InProgress);
        match delta {
            Some(delta) => apply_reasoning_delta(&mut turn.entries, item_id, delta, index, target),
            None => apply_reasoning_part_added(&mut turn.entries, item_id, index, target),
        }
    }

    fn on_approval_request(&mut self, item_id: &str, kind: ApprovalKind, approval: Approval, explicit: Option<&str>) {
        let (turn_id, _) = self
            .router
            .resolve(explicit, Some(item_id), self.store.pending_in_progress());
        let target = self
            .store
            .find_entry_mut(&turn_id, item_id)
            .filter(|entry| accepts_approval(entry, kind))
            .and_then(approval_slot);
        match target {
            Some(slot) => *slot = Some(approval),
            None => {
                debug!(item_id, %approval.request_id, "buffering approval for unseen item");
                self.pending_approvals
                    .insert(item_id.to_string(), BufferedApproval { turn_id, approval });
            }
        }
    }

    fn seed_collapse(&mut self, turn_id: &str) {
        if let Some(turn) = self.store.get(turn_id) {
            for id in collapse_ids(&turn.entries) {
                self.collapse.seed(&id, self.default_collapse);
            }
        }
    }

    /// Add an optimistic user message to the active turn (or `PENDING`) and
    /// return its local id. The persisted copy later replaces it by text.
    pub fn insert_local_user_message(&mut self, text: &str, attachments: Vec<Attachment>) -> String {
        let id = format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4());
        let entry = Entry::User(UserEntry {
            id: id.clone(),
            text: text.trim().to_string(),
            attachments,
        });
        match self.router.active_turn().map(str::to_string) {
            Some(turn_id) => self.store.merge_into(&turn_id, TurnStatus::InProgress, entry),
            None => {
                self.store.merge_into(PENDING_TURN_ID, TurnStatus::InProgress, entry);
                self.store.set_status(PENDING_TURN_ID, TurnStatus::InProgress);
            }
        }
        id
    }

    /// Apply a fetched thread snapshot.
    ///
    /// The first load replaces everything. Later loads rebuild each turn in
    /// the snapshot's entry order, move statuses forward only, keep live-only turns after the snapshot's
    /// order and drop `PENDING` entries the snapshot has placed.
    pub fn apply_snapshot(&mut self, snapshot: &ThreadSnapshot) {
        let derived = derive_timeline(snapshot, self.default_collapse);
        if !self.loaded && self.store.is_empty() {
            self.replace(derived);
        } else {
            self.merge_snapshot(derived);
        }
        self.loaded = true;
    }

    fn replace(&mut self, derived: DerivedTimeline) {
        self.store = derived.store;
        self.router.reset(derived.item_to_turn, derived.active_turn);
        self.collapse = CollapseState::from_defaults(derived.collapsed);
    }

    fn merge_snapshot(&mut self, derived: DerivedTimeline) {
        let mut placed_ids = HashSet::new();
        let mut placed_texts = HashSet::new();
        let mut snapshot_order = Vec::new();

        for turn in derived.store.turns().filter(|t| !t.is_pending()) {
            snapshot_order.push(turn.id.clone());
            for entry in &turn.entries {
                placed_ids.insert(entry.id().to_string());
                if let Entry::User(user) = entry {
                    placed_texts.insert(user.text.trim().to_string());
                }
            }
            self.store.reconcile_turn(&turn.id, turn.status, &turn.entries);
        }
        self.store.adopt_order(&snapshot_order);
        self.store.prune_pending(|entry| match entry {
            Entry::User(user) => placed_ids.contains(&user.id) || placed_texts.contains(user.text.trim()),
            other => placed_ids.contains(other.id()),
        });

        self.router.absorb(derived.item_to_turn);
        if self.router.active_turn().is_none()
            && let Some(active) = derived.active_turn
            && self.store.get(&active).is_some_and(Turn::is_in_progress)
        {
            self.router.set_active_turn(Some(active));
        }

        let mut live_ids: BTreeSet<String> = self
            .store
            .turns()
            .flat_map(|turn| collapse_ids(&turn.entries))
            .collect();
        for view in build_turn_views(self.store.turns(), true) {
            live_ids.extend(view.item_ids().map(str::to_string));
        }
        self.collapse.merge_refreshed(derived.collapsed, &live_ids);
    }

    /// Record a failed snapshot fetch. Live state, once present, is kept.
    pub fn apply_snapshot_error(&mut self, error: &SnapshotError) {
        if self.loaded || !self.store.is_empty() {
            warn!(error = %error, "snapshot refresh failed; keeping live timeline");
            return;
        }
        warn!(error = %error, "snapshot load failed");
        let derived = match error {
            SnapshotError::Load(message) => load_failure_timeline(message),
            _ => parse_failure_timeline(),
        };
        self.replace(derived);
    }

    /// Record an explicit collapse/expand decision.
    pub fn set_collapsed(&mut self, id: &str, collapsed: bool) {
        self.collapse.set(id, collapsed);
    }

    /// Record the user's decision on an approval and build the reply for the
    /// backend. `None` when no entry carries `request_id`.
    pub fn resolve_approval(&mut self, request_id: &RequestId, decision: ApprovalDecision) -> Option<ApprovalResponse> {
        let approval = self
            .store
            .entries_mut()
            .filter_map(|entry| approval_slot(entry)?.as_mut())
            .chain(self.pending_approvals.values_mut().map(|buffered| &mut buffered.approval))
            .find(|approval| &approval.request_id == request_id)?;
        approval.decision = Some(decision);
        Some(ApprovalResponse {
            id: request_id.clone(),
            result: ApprovalResult { decision },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use threadline_core::testing::{
        agent_message_item, command_item, item_completed, item_started, message_delta, reasoning_item, request, snapshot,
        turn_completed, turn_started, user_item,
    };
    use threadline_core::parse_envelope_line;

    fn feed(timeline: &mut ThreadTimeline, envelope: serde_json::Value) {
        let raw = parse_envelope_line(&envelope.to_string()).unwrap();
        timeline.apply(raw.decode().unwrap());
    }

    fn snap(value: serde_json::Value) -> ThreadSnapshot {
        ThreadSnapshot::from_value(value).unwrap()
    }

    #[test]
    fn events_for_other_threads_are_ignored() {
        let mut timeline = ThreadTimeline::new(Some("th".into()), true);
        let raw = parse_envelope_line(&turn_started("other", "T1").to_string()).unwrap();
        assert!(!timeline.apply(raw.decode().unwrap()));
        assert!(timeline.store().is_empty());
    }

    #[test]
    fn approval_before_item_is_attached_on_arrival() {
        let mut timeline = ThreadTimeline::new(Some("th".into()), true);
        feed(&mut timeline, turn_started("th", "T1"));
        feed(
            &mut timeline,
            request(7, "item/commandExecution/requestApproval", json!({ "threadId": "th", "itemId": "c1", "reason": "net" })),
        );
        feed(&mut timeline, item_started("th", Some("T1"), command_item("c1", "curl x", "inProgress")));

        let turn = timeline.store().get("T1").unwrap();
        let approval = turn.entries[0].approval().unwrap();
        assert_eq!(approval.request_id, RequestId::Integer(7));
        assert_eq!(approval.reason.as_deref(), Some("net"));

        let response = timeline
            .resolve_approval(&RequestId::Integer(7), ApprovalDecision::Accept)
            .unwrap();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "id": 7, "result": { "decision": "accept" } })
        );
        let turn = timeline.store().get("T1").unwrap();
        assert_eq!(turn.entries[0].approval().unwrap().decision, Some(ApprovalDecision::Accept));
        assert!(timeline.resolve_approval(&RequestId::Integer(99), ApprovalDecision::Decline).is_none());
    }

    #[test]
    fn buffered_approvals_are_dropped_when_their_turn_completes() {
        let mut timeline = ThreadTimeline::new(Some("th".into()), true);
        feed(&mut timeline, turn_started("th", "T1"));
        feed(
            &mut timeline,
            request(7, "item/commandExecution/requestApproval", json!({ "threadId": "th", "itemId": "x1" })),
        );
        feed(&mut timeline, turn_completed("th", "T1", "completed"));

        assert!(timeline.resolve_approval(&RequestId::Integer(7), ApprovalDecision::Accept).is_none());
        feed(&mut timeline, item_completed("th", Some("T1"), command_item("x1", "curl x", "completed")));
        let turn = timeline.store().get("T1").unwrap();
        assert!(turn.entries[0].approval().is_none());
    }

    #[test]
    fn unrecognized_completion_status_still_ends_the_turn() {
        let mut timeline = ThreadTimeline::new(Some("th".into()), true);
        feed(&mut timeline, turn_started("th", "T1"));
        assert!(timeline.is_streaming());

        feed(&mut timeline, turn_completed("th", "T1", "cancelled"));
        assert_eq!(timeline.store().get("T1").unwrap().status, TurnStatus::Completed);
        assert_eq!(timeline.active_turn(), None);
        assert!(!timeline.is_streaming());
    }

    #[test]
    fn protocol_errors_become_system_entries() {
        let mut timeline = ThreadTimeline::new(None, true);
        feed(
            &mut timeline,
            json!({ "kind": "notification", "message": { "method": "error", "params": { "error": { "message": "rate limited", "willRetry": true } } } }),
        );
        let pending = timeline.store().get(PENDING_TURN_ID).unwrap();
        assert_eq!(pending.status, TurnStatus::Unknown);
        let Entry::System(system) = &pending.entries[0] else {
            panic!("expected system entry");
        };
        assert!(system.id.starts_with("system-err-"));
        assert_eq!(system.tone, Tone::Error);
        assert_eq!(system.will_retry, Some(true));
    }

    #[test]
    fn local_echo_is_replaced_by_persisted_message() {
        let mut timeline = ThreadTimeline::new(Some("th".into()), true);
        let local = timeline.insert_local_user_message("  hi ", vec![]);
        assert!(local.starts_with(LOCAL_ID_PREFIX));
        assert!(timeline.is_streaming());

        feed(&mut timeline, turn_started("th", "T1"));
        feed(&mut timeline, item_completed("th", Some("T1"), user_item("u1", "hi")));

        let turn = timeline.store().get("T1").unwrap();
        assert_eq!(turn.entries.len(), 1);
        assert_eq!(turn.entries[0].id(), "u1");
        assert!(!timeline.store().contains(PENDING_TURN_ID));
    }

    #[test]
    fn first_snapshot_sets_active_turn_and_collapse_defaults() {
        let mut timeline = ThreadTimeline::new(Some("th".into()), false);
        timeline.apply_snapshot(&snap(snapshot(
            "th",
            vec![("T1", "inProgress", vec![command_item("c1", "cargo test", "inProgress")])],
        )));
        assert_eq!(timeline.active_turn(), Some("T1"));
        assert_eq!(timeline.collapse().is_collapsed("c1"), Some(false));
        assert!(timeline.is_streaming());

        feed(&mut timeline, turn_completed("th", "T1", "completed"));
        assert_eq!(timeline.active_turn(), None);
        assert!(!timeline.is_streaming());
    }

    #[test]
    fn refresh_keeps_user_collapse_choice_and_forward_status() {
        let mut timeline = ThreadTimeline::new(Some("th".into()), true);
        let first = snap(snapshot(
            "th",
            vec![("T1", "inProgress", vec![command_item("c1", "cargo test", "inProgress")])],
        ));
        timeline.apply_snapshot(&first);
        timeline.set_collapsed("c1", false);
        feed(&mut timeline, turn_completed("th", "T1", "completed"));

        timeline.apply_snapshot(&first);
        let turn = timeline.store().get("T1").unwrap();
        assert_eq!(turn.status, TurnStatus::Completed);
        assert_eq!(timeline.collapse().is_collapsed("c1"), Some(false));
        assert_eq!(timeline.active_turn(), None);
    }

    #[test]
    fn refresh_during_stream_keeps_longer_live_text() {
        let mut timeline = ThreadTimeline::new(Some("th".into()), true);
        feed(&mut timeline, turn_started("th", "T1"));
        feed(&mut timeline, item_started("th", Some("T1"), agent_message_item("a1", "")));
        feed(&mut timeline, message_delta("th", "a1", "Hello"));
        timeline.apply_snapshot(&snap(snapshot(
            "th",
            vec![("T1", "inProgress", vec![agent_message_item("a1", "Hel")])],
        )));
        feed(&mut timeline, message_delta("th", "a1", " world"));

        let turn = timeline.store().get("T1").unwrap();
        assert_eq!(turn.entries[0].as_assistant().unwrap().text, "Hello world");
    }

    #[test]
    fn refresh_keeps_snapshot_entry_order_over_live_arrival() {
        let mut timeline = ThreadTimeline::new(Some("th".into()), true);
        feed(&mut timeline, turn_started("th", "T1"));
        feed(&mut timeline, message_delta("th", "a1", "Hel"));

        timeline.apply_snapshot(&snap(snapshot(
            "th",
            vec![("T1", "inProgress", vec![user_item("u1", "fix it"), agent_message_item("a1", "He")])],
        )));

        let turn = timeline.store().get("T1").unwrap();
        let ids: Vec<&str> = turn.entries.iter().map(Entry::id).collect();
        assert_eq!(ids, ["u1", "a1"]);
        assert_eq!(turn.entries[1].as_assistant().unwrap().text, "Hel");
    }

    #[test]
    fn refresh_keeps_explicit_collapse_on_group_ids() {
        let thread = snapshot(
            "th",
            vec![(
                "T1",
                "completed",
                vec![
                    reasoning_item("r1", &["**Look**", "**Read**"], &[]),
                    command_item("c1", "cat a.txt", "completed"),
                ],
            )],
        );
        let mut timeline = ThreadTimeline::new(Some("th".into()), true);
        timeline.apply_snapshot(&snap(thread.clone()));

        let exploration = "explore-reasoning-group-r1-summary-0-explore";
        timeline.set_collapsed(exploration, false);
        timeline.set_collapsed("reasoning-group-r1-summary-0", false);
        timeline.set_collapsed("read-group-gone", false);
        timeline.apply_snapshot(&snap(thread));

        assert_eq!(timeline.collapse().is_collapsed(exploration), Some(false));
        assert!(timeline.collapse().is_explicit(exploration));
        assert_eq!(timeline.collapse().is_collapsed("reasoning-group-r1-summary-0"), Some(false));
        assert_eq!(timeline.collapse().is_collapsed("read-group-gone"), None);
    }

    #[test]
    fn snapshot_failures() {
        let mut fresh = ThreadTimeline::new(None, true);
        fresh.apply_snapshot_error(&SnapshotError::Load("boom".into()));
        let pending = fresh.store().get(PENDING_TURN_ID).unwrap();
        assert_eq!(pending.status, TurnStatus::Failed);
        assert_eq!(pending.entries[0].id(), "system-error");

        let mut live = ThreadTimeline::new(None, true);
        live.apply_snapshot(&snap(snapshot("th", vec![("T1", "completed", vec![user_item("u1", "x")])])));
        live.apply_snapshot_error(&SnapshotError::MissingThread);
        assert_eq!(live.store().order(), ["T1"]);
    }

    #[test]
    fn state_serializes_turns_in_order() {
        let mut timeline = ThreadTimeline::new(Some("th".into()), true);
        feed(&mut timeline, turn_started("th", "T1"));
        feed(&mut timeline, item_completed("th", Some("T1"), agent_message_item("a1", "hi")));
        let value = serde_json::to_value(timeline.state()).unwrap();
        assert_eq!(value["threadId"], "th");
        assert_eq!(value["activeTurnId"], "T1");
        assert_eq!(value["turns"][0]["entries"][0]["kind"], "assistant");
        assert_eq!(value["turns"][0]["entries"][0]["text"], "hi");
    }
}
