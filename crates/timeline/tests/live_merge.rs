//! End-to-end behaviour of the reducer over protocol envelopes.

use serde_json::{Value, json};
use threadline_core::testing::{
    agent_message_item, command_item, item_completed, item_started, message_delta, snapshot, summary_delta,
    summary_part_added, turn_completed, turn_started, user_item,
};
use threadline_core::{Attachment, Entry, PENDING_TURN_ID, ThreadSnapshot, TurnStatus, parse_envelope_line};
use threadline_timeline::segment::{ExplorationStatus, SegmentedItem, WorkingItem};
use threadline_timeline::{ThreadTimeline, build_turn_views};

const THREAD: &str = "th-1";

fn timeline() -> ThreadTimeline {
    ThreadTimeline::new(Some(THREAD.to_string()), true)
}

fn feed(timeline: &mut ThreadTimeline, envelope: Value) {
    let raw = parse_envelope_line(&envelope.to_string()).expect("envelope should parse");
    let event = raw.decode().expect("envelope should decode");
    assert!(timeline.apply(event));
}

fn message_text(timeline: &ThreadTimeline, turn_id: &str, item_id: &str) -> String {
    timeline
        .store()
        .get(turn_id)
        .and_then(|turn| turn.entries.iter().find(|e| e.id() == item_id))
        .and_then(Entry::as_assistant)
        .map(|a| a.text.clone())
        .unwrap_or_default()
}

#[test]
fn deltas_concatenate_across_interleaved_snapshots() {
    let mut tl = timeline();
    tl.apply_snapshot(&ThreadSnapshot::from_value(snapshot(THREAD, vec![])).unwrap());
    feed(&mut tl, turn_started(THREAD, "T1"));

    let deltas = ["The ", "quick ", "brown ", "fox"];
    let mut sent = String::new();
    for delta in deltas {
        feed(&mut tl, message_delta(THREAD, "a1", delta));
        sent.push_str(delta);
        // A stale snapshot that only saw part of the stream.
        let stale = &sent[..sent.len() / 2];
        let snap = snapshot(THREAD, vec![("T1", "inProgress", vec![agent_message_item("a1", stale)])]);
        tl.apply_snapshot(&ThreadSnapshot::from_value(snap).unwrap());
    }

    assert_eq!(message_text(&tl, "T1", "a1"), deltas.concat());
}

#[test]
fn item_completed_is_idempotent() {
    let mut tl = timeline();
    feed(&mut tl, turn_started(THREAD, "T1"));
    let done = item_completed(THREAD, Some("T1"), command_item("c1", "cargo test", "completed"));
    feed(&mut tl, done.clone());
    let once = tl.store().clone();
    feed(&mut tl, done);
    assert_eq!(tl.store(), &once);
}

#[test]
fn optimistic_echo_and_persisted_message_dedup_with_attachment_union() {
    let mut tl = timeline();
    feed(&mut tl, turn_started(THREAD, "T1"));
    tl.insert_local_user_message(
        "review this",
        vec![Attachment::File {
            path: "/repo/a.rs".into(),
            name: "a.rs".into(),
        }],
    );
    let persisted = json!({
        "type": "userMessage",
        "id": "u-1",
        "content": [
            { "type": "text", "text": "review this" },
            { "type": "localImage", "path": "/tmp/shot.png" }
        ]
    });
    feed(&mut tl, item_completed(THREAD, Some("T1"), persisted));

    let turn = tl.store().get("T1").unwrap();
    let users: Vec<_> = turn
        .entries
        .iter()
        .filter_map(|e| match e {
            Entry::User(user) => Some(user),
            _ => None,
        })
        .collect();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, "u-1");
    let keys: Vec<String> = users[0].attachments.iter().map(Attachment::dedup_key).collect();
    assert_eq!(keys, ["file:/repo/a.rs", "localImage:/tmp/shot.png"]);
}

#[test]
fn pending_turn_is_retired_into_the_first_real_turn() {
    let mut tl = timeline();
    feed(&mut tl, item_started(THREAD, None, user_item("u1", "hi")));
    assert_eq!(tl.store().order(), [PENDING_TURN_ID]);

    feed(&mut tl, turn_started(THREAD, "T1"));
    feed(&mut tl, item_completed(THREAD, Some("T1"), agent_message_item("a1", "hello")));

    assert_eq!(tl.store().order(), ["T1"]);
    let ids: Vec<&str> = tl.store().get("T1").unwrap().entries.iter().map(Entry::id).collect();
    assert_eq!(ids, ["u1", "a1"]);
    assert_eq!(tl.router().turn_for_item("u1"), Some("T1"));
}

#[test]
fn late_delta_follows_its_item_after_the_turn_fails() {
    let mut tl = timeline();
    feed(&mut tl, turn_started(THREAD, "T1"));
    feed(&mut tl, message_delta(THREAD, "a1", "partial"));
    feed(&mut tl, turn_completed(THREAD, "T1", "failed"));
    feed(&mut tl, turn_started(THREAD, "T2"));
    feed(&mut tl, message_delta(THREAD, "a1", " tail"));

    assert_eq!(message_text(&tl, "T1", "a1"), "partial tail");
    assert!(tl.store().get("T2").unwrap().entries.is_empty());
    assert_eq!(tl.store().get("T1").unwrap().status, TurnStatus::Failed);
}

#[test]
fn reasoning_parts_pad_and_accumulate() {
    let mut tl = timeline();
    feed(&mut tl, turn_started(THREAD, "T1"));
    feed(&mut tl, summary_part_added(THREAD, "r1", 2));
    feed(&mut tl, summary_delta(THREAD, "r1", 2, "x"));
    feed(&mut tl, summary_delta(THREAD, "r1", 2, "y"));

    let turn = tl.store().get("T1").unwrap();
    let reasoning = turn.entries[0].as_assistant().unwrap();
    assert_eq!(reasoning.summary_parts(), ["", "", "xy"]);
}

#[test]
fn reading_sequence_forms_one_exploring_span() {
    let mut tl = timeline();
    feed(&mut tl, turn_started(THREAD, "T1"));
    for (id, cmd) in [("c1", "cat a.txt"), ("c2", "cat b.txt"), ("c3", "ls src/"), ("c4", "cat c.txt")] {
        feed(&mut tl, item_completed(THREAD, Some("T1"), command_item(id, cmd, "completed")));
    }

    let views = build_turn_views(tl.turns(), true);
    assert_eq!(views[0].working_items.len(), 1);
    let SegmentedItem::Exploration(span) = &views[0].working_items[0] else {
        panic!("expected one exploration");
    };
    assert_eq!(span.status, ExplorationStatus::Exploring);
    assert_eq!(span.unique_file_count, 3);
    let groups: Vec<&str> = span.items.iter().map(WorkingItem::id).collect();
    assert_eq!(groups, ["read-group-c1", "c3", "read-group-c4"]);
    assert_eq!(tl.collapse().is_collapsed("read-group-c4"), Some(true));

    feed(&mut tl, turn_completed(THREAD, "T1", "completed"));
    let views = build_turn_views(tl.turns(), true);
    assert!(matches!(&views[0].working_items[0], SegmentedItem::Exploration(span) if span.status == ExplorationStatus::Explored));
}
