use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::*;

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(seconds)
}

fn message(conversation_id: Uuid, sender: &str, body: &str, seconds: i64) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_id: PartyId::new(sender),
        body: body.to_string(),
        created_at: at(seconds),
    }
}

fn bodies(view: &ConversationView) -> Vec<&str> {
    view.messages().iter().map(|m| m.body.as_str()).collect()
}

#[test]
fn out_of_order_delivery_displays_in_creation_order() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    let t1 = message(conversation, "u2", "t1", 1);
    let t2 = message(conversation, "u2", "t2", 2);
    let t3 = message(conversation, "u2", "t3", 3);

    view.remote_event(t2);
    view.remote_event(t1);
    view.remote_event(t3);

    assert_eq!(bodies(&view), ["t1", "t2", "t3"]);
}

#[test]
fn equal_timestamps_are_ordered_by_id() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    let mut a = message(conversation, "u2", "a", 5);
    let mut b = message(conversation, "u2", "b", 5);
    a.id = Uuid::from_u128(2);
    b.id = Uuid::from_u128(1);

    view.remote_event(a);
    view.remote_event(b);

    assert_eq!(bodies(&view), ["b", "a"]);
}

#[test]
fn redelivered_event_is_shown_once() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());
    let incoming = message(conversation, "u2", "hello", 1);

    assert_eq!(view.remote_event(incoming.clone()), MergeOutcome::Inserted);
    assert_eq!(view.remote_event(incoming.clone()), MergeOutcome::Duplicate);
    assert_eq!(view.remote_event(incoming), MergeOutcome::Duplicate);
    assert_eq!(view.messages().len(), 1);
}

#[test]
fn ack_then_feed_yields_one_entry() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    let pending = view.begin_send("  Are the strawberries organic? ").unwrap();
    assert_eq!(pending.body, "Are the strawberries organic?");
    let persisted = message(conversation, "u1", &pending.body, 1);

    assert_eq!(
        view.send_accepted(pending.seq, persisted.clone()),
        MergeOutcome::Inserted
    );
    assert_eq!(view.remote_event(persisted), MergeOutcome::Duplicate);

    assert_eq!(view.messages().len(), 1);
    assert_eq!(view.pending().count(), 0);
}

#[test]
fn feed_then_ack_yields_one_entry() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    let pending = view.begin_send("hi").unwrap();
    let persisted = message(conversation, "u1", "hi", 1);

    assert_eq!(view.remote_event(persisted.clone()), MergeOutcome::Inserted);
    assert_eq!(view.pending().count(), 0, "feed settles the optimistic entry");
    assert_eq!(
        view.send_accepted(pending.seq, persisted),
        MergeOutcome::Duplicate
    );

    assert_eq!(view.messages().len(), 1);
    assert_eq!(view.rendered().len(), 1);
}

#[test]
fn acknowledged_message_survives_missing_feed_event() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    let pending = view.begin_send("still fresh?").unwrap();
    view.send_accepted(pending.seq, message(conversation, "u1", "still fresh?", 1));

    assert_eq!(bodies(&view), ["still fresh?"]);
}

#[test]
fn failed_send_restores_draft_and_leaves_no_entry() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    let pending = view.begin_send("  see you at the market ").unwrap();
    assert_eq!(view.rendered().len(), 1);

    let draft = view.send_failed(pending.seq);
    assert_eq!(draft.as_deref(), Some("see you at the market"));
    assert!(view.rendered().is_empty());
    assert_eq!(view.send_failed(pending.seq), None);
}

#[test]
fn failure_after_matching_feed_event_keeps_message_and_draft() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    let pending = view.begin_send("ok").unwrap();
    view.remote_event(message(conversation, "u1", "ok", 1));
    assert!(view.pending().next().is_none());

    assert_eq!(view.send_failed(pending.seq).as_deref(), Some("ok"));
    assert_eq!(bodies(&view), ["ok"]);
    assert_eq!(view.send_failed(pending.seq), None);
}

#[test]
fn same_text_from_another_tab_does_not_swallow_failed_draft() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    let mine = view.begin_send("ok").unwrap();
    // The other tab's copy arrives first and persists.
    let other_tab = message(conversation, "u1", "ok", 1);
    assert_eq!(view.remote_event(other_tab), MergeOutcome::Inserted);

    // This tab's own request never made it.
    assert_eq!(view.send_failed(mine.seq).as_deref(), Some("ok"));
    assert_eq!(bodies(&view), ["ok"]);
    assert!(view.pending().next().is_none());
}

#[test]
fn blank_draft_is_rejected_without_pending_entry() {
    let mut view = ConversationView::new(Uuid::new_v4(), "u1".into());
    assert_eq!(view.begin_send(" \n\t "), Err(ReconcileError::EmptyMessage));
    assert!(view.rendered().is_empty());
}

#[test]
fn feed_settles_oldest_matching_send_first() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    let first = view.begin_send("yes").unwrap();
    let second = view.begin_send("yes").unwrap();
    assert!(first.seq < second.seq);

    view.remote_event(message(conversation, "u1", "yes", 1));

    let outstanding: Vec<u64> = view.pending().map(|p| p.seq).collect();
    assert_eq!(outstanding, [second.seq]);
}

#[test]
fn counterpart_messages_never_settle_local_sends() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    view.begin_send("hello").unwrap();
    view.remote_event(message(conversation, "u2", "hello", 1));

    assert_eq!(view.pending().count(), 1);
    assert_eq!(view.messages().len(), 1);
}

#[test]
fn foreign_conversation_events_are_ignored() {
    let mut view = ConversationView::new(Uuid::new_v4(), "u1".into());
    let stray = message(Uuid::new_v4(), "u2", "wrong room", 1);
    assert_eq!(view.remote_event(stray), MergeOutcome::Foreign);
    assert!(view.messages().is_empty());
}

#[test]
fn rendered_lists_confirmed_before_pending() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());

    view.seed(vec![message(conversation, "u2", "first", 1)]);
    let pending = view.begin_send("second").unwrap();

    let rendered = view.rendered();
    assert!(matches!(rendered[0], RenderedEntry::Confirmed(m) if m.body == "first"));
    assert!(matches!(rendered[1], RenderedEntry::Pending(p) if p.seq == pending.seq));
}

#[test]
fn reseeding_history_does_not_duplicate() {
    let conversation = Uuid::new_v4();
    let mut view = ConversationView::new(conversation, "u1".into());
    let history = vec![
        message(conversation, "u1", "a", 1),
        message(conversation, "u2", "b", 2),
    ];

    view.seed(history.clone());
    view.seed(history);

    assert_eq!(bodies(&view), ["a", "b"]);
}
