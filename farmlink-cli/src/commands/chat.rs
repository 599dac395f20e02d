//! Interactive chat: stdin drafts, send acknowledgments and the live feed
//! are merged through one [`ConversationView`].

use std::time::Duration;

use anyhow::{Context, Result};
use shared::{
    models::{ConversationDetail, FeedEvent, Message, PartyId},
    reconcile::{ConversationView, MergeOutcome, ReconcileError},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use uuid::Uuid;

use super::{
    api::{ApiClient, is_retryable},
    conversations::message_line,
    live::{LiveFeed, LiveUpdate},
};

/// Screen state for one open conversation. Every method returns the lines to
/// print so the terminal loop stays thin.
#[derive(Debug)]
pub struct ChatScreen {
    view: ConversationView,
    other_party: PartyId,
    live: bool,
    connected_once: bool,
}

impl ChatScreen {
    pub fn open(detail: ConversationDetail) -> (Self, Vec<String>) {
        let conversation = &detail.conversation;
        let local = if conversation.party_low == detail.other_party {
            conversation.party_high.clone()
        } else {
            conversation.party_low.clone()
        };
        let mut view = ConversationView::new(conversation.id, local);
        view.seed(detail.messages);

        let who = detail
            .other_profile
            .as_ref()
            .map_or(detail.other_party.as_str(), |profile| profile.display_name.as_str());
        let mut lines = vec![format!("Chatting with {who} (/quit to leave)")];
        if let Some(topic) = &detail.topic {
            lines.push(format!("About: {}", topic.title));
        }
        let screen = Self {
            view,
            other_party: detail.other_party,
            live: false,
            connected_once: false,
        };
        lines.extend(
            screen
                .view
                .messages()
                .iter()
                .map(|message| message_line(message, &screen.other_party)),
        );
        (screen, lines)
    }

    pub fn conversation_id(&self) -> Uuid {
        self.view.conversation_id()
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Registers a draft; `None` means nothing should be sent.
    pub fn draft(&mut self, input: &str) -> (Option<(u64, String)>, Vec<String>) {
        match self.view.begin_send(input) {
            Ok(pending) => {
                let line = format!("... sending: {}", pending.body);
                (Some((pending.seq, pending.body)), vec![line])
            }
            Err(ReconcileError::EmptyMessage) => (None, vec!["(empty message not sent)".into()]),
        }
    }

    pub fn send_result(&mut self, seq: u64, result: Result<Message>) -> Vec<String> {
        match result {
            Ok(message) => {
                let outcome = self.view.send_accepted(seq, message.clone());
                self.show(outcome, &message)
            }
            Err(err) => match self.view.send_failed(seq) {
                Some(draft) => {
                    let hint = if is_retryable(&err) { "; try again" } else { "" };
                    vec![
                        format!("send failed: {err:#}{hint}"),
                        format!("draft restored: {draft}"),
                    ]
                }
                None => Vec::new(),
            },
        }
    }

    /// Handles a feed update; returns whether history must be refetched.
    pub fn live_update(&mut self, update: LiveUpdate) -> (bool, Vec<String>) {
        match update {
            LiveUpdate::Connected => {
                self.live = true;
                let reconnect = self.connected_once;
                self.connected_once = true;
                if reconnect {
                    (true, vec!["(live updates restored)".into()])
                } else {
                    (false, Vec::new())
                }
            }
            LiveUpdate::Event(FeedEvent::Message { message }) => {
                let outcome = self.view.remote_event(message.clone());
                (false, self.show(outcome, &message))
            }
            LiveUpdate::Event(FeedEvent::Resync { .. }) => (true, Vec::new()),
            LiveUpdate::Disconnected { reason, retrying } => {
                let was_live = std::mem::replace(&mut self.live, false);
                let line = if retrying {
                    format!("(live updates unavailable: {reason}; reconnecting)")
                } else {
                    format!("(live updates stopped: {reason})")
                };
                (false, if was_live || !retrying { vec![line] } else { Vec::new() })
            }
        }
    }

    /// Merges refetched history; only messages new to the view are printed.
    pub fn history(&mut self, messages: Vec<Message>) -> Vec<String> {
        messages
            .into_iter()
            .filter(|message| self.view.remote_event(message.clone()) == MergeOutcome::Inserted)
            .map(|message| message_line(&message, &self.other_party))
            .collect()
    }

    fn show(&self, outcome: MergeOutcome, message: &Message) -> Vec<String> {
        if outcome == MergeOutcome::Inserted {
            vec![message_line(message, &self.other_party)]
        } else {
            Vec::new()
        }
    }
}

pub async fn start_chat(api: ApiClient, conversation_id: Uuid, reconnect_delay: Duration) -> Result<()> {
    let detail = api
        .detail(conversation_id)
        .await
        .context("failed to open conversation")?;
    let (mut screen, lines) = ChatScreen::open(detail);
    print_lines(lines);

    let (_feed, mut updates) = LiveFeed::spawn(api.clone(), conversation_id, reconnect_delay);
    let mut feed_open = true;
    let (sent_tx, mut sent_rx) = mpsc::channel::<(u64, Result<Message>)>(16);
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    break;
                };
                if line.trim() == "/quit" {
                    break;
                }
                let (send, lines) = screen.draft(&line);
                print_lines(lines);
                if let Some((seq, body)) = send {
                    let api = api.clone();
                    let sent_tx = sent_tx.clone();
                    let id = screen.conversation_id();
                    tokio::spawn(async move {
                        let result = api.send(id, &body).await;
                        let _ = sent_tx.send((seq, result)).await;
                    });
                }
            }
            Some((seq, result)) = sent_rx.recv() => {
                print_lines(screen.send_result(seq, result));
            }
            update = updates.recv(), if feed_open => {
                let Some(update) = update else {
                    feed_open = false;
                    continue;
                };
                let (refetch, lines) = screen.live_update(update);
                print_lines(lines);
                if refetch {
                    match api.history(conversation_id).await {
                        Ok(messages) => print_lines(screen.history(messages)),
                        Err(err) => eprintln!("(history refresh failed: {err:#})"),
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::{Duration as ChronoDuration, Utc};
    use shared::models::{Conversation, TopicId};

    fn detail(messages: Vec<Message>) -> ConversationDetail {
        ConversationDetail {
            conversation: Conversation {
                id: Uuid::nil(),
                topic_id: Some(TopicId::new("p42")),
                party_low: PartyId::new("u1"),
                party_high: PartyId::new("u2"),
                last_activity_at: None,
                preview_text: None,
                created_at: Utc::now(),
            },
            other_party: PartyId::new("u1"),
            other_profile: None,
            topic: None,
            messages,
        }
    }

    fn message(sender: &str, body: &str, offset: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            sender_id: PartyId::new(sender),
            body: body.into(),
            created_at: Utc::now() + ChronoDuration::seconds(offset),
        }
    }

    #[test]
    fn opening_prints_history() {
        let (_, lines) = ChatScreen::open(detail(vec![message("u1", "Fresh today", 0)]));
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("u1: Fresh today"));
    }

    #[test]
    fn feed_before_acknowledgment_prints_once() {
        let (mut screen, _) = ChatScreen::open(detail(Vec::new()));
        let (send, _) = screen.draft("  Still available?  ");
        let (seq, body) = send.unwrap();
        assert_eq!(body, "Still available?");

        let persisted = message("u2", "Still available?", 1);
        let (_, lines) = screen.live_update(LiveUpdate::Event(FeedEvent::Message {
            message: persisted.clone(),
        }));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("you: Still available?"));
        assert!(screen.send_result(seq, Ok(persisted)).is_empty());
    }

    #[test]
    fn failed_send_restores_draft() {
        let (mut screen, _) = ChatScreen::open(detail(Vec::new()));
        let (send, _) = screen.draft("Can you deliver?");
        let (seq, _) = send.unwrap();
        let lines = screen.send_result(seq, Err(anyhow!("connection reset")));
        assert_eq!(lines.last().unwrap(), "draft restored: Can you deliver?");
    }

    #[test]
    fn blank_draft_is_not_sent() {
        let (mut screen, _) = ChatScreen::open(detail(Vec::new()));
        let (send, lines) = screen.draft("   ");
        assert!(send.is_none());
        assert_eq!(lines, vec!["(empty message not sent)".to_string()]);
    }

    #[test]
    fn reconnect_and_resync_request_history() {
        let (mut screen, _) = ChatScreen::open(detail(Vec::new()));
        assert!(!screen.live_update(LiveUpdate::Connected).0);
        assert!(screen.is_live());

        let (refetch, lines) = screen.live_update(LiveUpdate::Disconnected {
            reason: "eof".into(),
            retrying: true,
        });
        assert!(!refetch);
        assert!(!screen.is_live());
        assert!(lines[0].contains("reconnecting"));

        assert!(screen.live_update(LiveUpdate::Connected).0);
        assert!(
            screen
                .live_update(LiveUpdate::Event(FeedEvent::Resync { missed: 4 }))
                .0
        );
    }

    #[test]
    fn refetched_history_prints_only_new_messages() {
        let known = message("u1", "Fresh today", 0);
        let (mut screen, _) = ChatScreen::open(detail(vec![known.clone()]));
        let missed = message("u1", "Price drops at noon", 5);
        let lines = screen.history(vec![known, missed]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("u1: Price drops at noon"));
    }
}
