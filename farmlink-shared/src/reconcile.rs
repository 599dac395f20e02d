//! Client-side view of one conversation.
//!
//! Two independent channels report a sent message: the synchronous send
//! acknowledgment and the asynchronous live feed. Either can arrive first,
//! the feed may redeliver, and feed events can arrive out of order. The
//! [`ConversationView`] merges both so every message is shown exactly once,
//! in `(created_at, id)` order, and a failed send leaves nothing behind.

use std::collections::{HashMap, HashSet, VecDeque};

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Message, PartyId, normalize_body};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("message body is empty")]
    EmptyMessage,
}

/// What a merge did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The message was new and is now displayed.
    Inserted,
    /// The message id was already displayed; nothing changed.
    Duplicate,
    /// The message belongs to another conversation and was ignored.
    Foreign,
}

/// An optimistic entry for a send that has not been confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// Monotonic per view, starting at 1.
    pub seq: u64,
    /// Trimmed body that was handed to the server.
    pub body: String,
}

/// One line of the rendered conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderedEntry<'a> {
    Confirmed(&'a Message),
    Pending(&'a PendingSend),
}

#[derive(Debug, Clone)]
pub struct ConversationView {
    conversation_id: Uuid,
    local_party: PartyId,
    confirmed: Vec<Message>,
    known_ids: HashSet<Uuid>,
    pending: VecDeque<PendingSend>,
    /// Sends a feed event with the same sender and body stood in for before
    /// their acknowledgment came back. The event may belong to another tab
    /// of the same party, so the draft is kept until the outcome is known.
    settled_by_feed: HashMap<u64, (Uuid, String)>,
    next_seq: u64,
}

impl ConversationView {
    pub fn new(conversation_id: Uuid, local_party: PartyId) -> Self {
        Self {
            conversation_id,
            local_party,
            confirmed: Vec::new(),
            known_ids: HashSet::new(),
            pending: VecDeque::new(),
            settled_by_feed: HashMap::new(),
            next_seq: 1,
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Loads fetched history. Safe to call again after a resync.
    pub fn seed(&mut self, history: impl IntoIterator<Item = Message>) {
        for message in history {
            self.merge(message);
        }
    }

    /// Registers an optimistic send for `draft`.
    ///
    /// # Errors
    /// Returns [`ReconcileError::EmptyMessage`] when the draft is blank; no
    /// entry is created in that case.
    pub fn begin_send(&mut self, draft: &str) -> Result<PendingSend, ReconcileError> {
        let body = normalize_body(draft).ok_or(ReconcileError::EmptyMessage)?;
        let pending = PendingSend {
            seq: self.next_seq,
            body,
        };
        self.next_seq += 1;
        self.pending.push_back(pending.clone());
        Ok(pending)
    }

    /// The server acknowledged send `seq` with the persisted `message`.
    pub fn send_accepted(&mut self, seq: u64, message: Message) -> MergeOutcome {
        self.settled_by_feed.remove(&seq);
        self.pending.retain(|pending| pending.seq != seq);
        self.merge(message)
    }

    /// Send `seq` failed. Returns the draft to put back into the input box.
    ///
    /// A feed event that matched this send by body is not proof that this
    /// attempt persisted; another session of the same party may have sent
    /// the same text. That message stays displayed and the draft is still
    /// returned. `None` only for an unknown or already settled `seq`.
    pub fn send_failed(&mut self, seq: u64) -> Option<String> {
        if let Some((id, body)) = self.settled_by_feed.remove(&seq) {
            debug!(seq, message_id = %id, "send failed after a matching feed event; restoring draft");
            return Some(body);
        }
        let position = self.pending.iter().position(|pending| pending.seq == seq)?;
        self.pending.remove(position).map(|pending| pending.body)
    }

    /// A message arrived on the live feed.
    pub fn remote_event(&mut self, message: Message) -> MergeOutcome {
        if message.conversation_id != self.conversation_id {
            return MergeOutcome::Foreign;
        }
        if self.known_ids.contains(&message.id) {
            return MergeOutcome::Duplicate;
        }

        if message.sender_id == self.local_party {
            if let Some(position) = self
                .pending
                .iter()
                .position(|pending| pending.body == message.body)
            {
                if let Some(pending) = self.pending.remove(position) {
                    self.settled_by_feed
                        .insert(pending.seq, (message.id, pending.body));
                }
            }
        }

        self.merge(message)
    }

    /// Confirmed messages in display order.
    pub fn messages(&self) -> &[Message] {
        &self.confirmed
    }

    /// Outstanding optimistic sends, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &PendingSend> {
        self.pending.iter()
    }

    /// Confirmed messages followed by outstanding sends.
    pub fn rendered(&self) -> Vec<RenderedEntry<'_>> {
        self.confirmed
            .iter()
            .map(RenderedEntry::Confirmed)
            .chain(self.pending.iter().map(RenderedEntry::Pending))
            .collect()
    }

    fn merge(&mut self, message: Message) -> MergeOutcome {
        if message.conversation_id != self.conversation_id {
            return MergeOutcome::Foreign;
        }
        if !self.known_ids.insert(message.id) {
            return MergeOutcome::Duplicate;
        }
        let key = message.sort_key();
        let index = self
            .confirmed
            .partition_point(|existing| existing.sort_key() <= key);
        self.confirmed.insert(index, message);
        MergeOutcome::Inserted
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
