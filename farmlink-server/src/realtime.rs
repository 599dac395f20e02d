//! Live message feed scoped to one conversation.
//!
//! Delivery is at-least-once and unordered relative to the sender's own
//! acknowledgment; consumers dedupe by message id. A [`Subscription`] is the
//! only handle on a feed channel and releases it when dropped, so an
//! abandoned stream never leaves a channel behind.

use std::{
    collections::HashMap,
    fmt,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    time::Duration,
};

use futures_util::Stream;
use serde::Deserialize;
use shared::models::Message;
use sqlx::{PgPool, postgres::PgListener};
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::ChatStore;

/// Postgres channel the insert trigger notifies on.
pub const MESSAGE_INSERTED_CHANNEL: &str = "farmlink_message_inserted";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscriber fell behind and `0` events were dropped for it.
    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),
    /// The feed's upstream source dropped out; events may be missing.
    #[error("feed source was interrupted")]
    Interrupted,
}

/// What travels over a conversation channel.
#[derive(Debug, Clone)]
enum FeedSignal {
    Message(Message),
    Interrupted,
}

struct FeedInner {
    capacity: usize,
    channels: Mutex<HashMap<Uuid, broadcast::Sender<FeedSignal>>>,
}

impl FeedInner {
    fn channels(&self) -> MutexGuard<'_, HashMap<Uuid, broadcast::Sender<FeedSignal>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process fan-out hub. Cheap to clone.
#[derive(Clone)]
pub struct ChangeFeed {
    inner: Arc<FeedInner>,
}

impl fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("capacity", &self.inner.capacity)
            .field("channels", &self.channel_count())
            .finish()
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                capacity: capacity.max(1),
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Opens a subscription for `conversation_id`. Events published before
    /// this call are not replayed.
    pub fn subscribe(&self, conversation_id: Uuid) -> Subscription {
        let receiver = {
            let mut channels = self.inner.channels();
            channels
                .entry(conversation_id)
                .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
                .subscribe()
        };
        metrics::counter!("farmlink_feed_subscriptions_total").increment(1);
        metrics::gauge!("farmlink_feed_active_subscriptions").increment(1.0);
        debug!(%conversation_id, "feed subscription opened");

        Subscription {
            feed: Arc::clone(&self.inner),
            conversation_id,
            stream: Some(BroadcastStream::new(receiver)),
        }
    }

    /// Fans `message` out to current subscribers of its conversation.
    /// Returns how many subscribers it reached.
    pub fn publish(&self, message: Message) -> usize {
        let sender = self.inner.channels().get(&message.conversation_id).cloned();
        match sender {
            Some(sender) => sender.send(FeedSignal::Message(message)).unwrap_or(0),
            None => 0,
        }
    }

    /// Tells subscribers of `conversation_id` that events may have been
    /// missed. Returns how many subscribers it reached.
    pub fn interrupt(&self, conversation_id: Uuid) -> usize {
        let sender = self.inner.channels().get(&conversation_id).cloned();
        sender.map_or(0, |sender| sender.send(FeedSignal::Interrupted).unwrap_or(0))
    }

    /// [`ChangeFeed::interrupt`] for every open conversation channel.
    pub fn interrupt_all(&self) -> usize {
        let senders: Vec<_> = self.inner.channels().values().cloned().collect();
        let reached = senders
            .iter()
            .map(|sender| sender.send(FeedSignal::Interrupted).unwrap_or(0))
            .sum();
        metrics::counter!("farmlink_feed_interruptions_total").increment(1);
        reached
    }

    pub fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        self.inner
            .channels()
            .get(&conversation_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    pub fn channel_count(&self) -> usize {
        self.inner.channels().len()
    }
}

/// Live stream of one conversation's inserts. Dropping it unsubscribes.
pub struct Subscription {
    feed: Arc<FeedInner>,
    conversation_id: Uuid,
    stream: Option<BroadcastStream<FeedSignal>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("conversation_id", &self.conversation_id)
            .field("open", &self.stream.is_some())
            .finish()
    }
}

impl Subscription {
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Explicit unsubscribe; equivalent to dropping the handle.
    pub fn close(self) {}
}

impl Stream for Subscription {
    type Item = Result<Message, SubscriptionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(stream) = this.stream.as_mut() else {
            return Poll::Ready(None);
        };
        Pin::new(stream).poll_next(cx).map(|item| {
            item.map(|result| match result {
                Ok(FeedSignal::Message(message)) => Ok(message),
                Ok(FeedSignal::Interrupted) => Err(SubscriptionError::Interrupted),
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    metrics::counter!("farmlink_feed_lagged_events_total").increment(missed);
                    Err(SubscriptionError::Lagged(missed))
                }
            })
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Release the receiver before counting so the last subscriber sees zero.
        self.stream.take();
        let mut channels = self.feed.channels();
        if channels
            .get(&self.conversation_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(&self.conversation_id);
        }
        metrics::gauge!("farmlink_feed_active_subscriptions").decrement(1.0);
        debug!(conversation_id = %self.conversation_id, "feed subscription released");
    }
}

#[derive(Debug, Deserialize)]
struct InsertNotification {
    id: Uuid,
    conversation_id: Uuid,
}

/// Bridges Postgres `NOTIFY` into a [`ChangeFeed`], so every server node
/// sees inserts made by any other node.
#[derive(Debug)]
pub struct PgChangeRelay {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PgChangeRelay {
    /// Starts listening. The relay runs until [`PgChangeRelay::shutdown`].
    ///
    /// # Errors
    /// Fails if the initial `LISTEN` cannot be established.
    pub async fn start(
        pool: &PgPool,
        store: Arc<dyn ChatStore>,
        feed: ChangeFeed,
    ) -> Result<Self, sqlx::Error> {
        let mut listener = PgListener::connect_with(pool).await?;
        listener.listen(MESSAGE_INSERTED_CHANNEL).await?;
        info!(channel = MESSAGE_INSERTED_CHANNEL, "change relay listening");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                let notification = tokio::select! {
                    () = token.cancelled() => break,
                    received = listener.recv() => received,
                };
                match notification {
                    Ok(notification) => relay_one(notification.payload(), &*store, &feed).await,
                    Err(err) => {
                        // PgListener reconnects on the next recv, but anything
                        // notified in between is gone.
                        let reached = feed.interrupt_all();
                        warn!(error = %err, reached, "change relay lost its connection");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                }
            }
            info!("change relay stopped");
        });

        Ok(Self { cancel, handle })
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            warn!(error = %err, "change relay task ended abnormally");
        }
    }
}

async fn relay_one(payload: &str, store: &dyn ChatStore, feed: &ChangeFeed) {
    let notification: InsertNotification = match serde_json::from_str(payload) {
        Ok(notification) => notification,
        Err(err) => {
            warn!(error = %err, payload, "ignoring malformed insert notification");
            return;
        }
    };
    if feed.subscriber_count(notification.conversation_id) == 0 {
        return;
    }
    match store.message(notification.id).await {
        Ok(Some(message)) => {
            feed.publish(message);
        }
        Ok(None) => {
            warn!(message_id = %notification.id, "notified message not found");
            feed.interrupt(notification.conversation_id);
        }
        Err(err) => {
            warn!(message_id = %notification.id, error = %err, "failed to load notified message");
            feed.interrupt(notification.conversation_id);
        }
    }
}
