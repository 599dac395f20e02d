//! Client side of the conversation event stream.
//!
//! [`LiveFeed`] owns a background task that keeps one stream open,
//! reconnecting after a delay whenever it drops. Dropping the handle stops
//! the task and closes the connection.

use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use shared::models::FeedEvent;
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::api::{ApiClient, is_retryable};

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental `text/event-stream` decoder. Chunks may split lines anywhere.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseParser {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(end) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw[..end]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(frame) = self.line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveUpdate {
    /// The stream is open. Events published while disconnected are lost, so
    /// a reconnect should be followed by a history refetch.
    Connected,
    Event(FeedEvent),
    Disconnected { reason: String, retrying: bool },
}

#[derive(Debug)]
pub struct LiveFeed {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl LiveFeed {
    pub fn spawn(
        api: ApiClient,
        conversation_id: Uuid,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::Receiver<LiveUpdate>) {
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_feed(
            api,
            conversation_id,
            reconnect_delay,
            tx,
            cancel.clone(),
        ));
        (Self { cancel, handle }, rx)
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

async fn run_feed(
    api: ApiClient,
    conversation_id: Uuid,
    reconnect_delay: Duration,
    tx: mpsc::Sender<LiveUpdate>,
    cancel: CancellationToken,
) {
    loop {
        let outcome = tokio::select! {
            () = cancel.cancelled() => return,
            outcome = stream_once(&api, conversation_id, &tx) => outcome,
        };
        if tx.is_closed() {
            return;
        }
        let (reason, retrying) = match outcome {
            Ok(()) => ("stream closed by server".to_string(), true),
            Err(err) => (format!("{err:#}"), is_retryable(&err)),
        };
        if tx
            .send(LiveUpdate::Disconnected { reason, retrying })
            .await
            .is_err()
            || !retrying
        {
            return;
        }
        tokio::select! {
            () = cancel.cancelled() => return,
            () = sleep(reconnect_delay) => {}
        }
    }
}

async fn stream_once(
    api: &ApiClient,
    conversation_id: Uuid,
    tx: &mpsc::Sender<LiveUpdate>,
) -> Result<()> {
    let response = api.open_stream(conversation_id).await?;
    if tx.send(LiveUpdate::Connected).await.is_err() {
        return Ok(());
    }

    let mut parser = SseParser::default();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        for frame in parser.push(&chunk?) {
            let Some(event) = decode_frame(&frame) else {
                continue;
            };
            if tx.send(LiveUpdate::Event(event)).await.is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}

fn decode_frame(frame: &SseFrame) -> Option<FeedEvent> {
    match frame.event.as_str() {
        "message" | "resync" => serde_json::from_str(&frame.data).ok(),
        _ => None,
    }
}
