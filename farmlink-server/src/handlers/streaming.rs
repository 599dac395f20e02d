//! Live conversation feed over server-sent events.
//!
//! Each `message` event carries one inserted [`shared::models::Message`]. When
//! the subscriber falls behind, a `resync` event tells the client to refetch
//! history instead of silently skipping messages.

use std::{convert::Infallible, sync::Arc};

use axum::{
    Router,
    extract::{Extension, Path, State},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use futures_util::{Stream, StreamExt};
use shared::models::FeedEvent;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    http::error::AppResult,
    middleware::request_context::RequestContext,
    realtime::{Subscription, SubscriptionError},
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/conversations/{conversation_id}/stream",
        get(conversation_stream),
    )
}

#[instrument(skip(state, context))]
async fn conversation_stream(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let caller = context.require_party()?;
    let subscription = state.messages.subscribe(caller, conversation_id).await?;
    info!(conversation_id = %conversation_id, party = %caller, "live feed opened");

    let keepalive = KeepAlive::new()
        .interval(state.config.chat.heartbeat())
        .text("keep-alive");
    Ok(Sse::new(sse_events(subscription)).keep_alive(keepalive))
}

pub(crate) fn sse_events(
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, Infallible>> {
    subscription.filter_map(|item| async move {
        let (id, event) = match item {
            Ok(message) => (
                Some(message.id.to_string()),
                FeedEvent::Message { message },
            ),
            Err(SubscriptionError::Lagged(missed)) => {
                warn!(missed, "live feed subscriber lagged; asking client to resync");
                (None, FeedEvent::Resync { missed })
            }
            Err(SubscriptionError::Interrupted) => {
                warn!("live feed source interrupted; asking client to resync");
                (None, FeedEvent::Resync { missed: 0 })
            }
        };
        encode(id, &event).map(Ok)
    })
}

fn encode(id: Option<String>, event: &FeedEvent) -> Option<Event> {
    let data = match serde_json::to_string(event) {
        Ok(data) => data,
        Err(err) => {
            warn!(error = %err, "failed to encode feed event");
            return None;
        }
    };
    let mut builder = Event::default().event(event.event_name());
    if let Some(id) = id {
        builder = builder.id(id);
    }
    Some(builder.data(data))
}
