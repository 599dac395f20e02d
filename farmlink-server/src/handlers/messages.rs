use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use shared::models::SendMessageRequest;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_state::AppState, http::error::AppResult, middleware::request_context::RequestContext,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/conversations/{conversation_id}/messages",
        get(message_history).post(send_message),
    )
}

#[instrument(skip(state, context))]
async fn message_history(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let caller = context.require_party()?;
    let messages = state.messages.history(caller, conversation_id).await?;
    Ok(Json(messages))
}

#[instrument(skip(state, context, payload))]
async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> AppResult<impl IntoResponse> {
    let caller = context.require_party()?;
    let sender = payload.sender_id.as_ref().unwrap_or(caller);
    let message = state
        .messages
        .send(caller, conversation_id, sender, &payload.body)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}
