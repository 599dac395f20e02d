use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use shared::models::{ResolveConversationRequest, ResolveConversationResponse};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_state::AppState, http::error::AppResult, middleware::request_context::RequestContext,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/conversations/resolve", post(resolve_conversation))
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/{conversation_id}", get(conversation_detail))
}

/// "Contact seller": finds or creates the conversation with another party.
/// 201 when this request created it, 200 otherwise.
#[instrument(skip(state, context, payload))]
async fn resolve_conversation(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Json(payload): Json<ResolveConversationRequest>,
) -> AppResult<impl IntoResponse> {
    let caller = context.require_party()?;
    let resolution = state
        .conversations
        .resolve(caller, &payload.other_party, payload.topic_id)
        .await?;

    let status = if resolution.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(ResolveConversationResponse {
            conversation_id: resolution.conversation.id,
            created: resolution.created,
        }),
    ))
}

#[instrument(skip(state, context))]
async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
) -> AppResult<impl IntoResponse> {
    let caller = context.require_party()?;
    let summaries = state.conversations.list_for(caller).await?;
    Ok(Json(summaries))
}

#[instrument(skip(state, context))]
async fn conversation_detail(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let caller = context.require_party()?;
    let detail = state.conversations.detail(caller, conversation_id).await?;
    Ok(Json(detail))
}
