use std::sync::Arc;

use axum::{Router, middleware};
use tracing::info;

use crate::{
    app_state::AppState,
    handlers::{conversations, messages, streaming},
    middleware::auth::require_identity,
};

/// Every chat route, behind the identity check.
pub fn create_router_protected(state: Arc<AppState>) -> Router<Arc<AppState>> {
    info!("Creating protected router");
    Router::new()
        .merge(conversations::routes())
        .merge(messages::routes())
        .merge(streaming::routes())
        .route_layer(middleware::from_fn_with_state(state, require_identity))
}
