use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use cookie::Cookie;
use tracing::{Span, debug, warn};

use crate::{
    app_state::AppState,
    http::error::ApiError,
    identity::IdentityError,
    middleware::request_context::RequestContext,
};

/// Resolves the caller through the configured [`crate::identity::IdentityProvider`]
/// and records it in the [`RequestContext`]. Anything short of a verified
/// identity is a 401.
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let credential =
        bearer_token(req.headers()).or_else(|| session_cookie(req.headers(), state.cookie_name()));

    let outcome = match credential {
        Some(credential) => state.identity.current_party(&credential).await,
        None => Err(IdentityError::MissingCredentials),
    };

    let party = match outcome {
        Ok(party) => party,
        Err(err) => {
            if let IdentityError::Lookup(reason) = &err {
                warn!(reason = %reason, "identity provider failed; rejecting request");
            } else {
                debug!(error = %err, path = %req.uri().path(), "unauthenticated request");
            }
            metrics::counter!("farmlink_auth_rejections_total").increment(1);
            return ApiError::from(err).into_response();
        }
    };

    Span::current().record("party", party.as_str());
    if let Some(context) = req.extensions_mut().get_mut::<RequestContext>() {
        context.party = Some(party);
    } else {
        req.extensions_mut().insert(RequestContext {
            request_id: String::new(),
            party: Some(party),
        });
    }

    next.run(req).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(header::COOKIE)?.to_str().ok()?;
    Cookie::split_parse(value)
        .flatten()
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}
