use axum::{body::Body, http::Request, response::Response};
use std::time::Duration;
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{DefaultOnBodyChunk, DefaultOnEos, MakeSpan, TraceLayer};
use tracing::{Span, error, info};

use crate::middleware::request_context::RequestContext;

type TraceLayerType = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    HttpMakeSpan,
    fn(&Request<Body>, &Span),
    fn(&Response<Body>, Duration, &Span),
    DefaultOnBodyChunk,
    DefaultOnEos,
    fn(ServerErrorsFailureClass, Duration, &Span),
>;

/// Opens one span per request. `party` is filled in by the identity
/// middleware once the caller is known.
#[derive(Clone, Debug, Default)]
pub(crate) struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .map_or_else(|| "n/a".into(), |ctx| ctx.request_id.clone());

        tracing::info_span!(
            "http_request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id,
            party = tracing::field::Empty,
            status_code = tracing::field::Empty
        )
    }
}

pub(crate) fn on_request_handler(req: &Request<Body>, span: &Span) {
    span.in_scope(|| {
        info!(
            method = %req.method(),
            path = %req.uri().path(),
            version = ?req.version(),
            "started processing request"
        );
    });
}

pub(crate) fn on_response_handler(response: &Response<Body>, latency: Duration, span: &Span) {
    let status = response.status().as_u16();
    span.record("status_code", status);
    metrics::histogram!("farmlink_http_request_duration_seconds", "status" => status.to_string())
        .record(latency.as_secs_f64());
    span.in_scope(|| {
        info!(status, latency_ms = latency.as_millis(), "finished processing request");
    });
}

pub(crate) fn on_failure_handler(error: ServerErrorsFailureClass, latency: Duration, span: &Span) {
    span.in_scope(|| {
        error!(error = %error, latency = ?latency, "error processing request");
    });
}

pub fn create_trace_layer() -> TraceLayerType {
    TraceLayer::new_for_http()
        .make_span_with(HttpMakeSpan)
        .on_request(on_request_handler as fn(&Request<Body>, &Span))
        .on_response(on_response_handler as fn(&Response<Body>, Duration, &Span))
        .on_failure(on_failure_handler as fn(ServerErrorsFailureClass, Duration, &Span))
}
