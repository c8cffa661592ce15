use std::time::Duration;

use axum::{
    body::Body,
    http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN},
    http::{HeaderName, Method, Request, Response},
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

use crate::api::{attempts, code, handlers};
use crate::core::{config::Settings, state::AppState};

const REQUEST_ID: &str = "x-request-id";

pub(crate) fn router(state: AppState) -> Router {
    let settings = state.settings();
    let api_v1 =
        Router::new().nest("/attempts", attempts::router()).nest("/code", code::router());

    let mut router: Router<AppState> = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest(&settings.api().api_v1_str, api_v1);
    if settings.telemetry().prometheus_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    let request_id = HeaderName::from_static(REQUEST_ID);
    router
        .layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(TraceLayer::new_for_http().make_span_with(RequestSpan).on_response(RecordResponse))
        .layer(cors_layer(settings))
        .with_state(state)
}

#[derive(Clone, Copy)]
struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id
        )
    }
}

/// Feeds the request counters and latency histogram.
#[derive(Clone, Copy)]
struct RecordResponse;

impl OnResponse<Body> for RecordResponse {
    fn on_response(self, response: &Response<Body>, latency: Duration, _span: &Span) {
        let status = response.status().as_u16().to_string();
        metrics::counter!("http_requests_total", "status" => status.clone()).increment(1);
        metrics::histogram!("http_request_duration_seconds", "status" => status)
            .record(latency.as_secs_f64());
        if response.status().is_server_error() {
            tracing::warn!(status = response.status().as_u16(), ?latency, "Request failed");
        }
    }
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let request_id = HeaderName::from_static(REQUEST_ID);
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, ORIGIN, request_id.clone()])
        .expose_headers([request_id])
        .max_age(Duration::from_secs(3600));

    let origins: Vec<HeaderValue> = settings
        .cors()
        .origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    // Credentials cannot be combined with a wildcard origin.
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_credentials(true).allow_origin(AllowOrigin::list(origins))
    }
}
