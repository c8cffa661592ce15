mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(handlers::start_attempt))
        .route("/answer", post(handlers::submit_answer))
        .route("/submit", post(handlers::submit_attempt))
        .route("/mark-code-correct", post(handlers::mark_code_correct))
        .route("/:attempt_id", get(handlers::get_attempt))
        .route("/:attempt_id/review", get(handlers::review_attempt))
        .route("/:attempt_id/violation", post(handlers::report_violation))
        .route("/:attempt_id/certificate", post(handlers::evaluate_certificate))
}
