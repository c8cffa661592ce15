use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStaff, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::ViolationType;
use crate::schemas::attempt::{
    AnswerResponse, AttemptResponse, EvaluationResponse, MarkCodeCorrectRequest,
    MarkCodeCorrectResponse, QuestionView, ReviewResponse, StartAttemptRequest,
    StartAttemptResponse, SubmitAnswerRequest, SubmitAttemptRequest, SubmitAttemptResponse,
    ViolationAccepted, ViolationRequest,
};
use crate::services::answers::{CodeJudgingResult, SubmitAnswer};
use crate::services::attempts::StartAttempt;
use crate::services::scoring::scope_questions;
use crate::tasks::queues::ViolationReport;

pub(super) async fn start_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<StartAttemptRequest>,
) -> Result<(StatusCode, Json<StartAttemptResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = state
        .services()
        .attempts
        .start(StartAttempt {
            test_id: payload.test_id,
            student_id: user.id.clone(),
            platform: payload.platform,
            browser: payload.browser,
            device_info: payload.device_info,
        })
        .await?;

    let questions = state
        .repositories()
        .catalog
        .list_questions(&outcome.attempt.test_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load questions"))?;
    let questions = scope_questions(&outcome.attempt, questions)
        .into_iter()
        .map(|question| QuestionView::new(question, user.is_staff()))
        .collect();

    let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(StartAttemptResponse { attempt: outcome.attempt.into(), questions })))
}

pub(super) async fn submit_answer(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let answer = state
        .services()
        .answers
        .submit_answer(SubmitAnswer {
            attempt_id: payload.attempt_id,
            question_id: payload.question_id,
            student_id: user.id,
            payload: payload.answer,
            is_flagged: payload.is_flagged,
        })
        .await?;

    Ok(Json(answer.into()))
}

pub(super) async fn submit_attempt(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<Json<SubmitAttemptResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = state.services().attempts.submit(&payload.attempt_id, &user.id).await?;

    Ok(Json(SubmitAttemptResponse { attempt: outcome.attempt.into(), summary: outcome.summary }))
}

/// Manual or external judging result for a code answer.
pub(super) async fn mark_code_correct(
    CurrentStaff(staff): CurrentStaff,
    State(state): State<AppState>,
    Json(payload): Json<MarkCodeCorrectRequest>,
) -> Result<Json<MarkCodeCorrectResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        staff_id = %staff.id,
        attempt_id = %payload.attempt_id,
        question_id = %payload.question_id,
        "Recording code judging result"
    );

    let answer = state
        .services()
        .answers
        .record_code_judging_result(CodeJudgingResult {
            attempt_id: payload.attempt_id,
            question_id: payload.question_id,
            passed_count: payload.passed_count,
            total_test_cases: payload.total_test_cases,
            results: payload.test_results,
            expected_code: None,
        })
        .await?;

    Ok(Json(MarkCodeCorrectResponse {
        applied: answer.is_some(),
        answer: answer.map(AnswerResponse::from),
    }))
}

pub(super) async fn get_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AttemptResponse>, ApiError> {
    let attempt = state.services().attempts.get_for_viewer(&attempt_id, &user).await?;
    Ok(Json(attempt.into()))
}

pub(super) async fn review_attempt(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let review = state.services().attempts.review(&attempt_id, &user).await?;
    let with_solutions = user.is_staff();

    Ok(Json(ReviewResponse {
        attempt: review.attempt.into(),
        test_title: review.test.title,
        questions: review
            .questions
            .into_iter()
            .map(|question| QuestionView::new(question, with_solutions))
            .collect(),
        answers: review.answers.into_iter().map(AnswerResponse::from).collect(),
        summary: review.summary,
        violations: review.violations,
    }))
}

/// Always `202`: the report is persisted by the background worker.
pub(super) async fn report_violation(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ViolationRequest>,
) -> Result<(StatusCode, Json<ViolationAccepted>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let accepted = state.violation_queue().enqueue(ViolationReport {
        attempt_id,
        student_id: user.id,
        violation_type: ViolationType::from_label(&payload.violation_type),
        details: payload.details,
        occurred_at: payload.timestamp.unwrap_or_else(primitive_now_utc),
    });

    Ok((StatusCode::ACCEPTED, Json(ViolationAccepted { accepted })))
}

pub(super) async fn evaluate_certificate(
    Path(attempt_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let attempt = state.services().attempts.get_for_viewer(&attempt_id, &user).await?;
    let evaluation = state.services().certificates.evaluate(&attempt.id).await?;
    Ok(Json(evaluation.into()))
}
