use std::sync::Arc;

use serde::Deserialize;
use time::Duration;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, Attempt, Question};
use crate::db::types::QuestionType;
use crate::repositories::{
    AnswerRepository, AttemptRepository, CatalogRepository, JudgingUpdate, Repositories,
    UpsertAnswer,
};
use crate::sandbox::{CaseResult, Language};
use crate::services::certificates::CertificateEvaluator;
use crate::services::{ServiceError, ServiceResult};
use crate::tasks::queues::{JudgeJob, JudgeQueue};

/// Student answer, tagged by the question type it targets.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AnswerPayload {
    SingleChoice { choice: String },
    FreeText { text: String },
    Code { language: String, source: String },
}

impl AnswerPayload {
    fn question_type(&self) -> QuestionType {
        match self {
            AnswerPayload::SingleChoice { .. } => QuestionType::SingleChoice,
            AnswerPayload::FreeText { .. } => QuestionType::FreeText,
            AnswerPayload::Code { .. } => QuestionType::Code,
        }
    }
}

pub(crate) struct SubmitAnswer {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) student_id: String,
    pub(crate) payload: AnswerPayload,
    pub(crate) is_flagged: bool,
}

pub(crate) struct CodeJudgingResult {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) passed_count: Option<u32>,
    pub(crate) total_test_cases: Option<u32>,
    pub(crate) results: Vec<CaseResult>,
    /// Set by the judge worker so a result for superseded code is discarded.
    pub(crate) expected_code: Option<String>,
}

#[derive(Clone)]
pub(crate) struct AnswerService {
    catalog: Arc<dyn CatalogRepository>,
    attempts: Arc<dyn AttemptRepository>,
    answers: Arc<dyn AnswerRepository>,
    certificates: CertificateEvaluator,
    judge_queue: JudgeQueue,
    judge_on_submit: bool,
    grace: Duration,
}

impl AnswerService {
    pub(crate) fn new(
        repositories: &Repositories,
        certificates: CertificateEvaluator,
        judge_queue: JudgeQueue,
        judge_on_submit: bool,
        submit_grace_seconds: i64,
    ) -> Self {
        Self {
            catalog: repositories.catalog.clone(),
            attempts: repositories.attempts.clone(),
            answers: repositories.answers.clone(),
            certificates,
            judge_queue,
            judge_on_submit,
            grace: Duration::seconds(submit_grace_seconds),
        }
    }

    pub(crate) async fn submit_answer(&self, request: SubmitAnswer) -> ServiceResult<Answer> {
        let attempt = self
            .attempts
            .find_by_id(&request.attempt_id)
            .await?
            .ok_or(ServiceError::NotFound("Attempt"))?;
        if attempt.student_id != request.student_id {
            return Err(ServiceError::Forbidden("Not your attempt"));
        }
        if attempt.is_submitted() {
            return Err(ServiceError::Conflict("Attempt already submitted"));
        }
        let now = primitive_now_utc();
        if attempt.expires_at.is_some_and(|expires_at| now > expires_at + self.grace) {
            return Err(ServiceError::Conflict("Attempt time is over"));
        }

        let question = self.scoped_question(&attempt, &request.question_id).await?;
        if request.payload.question_type() != question.question_type {
            return Err(ServiceError::Validation(format!(
                "Answer of type {} does not match {} question",
                request.payload.question_type().as_str(),
                question.question_type.as_str()
            )));
        }

        let answer_id = Uuid::new_v4().to_string();
        let mut upsert = UpsertAnswer {
            id: &answer_id,
            attempt_id: &attempt.id,
            question_id: &question.id,
            answer: None,
            code_submission: None,
            code_language: None,
            is_correct: None,
            points_earned: 0.0,
            is_flagged: request.is_flagged,
            submitted_at: now,
        };

        let mut judge_job = None;
        match &request.payload {
            AnswerPayload::SingleChoice { choice } => {
                let is_correct =
                    question.correct_answer.as_deref().map(|correct| correct == choice.as_str());
                upsert.answer = Some(choice.as_str());
                upsert.is_correct = is_correct;
                upsert.points_earned = if is_correct == Some(true) { question.points } else { 0.0 };
            }
            AnswerPayload::FreeText { text } => {
                upsert.answer = Some(text.as_str());
            }
            AnswerPayload::Code { language, source } => {
                let language = Language::parse(language)
                    .map_err(|err| ServiceError::Validation(err.to_string()))?;
                upsert.code_submission = Some(source.as_str());
                upsert.code_language = Some(language.as_str());
                if self.judge_on_submit && !question.test_cases.is_empty() {
                    judge_job = Some(JudgeJob {
                        attempt_id: attempt.id.clone(),
                        question_id: question.id.clone(),
                        language,
                        code: source.clone(),
                    });
                }
            }
        }

        let stored = self.answers.upsert_submission(&upsert).await?;

        metrics::counter!(
            "answers_submitted_total",
            "type" => question.question_type.as_str()
        )
        .increment(1);
        tracing::debug!(
            attempt_id = %attempt.id,
            question_id = %question.id,
            question_type = question.question_type.as_str(),
            "Answer stored"
        );

        if let Some(job) = judge_job {
            self.judge_queue.enqueue(job);
        }

        Ok(stored)
    }

    /// Applies partial credit for a judged code answer.
    ///
    /// Returns `None` when the result was computed for code the student has
    /// since replaced. Accepted after submission too, since judging is
    /// asynchronous.
    pub(crate) async fn record_code_judging_result(
        &self,
        request: CodeJudgingResult,
    ) -> ServiceResult<Option<Answer>> {
        let attempt = self
            .attempts
            .find_by_id(&request.attempt_id)
            .await?
            .ok_or(ServiceError::NotFound("Attempt"))?;
        let question = self
            .catalog
            .find_question(&request.question_id)
            .await?
            .ok_or(ServiceError::NotFound("Question"))?;
        if question.test_id != attempt.test_id || question.question_type != QuestionType::Code {
            return Err(ServiceError::Validation(
                "Question is not a code question of this test".to_string(),
            ));
        }
        if !attempt.in_scope(&question.id) {
            return Err(ServiceError::Validation(
                "Question is not part of this attempt".to_string(),
            ));
        }

        let counts = resolve_counts(request.passed_count, request.total_test_cases, &request.results)?;
        let (points_earned, is_correct) = match counts {
            Some((passed, total)) if total > 0 => {
                (partial_credit(question.points, passed, total), passed == total)
            }
            _ => {
                tracing::warn!(
                    attempt_id = %attempt.id,
                    question_id = %question.id,
                    "Judging result without test-case counts; awarding full credit"
                );
                (question.points, true)
            }
        };

        let answer_id = Uuid::new_v4().to_string();
        let stored = self
            .answers
            .record_judging(&JudgingUpdate {
                id: &answer_id,
                attempt_id: &attempt.id,
                question_id: &question.id,
                is_correct,
                points_earned,
                test_results: &request.results,
                expected_code: request.expected_code.as_deref(),
                updated_at: primitive_now_utc(),
            })
            .await?;

        let Some(stored) = stored else {
            tracing::info!(
                attempt_id = %attempt.id,
                question_id = %question.id,
                "Discarding judging result for superseded code"
            );
            return Ok(None);
        };

        tracing::info!(
            attempt_id = %attempt.id,
            question_id = %question.id,
            points_earned,
            is_correct,
            "Code judging result recorded"
        );

        if attempt.is_submitted() {
            self.certificates.spawn_evaluation(attempt.id.clone());
        }

        Ok(Some(stored))
    }

    async fn scoped_question(&self, attempt: &Attempt, question_id: &str) -> ServiceResult<Question> {
        let question = self
            .catalog
            .find_question(question_id)
            .await?
            .ok_or(ServiceError::NotFound("Question"))?;
        if question.test_id != attempt.test_id || !attempt.in_scope(&question.id) {
            return Err(ServiceError::Validation(
                "Question is not part of this attempt".to_string(),
            ));
        }
        Ok(question)
    }
}

/// `points × passed / total`.
pub(crate) fn partial_credit(points: f64, passed: u32, total: u32) -> f64 {
    if total == 0 {
        return points;
    }
    points * f64::from(passed) / f64::from(total)
}

/// Explicit counts win; otherwise they are derived from the per-case results.
/// A count without its partner is rejected.
fn resolve_counts(
    passed: Option<u32>,
    total: Option<u32>,
    results: &[CaseResult],
) -> ServiceResult<Option<(u32, u32)>> {
    let counts = match (passed, total) {
        (Some(passed), Some(total)) => Some((passed, total)),
        (Some(_), None) | (None, Some(_)) => {
            return Err(ServiceError::Validation(
                "passed_count and total_test_cases must be provided together".to_string(),
            ));
        }
        (None, None) if !results.is_empty() => {
            let passed = results.iter().filter(|result| result.passed).count() as u32;
            Some((passed, results.len() as u32))
        }
        _ => None,
    };

    if let Some((passed, total)) = counts {
        if passed > total {
            return Err(ServiceError::Validation(format!(
                "passed_count ({passed}) exceeds total_test_cases ({total})"
            )));
        }
    }
    Ok(counts)
}
