use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

use crate::core::time::{deadline, primitive_now_utc};
use crate::db::models::{Answer, Attempt, Question, Test, User, Violation};
use crate::db::types::AttemptStatus;
use crate::repositories::{
    AnswerRepository, AttemptRepository, CatalogRepository, NewAttempt, Repositories,
    ViolationRepository,
};
use crate::services::certificates::CertificateEvaluator;
use crate::services::scoring::{compute_score, scope_questions, ScoreAggregator, ScoreSummary};
use crate::services::selection::select_questions;
use crate::services::{ServiceError, ServiceResult};

pub(crate) struct StartAttempt {
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) platform: Option<String>,
    pub(crate) browser: Option<String>,
    pub(crate) device_info: serde_json::Value,
}

#[derive(Debug)]
pub(crate) struct StartOutcome {
    pub(crate) attempt: Attempt,
    /// `false` when an existing in-progress attempt was returned.
    pub(crate) created: bool,
}

#[derive(Debug)]
pub(crate) struct SubmitOutcome {
    pub(crate) attempt: Attempt,
    pub(crate) summary: ScoreSummary,
}

#[derive(Debug)]
pub(crate) struct AttemptReview {
    pub(crate) attempt: Attempt,
    pub(crate) test: Test,
    pub(crate) questions: Vec<Question>,
    pub(crate) answers: Vec<Answer>,
    pub(crate) summary: ScoreSummary,
    /// Only loaded for staff viewers.
    pub(crate) violations: Vec<Violation>,
}

#[derive(Clone)]
pub(crate) struct AttemptService {
    catalog: Arc<dyn CatalogRepository>,
    attempts: Arc<dyn AttemptRepository>,
    answers: Arc<dyn AnswerRepository>,
    violations: Arc<dyn ViolationRepository>,
    scores: ScoreAggregator,
    certificates: CertificateEvaluator,
}

impl AttemptService {
    pub(crate) fn new(
        repositories: &Repositories,
        scores: ScoreAggregator,
        certificates: CertificateEvaluator,
    ) -> Self {
        Self {
            catalog: repositories.catalog.clone(),
            attempts: repositories.attempts.clone(),
            answers: repositories.answers.clone(),
            violations: repositories.violations.clone(),
            scores,
            certificates,
        }
    }

    pub(crate) async fn start(&self, request: StartAttempt) -> ServiceResult<StartOutcome> {
        let mut rng = StdRng::from_entropy();
        self.start_with_rng(request, &mut rng).await
    }

    pub(crate) async fn start_with_rng(
        &self,
        request: StartAttempt,
        rng: &mut StdRng,
    ) -> ServiceResult<StartOutcome> {
        let test_id = request.test_id.trim();
        if test_id.is_empty() {
            return Err(ServiceError::Validation("test_id is required".to_string()));
        }

        let test = self.catalog.find_test(test_id).await?.ok_or(ServiceError::NotFound("Test"))?;
        check_restrictions(&test, request.platform.as_deref(), request.browser.as_deref())?;

        if let Some(existing) = self.attempts.find_in_progress(&test.id, &request.student_id).await?
        {
            return Ok(StartOutcome { attempt: existing, created: false });
        }

        if let Some(max) = test.attempt_limit() {
            let used = self.attempts.count_submitted(&test.id, &request.student_id).await?;
            if used >= max {
                return Err(ServiceError::AttemptLimitExceeded { max });
            }
        }

        let questions = self.catalog.list_questions(&test.id).await?;
        let question_ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        let selected = select_questions(test.questions_to_ask, &question_ids, rng);
        let total_points: f64 = match &selected {
            Some(ids) => {
                questions.iter().filter(|q| ids.contains(&q.id)).map(|q| q.points).sum()
            }
            None => questions.iter().map(|q| q.points).sum(),
        };

        let attempt_id = Uuid::new_v4().to_string();
        let started_at = primitive_now_utc();
        let inserted = self
            .attempts
            .insert_in_progress(&NewAttempt {
                id: &attempt_id,
                test_id: &test.id,
                student_id: &request.student_id,
                selected_question_ids: selected.as_deref(),
                platform: request.platform.as_deref(),
                browser: request.browser.as_deref(),
                device_info: &request.device_info,
                total_points,
                started_at,
                expires_at: deadline(started_at, test.duration_minutes),
            })
            .await?;

        if !inserted {
            // A concurrent start won the partial unique index.
            let winner = self
                .attempts
                .find_in_progress(&test.id, &request.student_id)
                .await?
                .ok_or(ServiceError::Conflict("Attempt could not be started, retry"))?;
            return Ok(StartOutcome { attempt: winner, created: false });
        }

        let attempt =
            self.attempts.find_by_id(&attempt_id).await?.ok_or(ServiceError::NotFound("Attempt"))?;

        metrics::counter!("attempts_started_total").increment(1);
        tracing::info!(
            attempt_id = %attempt.id,
            test_id = %attempt.test_id,
            student_id = %attempt.student_id,
            scoped = attempt.selected_question_ids.is_some(),
            "Attempt started"
        );

        Ok(StartOutcome { attempt, created: true })
    }

    /// Single-shot transition to `Submitted`; the certificate check runs in the background.
    pub(crate) async fn submit(
        &self,
        attempt_id: &str,
        student_id: &str,
    ) -> ServiceResult<SubmitOutcome> {
        let mut attempt =
            self.attempts.find_by_id(attempt_id).await?.ok_or(ServiceError::NotFound("Attempt"))?;
        if attempt.student_id != student_id {
            return Err(ServiceError::Forbidden("Not your attempt"));
        }
        if attempt.is_submitted() {
            return Err(ServiceError::Conflict("Attempt already submitted"));
        }

        let summary = self.scores.compute(&attempt).await?;
        let submitted_at = primitive_now_utc();
        let transitioned = self
            .attempts
            .mark_submitted(&attempt.id, summary.score, summary.total_points, submitted_at)
            .await?;
        if !transitioned {
            return Err(ServiceError::Conflict("Attempt already submitted"));
        }

        attempt.status = AttemptStatus::Submitted;
        attempt.score = Some(summary.score);
        attempt.total_points = summary.total_points;
        attempt.submitted_at = Some(submitted_at);
        attempt.updated_at = submitted_at;

        metrics::counter!("attempts_submitted_total").increment(1);
        tracing::info!(
            attempt_id = %attempt.id,
            score = summary.score,
            total_points = summary.total_points,
            pending = summary.pending,
            "Attempt submitted"
        );

        self.certificates.spawn_evaluation(attempt.id.clone());

        Ok(SubmitOutcome { attempt, summary })
    }

    /// Staff see every attempt; a student only their own.
    pub(crate) async fn get_for_viewer(&self, attempt_id: &str, viewer: &User) -> ServiceResult<Attempt> {
        let attempt =
            self.attempts.find_by_id(attempt_id).await?.ok_or(ServiceError::NotFound("Attempt"))?;
        if !viewer.is_staff() && attempt.student_id != viewer.id {
            return Err(ServiceError::Forbidden("Not your attempt"));
        }
        Ok(attempt)
    }

    /// Live view: the score is recomputed from the current answer rows.
    pub(crate) async fn review(&self, attempt_id: &str, viewer: &User) -> ServiceResult<AttemptReview> {
        let attempt = self.get_for_viewer(attempt_id, viewer).await?;
        let test =
            self.catalog.find_test(&attempt.test_id).await?.ok_or(ServiceError::NotFound("Test"))?;

        if !viewer.is_staff() {
            if !attempt.is_submitted() {
                return Err(ServiceError::Conflict("Attempt is not submitted yet"));
            }
            if !test.show_review {
                return Err(ServiceError::Forbidden("Review is disabled for this test"));
            }
        }

        let questions = scope_questions(&attempt, self.catalog.list_questions(&test.id).await?);
        let answers = self.answers.list_by_attempt(&attempt.id).await?;
        let summary = compute_score(&questions, &answers);
        let violations = if viewer.is_staff() {
            self.violations.list_by_attempt(&attempt.id).await?
        } else {
            Vec::new()
        };

        Ok(AttemptReview { attempt, test, questions, answers, summary, violations })
    }
}

fn check_restrictions(
    test: &Test,
    platform: Option<&str>,
    browser: Option<&str>,
) -> ServiceResult<()> {
    if !is_allowed(&test.allowed_platforms, platform) {
        return Err(ServiceError::RestrictionViolation(format!(
            "Platform '{}' is not allowed for this test",
            platform.unwrap_or("unknown")
        )));
    }
    if !is_allowed(&test.allowed_browsers, browser) {
        return Err(ServiceError::RestrictionViolation(format!(
            "Browser '{}' is not allowed for this test",
            browser.unwrap_or("unknown")
        )));
    }
    Ok(())
}

/// An empty allow-list admits everything; otherwise a missing value is rejected.
fn is_allowed(allowed: &[String], value: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
        return false;
    };
    allowed.iter().any(|item| item.trim().eq_ignore_ascii_case(value))
}
