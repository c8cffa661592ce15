use async_trait::async_trait;
use sqlx::types::Json;
use time::PrimitiveDateTime;

use crate::db::models::Answer;
use crate::repositories::{PgStore, RepoResult};
use crate::sandbox::CaseResult;

const COLUMNS: &str = "\
    id, attempt_id, question_id, answer, code_submission, code_language, is_correct, \
    points_earned, test_results, is_flagged, submitted_at, updated_at";

const JOINED_COLUMNS: &str = "\
    a.id, a.attempt_id, a.question_id, a.answer, a.code_submission, a.code_language, \
    a.is_correct, a.points_earned, a.test_results, a.is_flagged, a.submitted_at, a.updated_at";

/// Full replacement of a student's answer for one question.
pub(crate) struct UpsertAnswer<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) answer: Option<&'a str>,
    pub(crate) code_submission: Option<&'a str>,
    pub(crate) code_language: Option<&'a str>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_earned: f64,
    pub(crate) is_flagged: bool,
    pub(crate) submitted_at: PrimitiveDateTime,
}

/// Grading fields only; the raw answer and the review flag are left alone.
pub(crate) struct JudgingUpdate<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) is_correct: bool,
    pub(crate) points_earned: f64,
    pub(crate) test_results: &'a [CaseResult],
    /// When set, the update applies only if the stored code still matches.
    pub(crate) expected_code: Option<&'a str>,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[async_trait]
pub(crate) trait AnswerRepository: Send + Sync {
    async fn upsert_submission(&self, answer: &UpsertAnswer<'_>) -> RepoResult<Answer>;

    /// Returns `None` when `expected_code` no longer matches the stored submission.
    async fn record_judging(&self, update: &JudgingUpdate<'_>) -> RepoResult<Option<Answer>>;

    async fn list_by_attempt(&self, attempt_id: &str) -> RepoResult<Vec<Answer>>;

    async fn find(&self, attempt_id: &str, question_id: &str) -> RepoResult<Option<Answer>>;

    /// Code answers with no verdict whose question has test cases, oldest first.
    async fn list_unjudged_code(&self, limit: usize) -> RepoResult<Vec<Answer>>;
}

#[async_trait]
impl AnswerRepository for PgStore {
    async fn upsert_submission(&self, answer: &UpsertAnswer<'_>) -> RepoResult<Answer> {
        let empty_results: Vec<CaseResult> = Vec::new();
        let stored = sqlx::query_as::<_, Answer>(&format!(
            "INSERT INTO answers (id, attempt_id, question_id, answer, code_submission, \
             code_language, is_correct, points_earned, test_results, is_flagged, \
             submitted_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
             ON CONFLICT (attempt_id, question_id) DO UPDATE SET \
                answer = EXCLUDED.answer, \
                code_submission = EXCLUDED.code_submission, \
                code_language = EXCLUDED.code_language, \
                is_correct = EXCLUDED.is_correct, \
                points_earned = EXCLUDED.points_earned, \
                test_results = EXCLUDED.test_results, \
                is_flagged = EXCLUDED.is_flagged, \
                submitted_at = EXCLUDED.submitted_at, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {COLUMNS}"
        ))
        .bind(answer.id)
        .bind(answer.attempt_id)
        .bind(answer.question_id)
        .bind(answer.answer)
        .bind(answer.code_submission)
        .bind(answer.code_language)
        .bind(answer.is_correct)
        .bind(answer.points_earned)
        .bind(Json(&empty_results))
        .bind(answer.is_flagged)
        .bind(answer.submitted_at)
        .fetch_one(self.pool())
        .await?;
        Ok(stored)
    }

    async fn record_judging(&self, update: &JudgingUpdate<'_>) -> RepoResult<Option<Answer>> {
        let stored = sqlx::query_as::<_, Answer>(&format!(
            "INSERT INTO answers (id, attempt_id, question_id, is_correct, points_earned, \
             test_results, is_flagged, submitted_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, $7) \
             ON CONFLICT (attempt_id, question_id) DO UPDATE SET \
                is_correct = EXCLUDED.is_correct, \
                points_earned = EXCLUDED.points_earned, \
                test_results = EXCLUDED.test_results, \
                updated_at = EXCLUDED.updated_at \
             WHERE $8::text IS NULL OR answers.code_submission = $8 \
             RETURNING {COLUMNS}"
        ))
        .bind(update.id)
        .bind(update.attempt_id)
        .bind(update.question_id)
        .bind(update.is_correct)
        .bind(update.points_earned)
        .bind(Json(update.test_results))
        .bind(update.updated_at)
        .bind(update.expected_code)
        .fetch_optional(self.pool())
        .await?;
        Ok(stored)
    }

    async fn list_by_attempt(&self, attempt_id: &str) -> RepoResult<Vec<Answer>> {
        let answers = sqlx::query_as::<_, Answer>(&format!(
            "SELECT {COLUMNS} FROM answers WHERE attempt_id = $1 ORDER BY submitted_at, id"
        ))
        .bind(attempt_id)
        .fetch_all(self.pool())
        .await?;
        Ok(answers)
    }

    async fn find(&self, attempt_id: &str, question_id: &str) -> RepoResult<Option<Answer>> {
        let answer = sqlx::query_as::<_, Answer>(&format!(
            "SELECT {COLUMNS} FROM answers WHERE attempt_id = $1 AND question_id = $2"
        ))
        .bind(attempt_id)
        .bind(question_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(answer)
    }

    async fn list_unjudged_code(&self, limit: usize) -> RepoResult<Vec<Answer>> {
        let answers = sqlx::query_as::<_, Answer>(&format!(
            "SELECT {JOINED_COLUMNS} FROM answers a \
             JOIN questions q ON q.id = a.question_id \
             WHERE a.code_submission IS NOT NULL AND a.is_correct IS NULL \
               AND q.question_type = 'code' AND jsonb_array_length(q.test_cases) > 0 \
             ORDER BY a.updated_at, a.id \
             LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool())
        .await?;
        Ok(answers)
    }
}
