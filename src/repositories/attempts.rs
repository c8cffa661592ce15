use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;
use crate::repositories::{PgStore, RepoResult};

const COLUMNS: &str = "\
    id, test_id, student_id, status, selected_question_ids, platform, browser, device_info, \
    score, total_points, violation_count, window_switch_count, screenshot_count, \
    phone_call_count, other_violation_count, started_at, expires_at, submitted_at, \
    created_at, updated_at";

pub(crate) struct NewAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) test_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) selected_question_ids: Option<&'a [String]>,
    pub(crate) platform: Option<&'a str>,
    pub(crate) browser: Option<&'a str>,
    pub(crate) device_info: &'a Value,
    pub(crate) total_points: f64,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: Option<PrimitiveDateTime>,
}

#[async_trait]
pub(crate) trait AttemptRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Attempt>>;

    async fn find_in_progress(&self, test_id: &str, student_id: &str)
        -> RepoResult<Option<Attempt>>;

    async fn count_submitted(&self, test_id: &str, student_id: &str) -> RepoResult<i64>;

    /// Returns `false` when another in-progress attempt for the pair already exists.
    async fn insert_in_progress(&self, attempt: &NewAttempt<'_>) -> RepoResult<bool>;

    /// Moves an in-progress attempt to submitted; `false` when it was not in progress.
    async fn mark_submitted(
        &self,
        id: &str,
        score: f64,
        total_points: f64,
        submitted_at: PrimitiveDateTime,
    ) -> RepoResult<bool>;
}

#[derive(FromRow)]
struct AttemptRow {
    id: String,
    test_id: String,
    student_id: String,
    status: AttemptStatus,
    selected_question_ids: Option<Json<Value>>,
    platform: Option<String>,
    browser: Option<String>,
    device_info: Json<Value>,
    score: Option<f64>,
    total_points: f64,
    violation_count: i32,
    window_switch_count: i32,
    screenshot_count: i32,
    phone_call_count: i32,
    other_violation_count: i32,
    started_at: PrimitiveDateTime,
    expires_at: Option<PrimitiveDateTime>,
    submitted_at: Option<PrimitiveDateTime>,
    created_at: PrimitiveDateTime,
    updated_at: PrimitiveDateTime,
}

impl From<AttemptRow> for Attempt {
    fn from(row: AttemptRow) -> Self {
        let selected_question_ids =
            canonical_scope(&row.id, row.selected_question_ids.map(|Json(value)| value));
        Attempt {
            id: row.id,
            test_id: row.test_id,
            student_id: row.student_id,
            status: row.status,
            selected_question_ids,
            platform: row.platform,
            browser: row.browser,
            device_info: row.device_info.0,
            score: row.score,
            total_points: row.total_points,
            violation_count: row.violation_count,
            window_switch_count: row.window_switch_count,
            screenshot_count: row.screenshot_count,
            phone_call_count: row.phone_call_count,
            other_violation_count: row.other_violation_count,
            started_at: row.started_at,
            expires_at: row.expires_at,
            submitted_at: row.submitted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Reads the stored subset as a JSON array of ids.
///
/// Older rows hold the array serialized into a JSON string. Anything that does not
/// parse is read as "no subset" so the attempt falls back to the full question set;
/// an explicit empty array stays an empty scope.
pub(crate) fn canonical_scope(attempt_id: &str, raw: Option<Value>) -> Option<Vec<String>> {
    let parsed = match raw? {
        Value::Null => return None,
        Value::Array(items) => string_ids(items),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => string_ids(items),
            _ => None,
        },
        _ => None,
    };

    if parsed.is_none() {
        tracing::warn!(attempt_id, "Unparseable selected_question_ids; using all questions");
    }
    parsed
}

fn string_ids(items: Vec<Value>) -> Option<Vec<String>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(id) => Some(id),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl AttemptRepository for PgStore {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Attempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {COLUMNS} FROM attempts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Attempt::from))
    }

    async fn find_in_progress(
        &self,
        test_id: &str,
        student_id: &str,
    ) -> RepoResult<Option<Attempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {COLUMNS} FROM attempts \
             WHERE test_id = $1 AND student_id = $2 AND status = $3"
        ))
        .bind(test_id)
        .bind(student_id)
        .bind(AttemptStatus::InProgress)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(Attempt::from))
    }

    async fn count_submitted(&self, test_id: &str, student_id: &str) -> RepoResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attempts WHERE test_id = $1 AND student_id = $2 AND status = $3",
        )
        .bind(test_id)
        .bind(student_id)
        .bind(AttemptStatus::Submitted)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    async fn insert_in_progress(&self, attempt: &NewAttempt<'_>) -> RepoResult<bool> {
        let selected = attempt.selected_question_ids.map(|ids| Json(ids.to_vec()));
        let result = sqlx::query(
            "INSERT INTO attempts (id, test_id, student_id, status, selected_question_ids, \
             platform, browser, device_info, total_points, started_at, expires_at, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $10, $10) \
             ON CONFLICT DO NOTHING",
        )
        .bind(attempt.id)
        .bind(attempt.test_id)
        .bind(attempt.student_id)
        .bind(AttemptStatus::InProgress)
        .bind(selected)
        .bind(attempt.platform)
        .bind(attempt.browser)
        .bind(Json(attempt.device_info))
        .bind(attempt.total_points)
        .bind(attempt.started_at)
        .bind(attempt.expires_at)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_submitted(
        &self,
        id: &str,
        score: f64,
        total_points: f64,
        submitted_at: PrimitiveDateTime,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE attempts SET status = $2, score = $3, total_points = $4, \
             submitted_at = $5, updated_at = $5 \
             WHERE id = $1 AND status = $6",
        )
        .bind(id)
        .bind(AttemptStatus::Submitted)
        .bind(score)
        .bind(total_points)
        .bind(submitted_at)
        .bind(AttemptStatus::InProgress)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
