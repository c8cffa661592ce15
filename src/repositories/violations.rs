use async_trait::async_trait;
use time::PrimitiveDateTime;

use crate::db::models::Violation;
use crate::db::types::ViolationType;
use crate::repositories::{PgStore, RepoResult, RepositoryError};

const COLUMNS: &str = "id, attempt_id, violation_type, details, occurred_at, recorded_at";

pub(crate) struct NewViolation<'a> {
    pub(crate) id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) violation_type: ViolationType,
    pub(crate) details: Option<&'a str>,
    pub(crate) occurred_at: PrimitiveDateTime,
    pub(crate) recorded_at: PrimitiveDateTime,
}

#[async_trait]
pub(crate) trait ViolationRepository: Send + Sync {
    /// Appends the event and bumps the attempt counters atomically.
    async fn append(&self, violation: &NewViolation<'_>) -> RepoResult<Violation>;

    async fn list_by_attempt(&self, attempt_id: &str) -> RepoResult<Vec<Violation>>;
}

#[async_trait]
impl ViolationRepository for PgStore {
    async fn append(&self, violation: &NewViolation<'_>) -> RepoResult<Violation> {
        let mut tx = self.pool().begin().await?;

        let column = violation.violation_type.counter_column();
        let updated = sqlx::query(&format!(
            "UPDATE attempts SET violation_count = violation_count + 1, \
             {column} = {column} + 1, updated_at = $2 WHERE id = $1"
        ))
        .bind(violation.attempt_id)
        .bind(violation.recorded_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Database(sqlx::Error::RowNotFound));
        }

        let stored = sqlx::query_as::<_, Violation>(&format!(
            "INSERT INTO violations (id, attempt_id, violation_type, details, occurred_at, \
             recorded_at) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
        ))
        .bind(violation.id)
        .bind(violation.attempt_id)
        .bind(violation.violation_type)
        .bind(violation.details)
        .bind(violation.occurred_at)
        .bind(violation.recorded_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn list_by_attempt(&self, attempt_id: &str) -> RepoResult<Vec<Violation>> {
        let violations = sqlx::query_as::<_, Violation>(&format!(
            "SELECT {COLUMNS} FROM violations WHERE attempt_id = $1 ORDER BY occurred_at, id"
        ))
        .bind(attempt_id)
        .fetch_all(self.pool())
        .await?;
        Ok(violations)
    }
}
