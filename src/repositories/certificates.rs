use async_trait::async_trait;
use time::PrimitiveDateTime;

use crate::db::models::Certificate;
use crate::repositories::{PgStore, RepoResult};

const COLUMNS: &str = "id, test_id, student_id, attempt_id, code, percentage, issued_at, is_active";

pub(crate) struct NewCertificate<'a> {
    pub(crate) id: &'a str,
    pub(crate) test_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) attempt_id: &'a str,
    pub(crate) code: &'a str,
    pub(crate) percentage: i32,
    pub(crate) issued_at: PrimitiveDateTime,
}

#[async_trait]
pub(crate) trait CertificateRepository: Send + Sync {
    async fn find_active_for_attempt(&self, attempt_id: &str) -> RepoResult<Option<Certificate>>;

    /// `None` when either the code or the attempt already has an active certificate.
    async fn insert_if_absent(
        &self,
        certificate: &NewCertificate<'_>,
    ) -> RepoResult<Option<Certificate>>;
}

#[async_trait]
impl CertificateRepository for PgStore {
    async fn find_active_for_attempt(&self, attempt_id: &str) -> RepoResult<Option<Certificate>> {
        let certificate = sqlx::query_as::<_, Certificate>(&format!(
            "SELECT {COLUMNS} FROM certificates WHERE attempt_id = $1 AND is_active"
        ))
        .bind(attempt_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(certificate)
    }

    async fn insert_if_absent(
        &self,
        certificate: &NewCertificate<'_>,
    ) -> RepoResult<Option<Certificate>> {
        let stored = sqlx::query_as::<_, Certificate>(&format!(
            "INSERT INTO certificates (id, test_id, student_id, attempt_id, code, percentage, \
             issued_at, is_active) VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE) \
             ON CONFLICT DO NOTHING RETURNING {COLUMNS}"
        ))
        .bind(certificate.id)
        .bind(certificate.test_id)
        .bind(certificate.student_id)
        .bind(certificate.attempt_id)
        .bind(certificate.code)
        .bind(certificate.percentage)
        .bind(certificate.issued_at)
        .fetch_optional(self.pool())
        .await?;
        Ok(stored)
    }
}
