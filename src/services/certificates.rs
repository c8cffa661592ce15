use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::Certificate;
use crate::repositories::{
    AttemptRepository, CatalogRepository, CertificateRepository, NewCertificate, Repositories,
};
use crate::services::scoring::ScoreAggregator;
use crate::services::{ServiceError, ServiceResult};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 12;
const CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Evaluation {
    pub(crate) qualifies: bool,
    pub(crate) percentage: i32,
    pub(crate) passing_score: f64,
    pub(crate) certificate: Option<Certificate>,
    /// `true` only for the call that created the certificate.
    pub(crate) issued: bool,
}

#[derive(Clone)]
pub(crate) struct CertificateEvaluator {
    attempts: Arc<dyn AttemptRepository>,
    catalog: Arc<dyn CatalogRepository>,
    certificates: Arc<dyn CertificateRepository>,
    scores: ScoreAggregator,
    default_passing_score: f64,
}

impl CertificateEvaluator {
    pub(crate) fn new(
        repositories: &Repositories,
        scores: ScoreAggregator,
        default_passing_score: f64,
    ) -> Self {
        Self {
            attempts: repositories.attempts.clone(),
            catalog: repositories.catalog.clone(),
            certificates: repositories.certificates.clone(),
            scores,
            default_passing_score,
        }
    }

    /// Idempotent: a second call returns the existing certificate with `issued = false`.
    pub(crate) async fn evaluate(&self, attempt_id: &str) -> ServiceResult<Evaluation> {
        let attempt =
            self.attempts.find_by_id(attempt_id).await?.ok_or(ServiceError::NotFound("Attempt"))?;
        if !attempt.is_submitted() {
            return Err(ServiceError::Conflict("Attempt is not submitted yet"));
        }

        let test =
            self.catalog.find_test(&attempt.test_id).await?.ok_or(ServiceError::NotFound("Test"))?;
        let passing_score = test.passing_score.unwrap_or(self.default_passing_score);

        if let Some(existing) = self.certificates.find_active_for_attempt(&attempt.id).await? {
            return Ok(Evaluation {
                qualifies: true,
                percentage: existing.percentage,
                passing_score,
                certificate: Some(existing),
                issued: false,
            });
        }

        let summary = self.scores.compute(&attempt).await?;
        let qualifies = f64::from(summary.percentage) >= passing_score;
        if !qualifies {
            return Ok(Evaluation {
                qualifies,
                percentage: summary.percentage,
                passing_score,
                certificate: None,
                issued: false,
            });
        }

        for _ in 0..CODE_ATTEMPTS {
            let certificate_id = Uuid::new_v4().to_string();
            let code = generate_certificate_code(&mut rand::thread_rng());
            let inserted = self
                .certificates
                .insert_if_absent(&NewCertificate {
                    id: &certificate_id,
                    test_id: &attempt.test_id,
                    student_id: &attempt.student_id,
                    attempt_id: &attempt.id,
                    code: &code,
                    percentage: summary.percentage,
                    issued_at: primitive_now_utc(),
                })
                .await?;

            if let Some(certificate) = inserted {
                metrics::counter!("certificates_issued_total").increment(1);
                tracing::info!(
                    attempt_id = %attempt.id,
                    certificate_code = %certificate.code,
                    percentage = summary.percentage,
                    "Certificate issued"
                );
                return Ok(Evaluation {
                    qualifies,
                    percentage: summary.percentage,
                    passing_score,
                    certificate: Some(certificate),
                    issued: true,
                });
            }

            // Either a concurrent evaluation won, or the code collided.
            if let Some(existing) = self.certificates.find_active_for_attempt(&attempt.id).await? {
                return Ok(Evaluation {
                    qualifies,
                    percentage: existing.percentage,
                    passing_score,
                    certificate: Some(existing),
                    issued: false,
                });
            }
        }

        Err(ServiceError::Internal("Failed to allocate a unique certificate code"))
    }

    /// Runs `evaluate` off the request path; failures are only logged.
    pub(crate) fn spawn_evaluation(&self, attempt_id: String) {
        let evaluator = self.clone();
        tokio::spawn(async move {
            match evaluator.evaluate(&attempt_id).await {
                Ok(evaluation) => tracing::debug!(
                    attempt_id,
                    qualifies = evaluation.qualifies,
                    issued = evaluation.issued,
                    "Certificate evaluation finished"
                ),
                Err(err) => {
                    tracing::warn!(attempt_id, error = %err, "Certificate evaluation failed")
                }
            }
        });
    }
}

/// `CERT-` followed by characters that cannot be misread (no 0/O, 1/I).
pub(crate) fn generate_certificate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let suffix: String = (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("CERT-{suffix}")
}
