use std::sync::Arc;

use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::Violation;
use crate::repositories::{AttemptRepository, NewViolation, Repositories, ViolationRepository};
use crate::services::{ServiceError, ServiceResult};
use crate::tasks::queues::ViolationReport;

/// Append-only integrity log with per-type counters on the attempt.
#[derive(Clone)]
pub(crate) struct ViolationTracker {
    attempts: Arc<dyn AttemptRepository>,
    violations: Arc<dyn ViolationRepository>,
}

impl ViolationTracker {
    pub(crate) fn new(repositories: &Repositories) -> Self {
        Self {
            attempts: repositories.attempts.clone(),
            violations: repositories.violations.clone(),
        }
    }

    pub(crate) async fn record(&self, report: &ViolationReport) -> ServiceResult<Violation> {
        let attempt = self
            .attempts
            .find_by_id(&report.attempt_id)
            .await?
            .ok_or(ServiceError::NotFound("Attempt"))?;
        if attempt.student_id != report.student_id {
            return Err(ServiceError::Forbidden("Not your attempt"));
        }

        let violation_id = Uuid::new_v4().to_string();
        let stored = self
            .violations
            .append(&NewViolation {
                id: &violation_id,
                attempt_id: &attempt.id,
                violation_type: report.violation_type,
                details: report.details.as_deref(),
                occurred_at: report.occurred_at,
                recorded_at: primitive_now_utc(),
            })
            .await?;

        metrics::counter!(
            "violations_recorded_total",
            "type" => report.violation_type.as_str()
        )
        .increment(1);
        tracing::info!(
            attempt_id = %attempt.id,
            violation_type = report.violation_type.as_str(),
            "Violation recorded"
        );

        Ok(stored)
    }

    /// Worker entry point: failures are logged and counted, never returned.
    pub(crate) async fn record_best_effort(&self, report: ViolationReport) {
        if let Err(err) = self.record(&report).await {
            let reason = match err {
                ServiceError::NotFound(_) => "unknown_attempt",
                ServiceError::Forbidden(_) => "not_owner",
                _ => "store_error",
            };
            tracing::warn!(
                attempt_id = %report.attempt_id,
                violation_type = report.violation_type.as_str(),
                reason,
                error = %err,
                "Dropping violation report"
            );
            metrics::counter!("violations_dropped_total", "reason" => reason).increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::types::ViolationType;
    use crate::repositories::memory::MemoryStore;
    use crate::test_support::{attempt_row, report_for};

    fn tracker_with_attempt() -> (Arc<MemoryStore>, ViolationTracker) {
        let store = Arc::new(MemoryStore::new());
        store.insert_attempt(attempt_row("a1", "t1", "s1"));
        let tracker = ViolationTracker::new(&Repositories::in_memory(store.clone()));
        (store, tracker)
    }

    #[tokio::test]
    async fn counters_grow_with_each_event() {
        let (store, tracker) = tracker_with_attempt();

        tracker.record(&report_for("a1", "s1", ViolationType::WindowSwitch)).await.unwrap();
        tracker.record(&report_for("a1", "s1", ViolationType::WindowSwitch)).await.unwrap();
        tracker.record(&report_for("a1", "s1", ViolationType::PhoneCall)).await.unwrap();

        let attempt = store.attempt("a1").expect("attempt");
        assert_eq!(attempt.violation_count, 3);
        assert_eq!(attempt.window_switch_count, 2);
        assert_eq!(attempt.phone_call_count, 1);
        assert_eq!(attempt.screenshot_count, 0);
        assert_eq!(store.violations_for("a1").len(), 3);
    }

    #[tokio::test]
    async fn other_students_cannot_report_on_an_attempt() {
        let (store, tracker) = tracker_with_attempt();

        let err = tracker.record(&report_for("a1", "intruder", ViolationType::Screenshot)).await;

        assert!(matches!(err, Err(ServiceError::Forbidden(_))));
        assert_eq!(store.attempt("a1").unwrap().violation_count, 0);
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let (store, tracker) = tracker_with_attempt();
        store.fail_violation_writes(true);

        tracker.record_best_effort(report_for("a1", "s1", ViolationType::Other)).await;

        assert!(store.violations_for("a1").is_empty());
    }
}
