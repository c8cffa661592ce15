use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use time::PrimitiveDateTime;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::db::models::Answer;
use crate::db::types::ViolationType;
use crate::sandbox::Language;

/// A stored code submission waiting to be run against its question's test cases.
#[derive(Debug, Clone)]
pub(crate) struct JudgeJob {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) language: Language,
    pub(crate) code: String,
}

type JobKey = (String, String, String);

impl JudgeJob {
    /// Rebuilds the job for a stored code answer that has no verdict yet.
    pub(crate) fn from_answer(answer: &Answer) -> Option<Self> {
        let code = answer.code_submission.clone()?;
        let language = match Language::parse(answer.code_language.as_deref().unwrap_or_default()) {
            Ok(language) => language,
            Err(err) => {
                tracing::warn!(
                    attempt_id = %answer.attempt_id,
                    question_id = %answer.question_id,
                    error = %err,
                    "Stored code answer cannot be judged"
                );
                return None;
            }
        };
        Some(Self {
            attempt_id: answer.attempt_id.clone(),
            question_id: answer.question_id.clone(),
            language,
            code,
        })
    }

    fn key(&self) -> JobKey {
        (self.attempt_id.clone(), self.question_id.clone(), self.code.clone())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ViolationReport {
    pub(crate) attempt_id: String,
    pub(crate) student_id: String,
    pub(crate) violation_type: ViolationType,
    pub(crate) details: Option<String>,
    pub(crate) occurred_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Enqueued {
    Queued,
    /// The same code for the same answer is already waiting or running.
    AlreadyQueued,
    Dropped,
}

/// Bounded judge channel plus the set of jobs between `enqueue` and `finish`.
#[derive(Clone)]
pub(crate) struct JudgeQueue {
    sender: mpsc::Sender<JudgeJob>,
    in_flight: Arc<Mutex<HashSet<JobKey>>>,
}

impl JudgeQueue {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<JudgeJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender, in_flight: Arc::default() }, receiver)
    }

    /// Never waits. A dropped job leaves the answer pending for the recovery sweep.
    pub(crate) fn enqueue(&self, job: JudgeJob) -> Enqueued {
        let key = job.key();
        if !self.in_flight().insert(key.clone()) {
            return Enqueued::AlreadyQueued;
        }

        let reason = match self.sender.try_send(job) {
            Ok(()) => {
                metrics::counter!("judge_jobs_total", "status" => "queued").increment(1);
                return Enqueued::Queued;
            }
            Err(TrySendError::Full(_)) => "queue full",
            Err(TrySendError::Closed(_)) => "queue closed",
        };

        self.in_flight().remove(&key);
        tracing::warn!(
            attempt_id = %key.0,
            question_id = %key.1,
            reason,
            "Judge job not queued; answer left pending"
        );
        metrics::counter!("judge_jobs_total", "status" => "dropped").increment(1);
        Enqueued::Dropped
    }

    /// Called by a worker once the job has been judged, successfully or not.
    pub(crate) fn finish(&self, job: &JudgeJob) {
        self.in_flight().remove(&job.key());
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<JobKey>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub(crate) struct ViolationQueue {
    sender: mpsc::Sender<ViolationReport>,
}

impl ViolationQueue {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<ViolationReport>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub(crate) fn enqueue(&self, report: ViolationReport) -> bool {
        let reason = match self.sender.try_send(report) {
            Ok(()) => return true,
            Err(TrySendError::Full(_)) => "queue_full",
            Err(TrySendError::Closed(_)) => "queue_closed",
        };

        tracing::warn!(reason, "Dropping violation report");
        metrics::counter!("violations_dropped_total", "reason" => reason).increment(1);
        false
    }
}

/// Receiving halves handed to the background workers at startup.
pub(crate) struct BackgroundQueues {
    pub(crate) judge: mpsc::Receiver<JudgeJob>,
    pub(crate) violations: mpsc::Receiver<ViolationReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;

    fn report() -> ViolationReport {
        ViolationReport {
            attempt_id: "a1".into(),
            student_id: "s1".into(),
            violation_type: ViolationType::Screenshot,
            details: None,
            occurred_at: primitive_now_utc(),
        }
    }

    #[test]
    fn violation_queue_drops_when_full() {
        let (queue, mut receiver) = ViolationQueue::channel(1);

        assert!(queue.enqueue(report()));
        assert!(!queue.enqueue(report()));
        assert!(receiver.try_recv().is_ok());
        assert!(queue.enqueue(report()));
    }

    fn job(question_id: &str, code: &str) -> JudgeJob {
        JudgeJob {
            attempt_id: "a1".into(),
            question_id: question_id.into(),
            language: Language::Python,
            code: code.into(),
        }
    }

    #[test]
    fn judge_queue_reports_closed_channel() {
        let (queue, receiver) = JudgeQueue::channel(4);
        drop(receiver);

        assert_eq!(queue.enqueue(job("q1", "print(1)")), Enqueued::Dropped);
    }

    #[test]
    fn judge_queue_skips_duplicates_until_finished() {
        let (queue, mut receiver) = JudgeQueue::channel(4);

        assert_eq!(queue.enqueue(job("q1", "print(1)")), Enqueued::Queued);
        assert_eq!(queue.enqueue(job("q1", "print(1)")), Enqueued::AlreadyQueued);
        assert_eq!(queue.enqueue(job("q1", "print(2)")), Enqueued::Queued);

        let first = receiver.try_recv().expect("queued job");
        queue.finish(&first);
        assert_eq!(queue.enqueue(job("q1", "print(1)")), Enqueued::Queued);
    }

    #[test]
    fn a_full_judge_queue_forgets_the_dropped_job() {
        let (queue, mut receiver) = JudgeQueue::channel(1);

        assert_eq!(queue.enqueue(job("q1", "print(1)")), Enqueued::Queued);
        assert_eq!(queue.enqueue(job("q2", "print(2)")), Enqueued::Dropped);

        receiver.try_recv().expect("queued job");
        assert_eq!(queue.enqueue(job("q2", "print(2)")), Enqueued::Queued);
    }
}
