use std::sync::Arc;
use std::time::Instant;

use crate::db::models::Answer;
use crate::repositories::{AnswerRepository, CatalogRepository};
use crate::sandbox::{self, CodeRunner, JudgeReport, Language, RunOutcome, TestCaseInput};
use crate::services::answers::{AnswerService, CodeJudgingResult};
use crate::services::{ServiceError, ServiceResult};
use crate::tasks::queues::{Enqueued, JudgeJob, JudgeQueue};

/// Runs code in the sandbox and feeds verdicts back into answer scoring.
#[derive(Clone)]
pub(crate) struct CodeJudge {
    runner: Arc<dyn CodeRunner>,
    catalog: Arc<dyn CatalogRepository>,
    answer_rows: Arc<dyn AnswerRepository>,
    answers: AnswerService,
    max_parallel: usize,
}

impl CodeJudge {
    pub(crate) fn new(
        runner: Arc<dyn CodeRunner>,
        catalog: Arc<dyn CatalogRepository>,
        answer_rows: Arc<dyn AnswerRepository>,
        answers: AnswerService,
        max_parallel: usize,
    ) -> Self {
        Self { runner, catalog, answer_rows, answers, max_parallel }
    }

    pub(crate) async fn execute(&self, code: &str, language: Language, input: &str) -> RunOutcome {
        self.runner.run(code, language, input).await
    }

    pub(crate) async fn run_cases(
        &self,
        code: &str,
        language: Language,
        cases: &[TestCaseInput],
    ) -> JudgeReport {
        sandbox::run_test_cases(self.runner.clone(), code, language, cases, self.max_parallel).await
    }

    /// Judges a queued submission against the question's stored cases.
    ///
    /// `Ok(None)` means nothing was recorded: the question has no cases, or the
    /// student replaced the code while it was running.
    pub(crate) async fn judge(&self, job: JudgeJob) -> ServiceResult<Option<Answer>> {
        let started = Instant::now();
        let current = self.answer_rows.find(&job.attempt_id, &job.question_id).await?;
        if current.as_ref().and_then(|answer| answer.code_submission.as_deref())
            != Some(job.code.as_str())
        {
            tracing::debug!(
                attempt_id = %job.attempt_id,
                question_id = %job.question_id,
                "Skipping judge job for replaced code"
            );
            metrics::counter!("judge_jobs_total", "status" => "superseded").increment(1);
            return Ok(None);
        }

        let question = self
            .catalog
            .find_question(&job.question_id)
            .await?
            .ok_or(ServiceError::NotFound("Question"))?;

        let cases: Vec<TestCaseInput> = question
            .test_cases
            .iter()
            .map(|case| TestCaseInput {
                input: case.input.clone(),
                expected_output: case.expected_output.clone(),
            })
            .collect();
        if cases.is_empty() {
            metrics::counter!("judge_jobs_total", "status" => "skipped").increment(1);
            return Ok(None);
        }

        let report = self.run_cases(&job.code, job.language, &cases).await;
        tracing::debug!(
            attempt_id = %job.attempt_id,
            question_id = %job.question_id,
            passed = report.passed_count,
            total = report.total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Code judged"
        );

        let recorded = self
            .answers
            .record_code_judging_result(CodeJudgingResult {
                attempt_id: job.attempt_id,
                question_id: job.question_id,
                passed_count: Some(report.passed_count),
                total_test_cases: Some(report.total),
                results: report.results,
                expected_code: Some(job.code),
            })
            .await;

        let status = match &recorded {
            Ok(Some(_)) => "recorded",
            Ok(None) => "superseded",
            Err(_) => "failed",
        };
        metrics::counter!("judge_jobs_total", "status" => status).increment(1);
        recorded
    }

    /// Puts stored code answers that never got a verdict back on the queue.
    ///
    /// Stops at the first job the queue refuses; the rest wait for the next sweep.
    pub(crate) async fn requeue_unjudged(
        &self,
        queue: &JudgeQueue,
        limit: usize,
    ) -> ServiceResult<usize> {
        let pending = self.answer_rows.list_unjudged_code(limit).await?;
        let mut requeued = 0;
        for answer in &pending {
            let Some(job) = JudgeJob::from_answer(answer) else {
                continue;
            };
            match queue.enqueue(job) {
                Enqueued::Queued => requeued += 1,
                Enqueued::AlreadyQueued => {}
                Enqueued::Dropped => break,
            }
        }
        if requeued > 0 {
            metrics::counter!("judge_jobs_requeued_total").increment(requeued as u64);
        }
        Ok(requeued)
    }
}
