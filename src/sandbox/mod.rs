pub(crate) mod compare;
pub(crate) mod language;
pub(crate) mod process;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub(crate) use language::Language;
pub(crate) use process::ProcessSandbox;

#[derive(Debug, Error)]
pub(crate) enum SandboxError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("sandbox isolation is not configured; set SANDBOX_WRAPPER")]
    IsolationRequired,
}

/// Result of a single run. Timeouts and crashes are outcomes, not errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct RunOutcome {
    pub(crate) output: String,
    pub(crate) error: Option<String>,
    pub(crate) timed_out: bool,
}

impl RunOutcome {
    pub(crate) fn failure(message: impl Into<String>) -> Self {
        Self { output: String::new(), error: Some(message.into()), timed_out: false }
    }
}

#[async_trait]
pub(crate) trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str, language: Language, input: &str) -> RunOutcome;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TestCaseInput {
    #[serde(default)]
    pub(crate) input: String,
    pub(crate) expected_output: String,
}

/// Per-case verdict as stored on the answer row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct CaseResult {
    #[serde(default)]
    pub(crate) index: usize,
    #[serde(default)]
    pub(crate) passed: bool,
    #[serde(default)]
    pub(crate) output: String,
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) timed_out: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JudgeReport {
    pub(crate) passed_count: u32,
    pub(crate) total: u32,
    pub(crate) results: Vec<CaseResult>,
}

/// Runs every case concurrently, at most `max_parallel` at a time.
///
/// Results come back in input order. A failing case never aborts its siblings.
pub(crate) async fn run_test_cases(
    runner: Arc<dyn CodeRunner>,
    code: &str,
    language: Language,
    cases: &[TestCaseInput],
    max_parallel: usize,
) -> JudgeReport {
    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let code: Arc<str> = Arc::from(code);
    let mut tasks = JoinSet::new();

    for (index, case) in cases.iter().cloned().enumerate() {
        let runner = runner.clone();
        let code = code.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = runner.run(&code, language, &case.input).await;
            (index, judge_case(index, &case, outcome))
        });
    }

    let mut slots: Vec<Option<CaseResult>> = vec![None; cases.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(err) => tracing::error!(error = %err, "Test case task failed"),
        }
    }

    let results: Vec<CaseResult> = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| CaseResult {
                index,
                error: Some("Test case did not complete".to_string()),
                ..CaseResult::default()
            })
        })
        .collect();

    let passed_count = results.iter().filter(|result| result.passed).count() as u32;
    JudgeReport { passed_count, total: results.len() as u32, results }
}

fn judge_case(index: usize, case: &TestCaseInput, outcome: RunOutcome) -> CaseResult {
    let passed = !outcome.timed_out
        && outcome.error.is_none()
        && compare::outputs_match(&outcome.output, &case.expected_output);

    CaseResult {
        index,
        passed,
        output: outcome.output,
        error: outcome.error,
        timed_out: outcome.timed_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;

    fn case(input: &str, expected: &str) -> TestCaseInput {
        TestCaseInput { input: input.to_string(), expected_output: expected.to_string() }
    }

    #[tokio::test]
    async fn timeout_on_one_case_keeps_the_others() {
        let runner = Arc::new(ScriptedRunner::echo().timing_out_on("slow"));
        let cases = vec![case("1", "1"), case("slow", "slow"), case("3", "3")];

        let report = run_test_cases(runner, "print(input())", Language::Python, &cases, 2).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.passed_count, 2);
        assert!(report.results[1].timed_out);
        assert!(!report.results[1].passed);
        assert!(report.results[0].passed && report.results[2].passed);
    }

    #[tokio::test]
    async fn results_keep_input_order() {
        let runner = Arc::new(ScriptedRunner::echo().with_delay_ms("a", 40));
        let cases = vec![case("a", "a"), case("b", "b"), case("c", "x")];

        let report = run_test_cases(runner, "", Language::JavaScript, &cases, 3).await;

        let indexes: Vec<usize> = report.results.iter().map(|result| result.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(report.results[0].output, "a");
        assert!(!report.results[2].passed);
        assert_eq!(report.passed_count, 2);
    }

    #[tokio::test]
    async fn runtime_errors_never_pass() {
        let runner = Arc::new(ScriptedRunner::echo().failing_on("boom"));
        let report =
            run_test_cases(runner, "", Language::Python, &[case("boom", "boom")], 1).await;

        assert_eq!(report.passed_count, 0);
        assert!(report.results[0].error.is_some());
    }
}
