use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::sandbox::{CaseResult, JudgeReport, RunOutcome, TestCaseInput};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExecuteCodeRequest {
    #[validate(length(min = 1, max = 65536, message = "code must be 1-65536 characters"))]
    pub(crate) code: String,
    pub(crate) language: String,
    #[serde(default)]
    pub(crate) input: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TestCodeRequest {
    #[validate(length(min = 1, max = 65536, message = "code must be 1-65536 characters"))]
    pub(crate) code: String,
    pub(crate) language: String,
    #[serde(alias = "testCases")]
    #[validate(length(min = 1, max = 50, message = "1-50 test cases are allowed"))]
    pub(crate) test_cases: Vec<TestCaseInput>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExecuteCodeResponse {
    pub(crate) output: String,
    pub(crate) error: Option<String>,
    pub(crate) timed_out: bool,
}

impl From<RunOutcome> for ExecuteCodeResponse {
    fn from(outcome: RunOutcome) -> Self {
        Self { output: outcome.output, error: outcome.error, timed_out: outcome.timed_out }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TestCodeResponse {
    pub(crate) passed_count: u32,
    pub(crate) total_test_cases: u32,
    pub(crate) all_passed: bool,
    pub(crate) results: Vec<CaseResult>,
}

impl From<JudgeReport> for TestCodeResponse {
    fn from(report: JudgeReport) -> Self {
        Self {
            all_passed: report.passed_count == report.total,
            passed_count: report.passed_count,
            total_test_cases: report.total,
            results: report.results,
        }
    }
}
