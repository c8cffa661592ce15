use serde::{Deserialize, Deserializer, Serialize};
use time::PrimitiveDateTime;
use validator::Validate;

use crate::core::time::{format_primitive, from_unix_millis, parse_rfc3339};
use crate::db::models::{Answer, Attempt, Certificate, CodeTestCase, Question, Violation};
use crate::db::types::{AttemptStatus, QuestionType};
use crate::sandbox::CaseResult;
use crate::services::answers::AnswerPayload;
use crate::services::certificates::Evaluation;
use crate::services::scoring::{percentage, ScoreSummary};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct StartAttemptRequest {
    #[serde(alias = "testId")]
    #[validate(length(min = 1, message = "test_id must not be empty"))]
    pub(crate) test_id: String,
    #[serde(default)]
    pub(crate) platform: Option<String>,
    #[serde(default)]
    pub(crate) browser: Option<String>,
    #[serde(default, alias = "deviceInfo")]
    pub(crate) device_info: serde_json::Value,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitAnswerRequest {
    #[serde(alias = "attemptId")]
    #[validate(length(min = 1, message = "attempt_id must not be empty"))]
    pub(crate) attempt_id: String,
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    pub(crate) answer: AnswerPayload,
    #[serde(default, alias = "isFlagged")]
    pub(crate) is_flagged: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SubmitAttemptRequest {
    #[serde(alias = "attemptId")]
    #[validate(length(min = 1, message = "attempt_id must not be empty"))]
    pub(crate) attempt_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct MarkCodeCorrectRequest {
    #[serde(alias = "attemptId")]
    #[validate(length(min = 1, message = "attempt_id must not be empty"))]
    pub(crate) attempt_id: String,
    #[serde(alias = "questionId")]
    #[validate(length(min = 1, message = "question_id must not be empty"))]
    pub(crate) question_id: String,
    #[serde(default, alias = "passedCount")]
    pub(crate) passed_count: Option<u32>,
    #[serde(default, alias = "totalTestCases")]
    pub(crate) total_test_cases: Option<u32>,
    #[serde(default, alias = "testResults")]
    pub(crate) test_results: Vec<CaseResult>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ViolationRequest {
    #[serde(alias = "violationType", alias = "type")]
    #[validate(length(min = 1, max = 64, message = "violation_type must be 1-64 characters"))]
    pub(crate) violation_type: String,
    #[serde(default)]
    #[validate(length(max = 2000, message = "details must be at most 2000 characters"))]
    pub(crate) details: Option<String>,
    /// RFC 3339 string or epoch milliseconds; anything else means "now".
    #[serde(default, deserialize_with = "deserialize_client_timestamp")]
    pub(crate) timestamp: Option<PrimitiveDateTime>,
}

fn deserialize_client_timestamp<'de, D>(deserializer: D) -> Result<Option<PrimitiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(value)) => parse_rfc3339(value.trim()),
        Some(serde_json::Value::Number(value)) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|millis| millis as i64))
            .and_then(from_unix_millis),
        _ => None,
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct ViolationCounters {
    pub(crate) window_switch: i32,
    pub(crate) screenshot: i32,
    pub(crate) phone_call: i32,
    pub(crate) other: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptResponse {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) selected_question_ids: Option<Vec<String>>,
    pub(crate) platform: Option<String>,
    pub(crate) browser: Option<String>,
    pub(crate) score: Option<f64>,
    pub(crate) total_points: f64,
    pub(crate) percentage: Option<i32>,
    pub(crate) violation_count: i32,
    pub(crate) violations: ViolationCounters,
    pub(crate) started_at: String,
    pub(crate) expires_at: Option<String>,
    pub(crate) submitted_at: Option<String>,
}

impl From<Attempt> for AttemptResponse {
    fn from(attempt: Attempt) -> Self {
        Self {
            percentage: attempt.score.map(|score| percentage(score, attempt.total_points)),
            violations: ViolationCounters {
                window_switch: attempt.window_switch_count,
                screenshot: attempt.screenshot_count,
                phone_call: attempt.phone_call_count,
                other: attempt.other_violation_count,
            },
            started_at: format_primitive(attempt.started_at),
            expires_at: attempt.expires_at.map(format_primitive),
            submitted_at: attempt.submitted_at.map(format_primitive),
            id: attempt.id,
            test_id: attempt.test_id,
            student_id: attempt.student_id,
            status: attempt.status,
            selected_question_ids: attempt.selected_question_ids,
            platform: attempt.platform,
            browser: attempt.browser,
            score: attempt.score,
            total_points: attempt.total_points,
            violation_count: attempt.violation_count,
        }
    }
}

/// Question as shown to a client; solutions are only present for staff.
#[derive(Debug, Serialize)]
pub(crate) struct QuestionView {
    pub(crate) id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) prompt: String,
    pub(crate) points: f64,
    pub(crate) order_index: i32,
    pub(crate) options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) correct_answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) test_cases: Option<Vec<CodeTestCase>>,
}

impl QuestionView {
    pub(crate) fn new(question: Question, with_solutions: bool) -> Self {
        let (correct_answer, test_cases) = if with_solutions {
            (question.correct_answer, Some(question.test_cases.0))
        } else {
            (None, None)
        };
        Self {
            id: question.id,
            question_type: question.question_type,
            prompt: question.prompt,
            points: question.points,
            order_index: question.order_index,
            options: question.options.0,
            correct_answer,
            test_cases,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerResponse {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) answer: Option<String>,
    pub(crate) code_submission: Option<String>,
    pub(crate) code_language: Option<String>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_earned: f64,
    pub(crate) test_results: Vec<CaseResult>,
    pub(crate) is_flagged: bool,
    pub(crate) submitted_at: String,
    pub(crate) updated_at: String,
}

impl From<Answer> for AnswerResponse {
    fn from(answer: Answer) -> Self {
        Self {
            id: answer.id,
            attempt_id: answer.attempt_id,
            question_id: answer.question_id,
            answer: answer.answer,
            code_submission: answer.code_submission,
            code_language: answer.code_language,
            is_correct: answer.is_correct,
            points_earned: answer.points_earned,
            test_results: answer.test_results.0,
            is_flagged: answer.is_flagged,
            submitted_at: format_primitive(answer.submitted_at),
            updated_at: format_primitive(answer.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StartAttemptResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) questions: Vec<QuestionView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitAttemptResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) summary: ScoreSummary,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReviewResponse {
    pub(crate) attempt: AttemptResponse,
    pub(crate) test_title: String,
    pub(crate) questions: Vec<QuestionView>,
    pub(crate) answers: Vec<AnswerResponse>,
    pub(crate) summary: ScoreSummary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) violations: Vec<Violation>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MarkCodeCorrectResponse {
    /// `false` when the result targeted code that has since been replaced.
    pub(crate) applied: bool,
    pub(crate) answer: Option<AnswerResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ViolationAccepted {
    pub(crate) accepted: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CertificateResponse {
    pub(crate) id: String,
    pub(crate) code: String,
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_id: String,
    pub(crate) percentage: i32,
    pub(crate) issued_at: String,
}

impl From<Certificate> for CertificateResponse {
    fn from(certificate: Certificate) -> Self {
        Self {
            id: certificate.id,
            code: certificate.code,
            test_id: certificate.test_id,
            student_id: certificate.student_id,
            attempt_id: certificate.attempt_id,
            percentage: certificate.percentage,
            issued_at: format_primitive(certificate.issued_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct EvaluationResponse {
    pub(crate) qualifies: bool,
    pub(crate) percentage: i32,
    pub(crate) passing_score: f64,
    pub(crate) issued: bool,
    pub(crate) certificate: Option<CertificateResponse>,
}

impl From<Evaluation> for EvaluationResponse {
    fn from(evaluation: Evaluation) -> Self {
        Self {
            qualifies: evaluation.qualifies,
            percentage: evaluation.percentage,
            passing_score: evaluation.passing_score,
            issued: evaluation.issued,
            certificate: evaluation.certificate.map(CertificateResponse::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_timestamp_accepts_rfc3339_and_epoch_millis() {
        let rfc: ViolationRequest = serde_json::from_value(serde_json::json!({
            "violation_type": "screenshot",
            "timestamp": "2025-03-01T10:00:00Z"
        }))
        .unwrap();
        let millis: ViolationRequest = serde_json::from_value(serde_json::json!({
            "type": "screenshot",
            "timestamp": 1_740_823_200_000_i64
        }))
        .unwrap();

        assert_eq!(rfc.timestamp, millis.timestamp);
        assert!(rfc.timestamp.is_some());
    }

    #[test]
    fn unparseable_violation_timestamp_is_dropped() {
        let request: ViolationRequest = serde_json::from_value(serde_json::json!({
            "violation_type": "blur",
            "timestamp": "yesterday"
        }))
        .unwrap();
        assert!(request.timestamp.is_none());

        let missing: ViolationRequest =
            serde_json::from_value(serde_json::json!({ "violation_type": "blur" })).unwrap();
        assert!(missing.timestamp.is_none());
    }

    #[test]
    fn students_never_see_solutions() {
        let question = crate::test_support::question_row(
            "q1",
            "t1",
            QuestionType::SingleChoice,
            5.0,
        );

        let student = serde_json::to_value(QuestionView::new(question.clone(), false)).unwrap();
        let staff = serde_json::to_value(QuestionView::new(question, true)).unwrap();

        assert!(student.get("correct_answer").is_none());
        assert!(student.get("test_cases").is_none());
        assert_eq!(staff["correct_answer"], "A");
    }
}
