use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{AttemptStatus, QuestionType, UserRole, ViolationType};
use crate::sandbox::CaseResult;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
}

impl User {
    pub(crate) fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Test {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) allowed_platforms: Json<Vec<String>>,
    pub(crate) allowed_browsers: Json<Vec<String>>,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) questions_to_ask: Option<i32>,
    pub(crate) passing_score: Option<f64>,
    pub(crate) show_review: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Test {
    /// Non-positive limits are stored by older editors to mean "unlimited".
    pub(crate) fn attempt_limit(&self) -> Option<i64> {
        self.max_attempts.filter(|max| *max > 0).map(i64::from)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CodeTestCase {
    pub(crate) input: String,
    pub(crate) expected_output: String,
    #[serde(default)]
    pub(crate) points: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) question_type: QuestionType,
    pub(crate) prompt: String,
    pub(crate) points: f64,
    pub(crate) order_index: i32,
    pub(crate) options: Json<Vec<String>>,
    pub(crate) correct_answer: Option<String>,
    pub(crate) test_cases: Json<Vec<CodeTestCase>>,
    pub(crate) created_at: PrimitiveDateTime,
}

/// Selected ids are canonicalized by the repository, see `repositories::attempts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Attempt {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) status: AttemptStatus,
    pub(crate) selected_question_ids: Option<Vec<String>>,
    pub(crate) platform: Option<String>,
    pub(crate) browser: Option<String>,
    pub(crate) device_info: serde_json::Value,
    pub(crate) score: Option<f64>,
    pub(crate) total_points: f64,
    pub(crate) violation_count: i32,
    pub(crate) window_switch_count: i32,
    pub(crate) screenshot_count: i32,
    pub(crate) phone_call_count: i32,
    pub(crate) other_violation_count: i32,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) expires_at: Option<PrimitiveDateTime>,
    pub(crate) submitted_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

impl Attempt {
    pub(crate) fn in_scope(&self, question_id: &str) -> bool {
        match &self.selected_question_ids {
            Some(ids) => ids.iter().any(|id| id == question_id),
            None => true,
        }
    }

    pub(crate) fn is_submitted(&self) -> bool {
        self.status == AttemptStatus::Submitted
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Answer {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) answer: Option<String>,
    pub(crate) code_submission: Option<String>,
    pub(crate) code_language: Option<String>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) points_earned: f64,
    pub(crate) test_results: Json<Vec<CaseResult>>,
    pub(crate) is_flagged: bool,
    pub(crate) submitted_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Violation {
    pub(crate) id: String,
    pub(crate) attempt_id: String,
    pub(crate) violation_type: ViolationType,
    pub(crate) details: Option<String>,
    pub(crate) occurred_at: PrimitiveDateTime,
    pub(crate) recorded_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Certificate {
    pub(crate) id: String,
    pub(crate) test_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_id: String,
    pub(crate) code: String,
    pub(crate) percentage: i32,
    pub(crate) issued_at: PrimitiveDateTime,
    pub(crate) is_active: bool,
}
