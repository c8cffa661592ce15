use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Student,
    Teacher,
    Admin,
}

impl UserRole {
    pub(crate) fn is_staff(self) -> bool {
        matches!(self, UserRole::Teacher | UserRole::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    SingleChoice,
    FreeText,
    Code,
}

impl QuestionType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::FreeText => "free_text",
            QuestionType::Code => "code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "violationtype", rename_all = "snake_case")]
pub(crate) enum ViolationType {
    WindowSwitch,
    Screenshot,
    PhoneCall,
    Other,
}

impl ViolationType {
    /// Client labels vary between proctoring front-ends; anything unknown is `Other`.
    pub(crate) fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "window_switch" | "tab_switch" | "focus_lost" | "blur" => ViolationType::WindowSwitch,
            "screenshot" | "screen_capture" | "print_screen" => ViolationType::Screenshot,
            "phone_call" | "call" | "incoming_call" => ViolationType::PhoneCall,
            _ => ViolationType::Other,
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ViolationType::WindowSwitch => "window_switch",
            ViolationType::Screenshot => "screenshot",
            ViolationType::PhoneCall => "phone_call",
            ViolationType::Other => "other",
        }
    }

    pub(crate) fn counter_column(self) -> &'static str {
        match self {
            ViolationType::WindowSwitch => "window_switch_count",
            ViolationType::Screenshot => "screenshot_count",
            ViolationType::PhoneCall => "phone_call_count",
            ViolationType::Other => "other_violation_count",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ViolationType;

    #[test]
    fn violation_labels_map_to_known_types() {
        assert_eq!(ViolationType::from_label("tab-switch"), ViolationType::WindowSwitch);
        assert_eq!(ViolationType::from_label("Screenshot"), ViolationType::Screenshot);
        assert_eq!(ViolationType::from_label("phone_call"), ViolationType::PhoneCall);
        assert_eq!(ViolationType::from_label("devtools_open"), ViolationType::Other);
    }
}
