//! In-memory store used by unit and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::types::Json;

use crate::db::models::{Answer, Attempt, Certificate, Question, Test, User, Violation};
use crate::db::types::{AttemptStatus, QuestionType, ViolationType};
use crate::repositories::{
    AnswerRepository, AttemptRepository, CatalogRepository, CertificateRepository,
    HealthRepository, JudgingUpdate, NewAttempt, NewCertificate, NewViolation, RepoResult,
    RepositoryError, UpsertAnswer, UserRepository, ViolationRepository,
};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    tests: HashMap<String, Test>,
    questions: Vec<Question>,
    attempts: HashMap<String, Attempt>,
    answers: Vec<Answer>,
    violations: Vec<Violation>,
    certificates: Vec<Certificate>,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    tables: Mutex<Tables>,
    fail_violations: AtomicBool,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_user(&self, user: User) {
        self.lock().users.insert(user.id.clone(), user);
    }

    pub(crate) fn insert_test(&self, test: Test) {
        self.lock().tests.insert(test.id.clone(), test);
    }

    pub(crate) fn insert_question(&self, question: Question) {
        self.lock().questions.push(question);
    }

    pub(crate) fn insert_attempt(&self, attempt: Attempt) {
        self.lock().attempts.insert(attempt.id.clone(), attempt);
    }

    pub(crate) fn attempt(&self, id: &str) -> Option<Attempt> {
        self.lock().attempts.get(id).cloned()
    }

    pub(crate) fn answers_for(&self, attempt_id: &str) -> Vec<Answer> {
        self.lock().answers.iter().filter(|a| a.attempt_id == attempt_id).cloned().collect()
    }

    pub(crate) fn certificates_for(&self, attempt_id: &str) -> Vec<Certificate> {
        self.lock().certificates.iter().filter(|c| c.attempt_id == attempt_id).cloned().collect()
    }

    pub(crate) fn violations_for(&self, attempt_id: &str) -> Vec<Violation> {
        self.lock().violations.iter().filter(|v| v.attempt_id == attempt_id).cloned().collect()
    }

    pub(crate) fn fail_violation_writes(&self, fail: bool) {
        self.fail_violations.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn find_test(&self, test_id: &str) -> RepoResult<Option<Test>> {
        Ok(self.lock().tests.get(test_id).cloned())
    }

    async fn list_questions(&self, test_id: &str) -> RepoResult<Vec<Question>> {
        let mut questions: Vec<Question> =
            self.lock().questions.iter().filter(|q| q.test_id == test_id).cloned().collect();
        questions.sort_by(|a, b| a.order_index.cmp(&b.order_index).then(a.id.cmp(&b.id)));
        Ok(questions)
    }

    async fn find_question(&self, question_id: &str) -> RepoResult<Option<Question>> {
        Ok(self.lock().questions.iter().find(|q| q.id == question_id).cloned())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<User>> {
        Ok(self.lock().users.get(id).cloned())
    }
}

#[async_trait]
impl AttemptRepository for MemoryStore {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<Attempt>> {
        Ok(self.attempt(id))
    }

    async fn find_in_progress(
        &self,
        test_id: &str,
        student_id: &str,
    ) -> RepoResult<Option<Attempt>> {
        Ok(self
            .lock()
            .attempts
            .values()
            .find(|a| {
                a.test_id == test_id
                    && a.student_id == student_id
                    && a.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn count_submitted(&self, test_id: &str, student_id: &str) -> RepoResult<i64> {
        Ok(self
            .lock()
            .attempts
            .values()
            .filter(|a| {
                a.test_id == test_id
                    && a.student_id == student_id
                    && a.status == AttemptStatus::Submitted
            })
            .count() as i64)
    }

    async fn insert_in_progress(&self, attempt: &NewAttempt<'_>) -> RepoResult<bool> {
        let mut tables = self.lock();
        let taken = tables.attempts.values().any(|a| {
            a.test_id == attempt.test_id
                && a.student_id == attempt.student_id
                && a.status == AttemptStatus::InProgress
        });
        if taken || tables.attempts.contains_key(attempt.id) {
            return Ok(false);
        }

        tables.attempts.insert(
            attempt.id.to_string(),
            Attempt {
                id: attempt.id.to_string(),
                test_id: attempt.test_id.to_string(),
                student_id: attempt.student_id.to_string(),
                status: AttemptStatus::InProgress,
                selected_question_ids: attempt.selected_question_ids.map(|ids| ids.to_vec()),
                platform: attempt.platform.map(str::to_string),
                browser: attempt.browser.map(str::to_string),
                device_info: attempt.device_info.clone(),
                score: None,
                total_points: attempt.total_points,
                violation_count: 0,
                window_switch_count: 0,
                screenshot_count: 0,
                phone_call_count: 0,
                other_violation_count: 0,
                started_at: attempt.started_at,
                expires_at: attempt.expires_at,
                submitted_at: None,
                created_at: attempt.started_at,
                updated_at: attempt.started_at,
            },
        );
        Ok(true)
    }

    async fn mark_submitted(
        &self,
        id: &str,
        score: f64,
        total_points: f64,
        submitted_at: time::PrimitiveDateTime,
    ) -> RepoResult<bool> {
        let mut tables = self.lock();
        let Some(attempt) = tables.attempts.get_mut(id) else {
            return Ok(false);
        };
        if attempt.status != AttemptStatus::InProgress {
            return Ok(false);
        }
        attempt.status = AttemptStatus::Submitted;
        attempt.score = Some(score);
        attempt.total_points = total_points;
        attempt.submitted_at = Some(submitted_at);
        attempt.updated_at = submitted_at;
        Ok(true)
    }
}

#[async_trait]
impl AnswerRepository for MemoryStore {
    async fn upsert_submission(&self, answer: &UpsertAnswer<'_>) -> RepoResult<Answer> {
        let mut tables = self.lock();
        let existing = tables
            .answers
            .iter()
            .position(|a| a.attempt_id == answer.attempt_id && a.question_id == answer.question_id);

        let id = match existing {
            Some(index) => tables.answers[index].id.clone(),
            None => answer.id.to_string(),
        };
        let stored = Answer {
            id,
            attempt_id: answer.attempt_id.to_string(),
            question_id: answer.question_id.to_string(),
            answer: answer.answer.map(str::to_string),
            code_submission: answer.code_submission.map(str::to_string),
            code_language: answer.code_language.map(str::to_string),
            is_correct: answer.is_correct,
            points_earned: answer.points_earned,
            test_results: Json(Vec::new()),
            is_flagged: answer.is_flagged,
            submitted_at: answer.submitted_at,
            updated_at: answer.submitted_at,
        };

        match existing {
            Some(index) => tables.answers[index] = stored.clone(),
            None => tables.answers.push(stored.clone()),
        }
        Ok(stored)
    }

    async fn record_judging(&self, update: &JudgingUpdate<'_>) -> RepoResult<Option<Answer>> {
        let mut tables = self.lock();
        let existing = tables
            .answers
            .iter_mut()
            .find(|a| a.attempt_id == update.attempt_id && a.question_id == update.question_id);

        if let Some(answer) = existing {
            if let Some(expected) = update.expected_code {
                if answer.code_submission.as_deref() != Some(expected) {
                    return Ok(None);
                }
            }
            answer.is_correct = Some(update.is_correct);
            answer.points_earned = update.points_earned;
            answer.test_results = Json(update.test_results.to_vec());
            answer.updated_at = update.updated_at;
            return Ok(Some(answer.clone()));
        }

        let created = Answer {
            id: update.id.to_string(),
            attempt_id: update.attempt_id.to_string(),
            question_id: update.question_id.to_string(),
            answer: None,
            code_submission: None,
            code_language: None,
            is_correct: Some(update.is_correct),
            points_earned: update.points_earned,
            test_results: Json(update.test_results.to_vec()),
            is_flagged: false,
            submitted_at: update.updated_at,
            updated_at: update.updated_at,
        };
        tables.answers.push(created.clone());
        Ok(Some(created))
    }

    async fn list_by_attempt(&self, attempt_id: &str) -> RepoResult<Vec<Answer>> {
        Ok(self.answers_for(attempt_id))
    }

    async fn find(&self, attempt_id: &str, question_id: &str) -> RepoResult<Option<Answer>> {
        Ok(self
            .lock()
            .answers
            .iter()
            .find(|a| a.attempt_id == attempt_id && a.question_id == question_id)
            .cloned())
    }

    async fn list_unjudged_code(&self, limit: usize) -> RepoResult<Vec<Answer>> {
        let tables = self.lock();
        let judgeable = |question_id: &str| {
            tables.questions.iter().any(|q| {
                q.id == question_id
                    && q.question_type == QuestionType::Code
                    && !q.test_cases.is_empty()
            })
        };
        let mut pending: Vec<Answer> = tables
            .answers
            .iter()
            .filter(|a| {
                a.code_submission.is_some() && a.is_correct.is_none() && judgeable(&a.question_id)
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }
}

#[async_trait]
impl ViolationRepository for MemoryStore {
    async fn append(&self, violation: &NewViolation<'_>) -> RepoResult<Violation> {
        if self.fail_violations.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("violation store offline".to_string()));
        }

        let mut tables = self.lock();
        let Some(attempt) = tables.attempts.get_mut(violation.attempt_id) else {
            return Err(RepositoryError::Database(sqlx::Error::RowNotFound));
        };
        attempt.violation_count += 1;
        match violation.violation_type {
            ViolationType::WindowSwitch => attempt.window_switch_count += 1,
            ViolationType::Screenshot => attempt.screenshot_count += 1,
            ViolationType::PhoneCall => attempt.phone_call_count += 1,
            ViolationType::Other => attempt.other_violation_count += 1,
        }
        attempt.updated_at = violation.recorded_at;

        let stored = Violation {
            id: violation.id.to_string(),
            attempt_id: violation.attempt_id.to_string(),
            violation_type: violation.violation_type,
            details: violation.details.map(str::to_string),
            occurred_at: violation.occurred_at,
            recorded_at: violation.recorded_at,
        };
        tables.violations.push(stored.clone());
        Ok(stored)
    }

    async fn list_by_attempt(&self, attempt_id: &str) -> RepoResult<Vec<Violation>> {
        Ok(self.violations_for(attempt_id))
    }
}

#[async_trait]
impl CertificateRepository for MemoryStore {
    async fn find_active_for_attempt(&self, attempt_id: &str) -> RepoResult<Option<Certificate>> {
        Ok(self
            .lock()
            .certificates
            .iter()
            .find(|c| c.attempt_id == attempt_id && c.is_active)
            .cloned())
    }

    async fn insert_if_absent(
        &self,
        certificate: &NewCertificate<'_>,
    ) -> RepoResult<Option<Certificate>> {
        let mut tables = self.lock();
        let conflict = tables.certificates.iter().any(|c| {
            c.code == certificate.code || (c.attempt_id == certificate.attempt_id && c.is_active)
        });
        if conflict {
            return Ok(None);
        }

        let stored = Certificate {
            id: certificate.id.to_string(),
            test_id: certificate.test_id.to_string(),
            student_id: certificate.student_id.to_string(),
            attempt_id: certificate.attempt_id.to_string(),
            code: certificate.code.to_string(),
            percentage: certificate.percentage,
            issued_at: certificate.issued_at,
            is_active: true,
        };
        tables.certificates.push(stored.clone());
        Ok(Some(stored))
    }
}

#[async_trait]
impl HealthRepository for MemoryStore {
    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }
}
