use async_trait::async_trait;

use crate::db::models::{Question, Test};
use crate::repositories::{PgStore, RepoResult};

const TEST_COLUMNS: &str = "\
    id, title, duration_minutes, allowed_platforms, allowed_browsers, max_attempts, \
    questions_to_ask, passing_score, show_review, created_at, updated_at";

const QUESTION_COLUMNS: &str = "\
    id, test_id, question_type, prompt, points, order_index, options, correct_answer, \
    test_cases, created_at";

/// Read-only view of tests and questions owned by the authoring service.
#[async_trait]
pub(crate) trait CatalogRepository: Send + Sync {
    async fn find_test(&self, test_id: &str) -> RepoResult<Option<Test>>;

    /// Questions of a test in their natural order.
    async fn list_questions(&self, test_id: &str) -> RepoResult<Vec<Question>>;

    async fn find_question(&self, question_id: &str) -> RepoResult<Option<Question>>;
}

#[async_trait]
impl CatalogRepository for PgStore {
    async fn find_test(&self, test_id: &str) -> RepoResult<Option<Test>> {
        let test =
            sqlx::query_as::<_, Test>(&format!("SELECT {TEST_COLUMNS} FROM tests WHERE id = $1"))
                .bind(test_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(test)
    }

    async fn list_questions(&self, test_id: &str) -> RepoResult<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE test_id = $1 \
             ORDER BY order_index, created_at, id"
        ))
        .bind(test_id)
        .fetch_all(self.pool())
        .await?;
        Ok(questions)
    }

    async fn find_question(&self, question_id: &str) -> RepoResult<Option<Question>> {
        let question = sqlx::query_as::<_, Question>(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(question_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(question)
    }
}
