use async_trait::async_trait;

use crate::db::models::User;
use crate::repositories::{PgStore, RepoResult};

const COLUMNS: &str = "id, full_name, role, is_active, created_at";

#[async_trait]
pub(crate) trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<User>>;
}

#[async_trait]
impl UserRepository for PgStore {
    async fn find_by_id(&self, id: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }
}
