use async_trait::async_trait;

use crate::repositories::{PgStore, RepoResult};

#[async_trait]
pub(crate) trait HealthRepository: Send + Sync {
    async fn ping(&self) -> RepoResult<()>;
}

#[async_trait]
impl HealthRepository for PgStore {
    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }
}
