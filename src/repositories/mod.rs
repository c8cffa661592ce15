pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod catalog;
pub(crate) mod certificates;
pub(crate) mod health;
#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod postgres;
pub(crate) mod users;
pub(crate) mod violations;

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

pub(crate) use answers::{AnswerRepository, JudgingUpdate, UpsertAnswer};
pub(crate) use attempts::{AttemptRepository, NewAttempt};
pub(crate) use catalog::CatalogRepository;
pub(crate) use certificates::{CertificateRepository, NewCertificate};
pub(crate) use health::HealthRepository;
pub(crate) use postgres::PgStore;
pub(crate) use users::UserRepository;
pub(crate) use violations::{NewViolation, ViolationRepository};

#[derive(Debug, Error)]
pub(crate) enum RepositoryError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                RepositoryError::Unavailable(err.to_string())
            }
            other => RepositoryError::Database(other),
        }
    }
}

pub(crate) type RepoResult<T> = Result<T, RepositoryError>;

/// Storage seams handed to every service; built once at startup.
#[derive(Clone)]
pub(crate) struct Repositories {
    pub(crate) catalog: Arc<dyn CatalogRepository>,
    pub(crate) users: Arc<dyn UserRepository>,
    pub(crate) attempts: Arc<dyn AttemptRepository>,
    pub(crate) answers: Arc<dyn AnswerRepository>,
    pub(crate) violations: Arc<dyn ViolationRepository>,
    pub(crate) certificates: Arc<dyn CertificateRepository>,
    pub(crate) health: Arc<dyn HealthRepository>,
}

impl Repositories {
    pub(crate) fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            catalog: store.clone(),
            users: store.clone(),
            attempts: store.clone(),
            answers: store.clone(),
            violations: store.clone(),
            certificates: store.clone(),
            health: store,
        }
    }

    #[cfg(test)]
    pub(crate) fn in_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            catalog: store.clone(),
            users: store.clone(),
            attempts: store.clone(),
            answers: store.clone(),
            violations: store.clone(),
            certificates: store.clone(),
            health: store,
        }
    }
}
