pub(crate) mod answers;
pub(crate) mod attempts;
pub(crate) mod certificates;
pub(crate) mod judging;
pub(crate) mod scoring;
pub(crate) mod selection;
pub(crate) mod violations;

use std::sync::Arc;

use thiserror::Error;

use crate::core::config::Settings;
use crate::repositories::{Repositories, RepositoryError};
use crate::sandbox::CodeRunner;
use crate::tasks::queues::JudgeQueue;

pub(crate) use answers::AnswerService;
pub(crate) use attempts::AttemptService;
pub(crate) use certificates::CertificateEvaluator;
pub(crate) use judging::CodeJudge;
pub(crate) use scoring::ScoreAggregator;
pub(crate) use violations::ViolationTracker;

#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    RestrictionViolation(String),
    #[error("Maximum attempts reached ({max})")]
    AttemptLimitExceeded { max: i64 },
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
    #[error("{0}")]
    Internal(&'static str),
}

pub(crate) type ServiceResult<T> = Result<T, ServiceError>;

/// Wires the engine's services over one set of repositories.
#[derive(Clone)]
pub(crate) struct Services {
    pub(crate) attempts: AttemptService,
    pub(crate) answers: AnswerService,
    pub(crate) violations: ViolationTracker,
    pub(crate) certificates: CertificateEvaluator,
    pub(crate) judge: CodeJudge,
}

impl Services {
    pub(crate) fn new(
        settings: &Settings,
        repositories: &Repositories,
        runner: Arc<dyn CodeRunner>,
        judge_queue: JudgeQueue,
    ) -> Self {
        let scores = ScoreAggregator::new(repositories.catalog.clone(), repositories.answers.clone());
        let certificates = CertificateEvaluator::new(
            repositories,
            scores.clone(),
            settings.attempt().default_passing_score,
        );
        let attempts = AttemptService::new(repositories, scores, certificates.clone());
        let answers = AnswerService::new(
            repositories,
            certificates.clone(),
            judge_queue,
            settings.judging().judge_on_submit,
            settings.attempt().submit_grace_seconds,
        );
        let violations = ViolationTracker::new(repositories);
        let judge = CodeJudge::new(
            runner,
            repositories.catalog.clone(),
            repositories.answers.clone(),
            answers.clone(),
            settings.sandbox().max_parallel_cases,
        );

        Self { attempts, answers, violations, certificates, judge }
    }
}
