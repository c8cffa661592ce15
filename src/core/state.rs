use std::sync::Arc;

use crate::core::{config::Settings, redis::RedisHandle};
use crate::repositories::Repositories;
use crate::sandbox::CodeRunner;
use crate::services::Services;
use crate::tasks::queues::{BackgroundQueues, JudgeQueue, ViolationQueue};

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    repositories: Repositories,
    redis: RedisHandle,
    services: Services,
    judge_queue: JudgeQueue,
    violation_queue: ViolationQueue,
}

impl AppState {
    /// Also returns the receiving ends of the worker queues.
    pub(crate) fn new(
        settings: Settings,
        repositories: Repositories,
        redis: RedisHandle,
        runner: Arc<dyn CodeRunner>,
    ) -> (Self, BackgroundQueues) {
        let (judge_queue, judge_rx) = JudgeQueue::channel(settings.judging().queue_capacity);
        let (violation_queue, violation_rx) =
            ViolationQueue::channel(settings.attempt().violation_queue_capacity);
        let services = Services::new(&settings, &repositories, runner, judge_queue.clone());

        let state = Self {
            inner: Arc::new(InnerState {
                settings,
                repositories,
                redis,
                services,
                judge_queue,
                violation_queue,
            }),
        };
        (state, BackgroundQueues { judge: judge_rx, violations: violation_rx })
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn repositories(&self) -> &Repositories {
        &self.inner.repositories
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn services(&self) -> &Services {
        &self.inner.services
    }

    pub(crate) fn judge_queue(&self) -> &JudgeQueue {
        &self.inner.judge_queue
    }

    pub(crate) fn violation_queue(&self) -> &ViolationQueue {
        &self.inner.violation_queue
    }
}
