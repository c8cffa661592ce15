use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::state::AppState;
use crate::services::{CodeJudge, ViolationTracker};
use crate::tasks::queues::{BackgroundQueues, JudgeJob, JudgeQueue, ViolationReport};

/// Starts the judge pool, the unjudged-code sweep and the violation writer.
/// They stop when `shutdown` flips to `true`.
pub(crate) fn spawn_workers(
    state: &AppState,
    queues: BackgroundQueues,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let judging = state.settings().judging();
    let workers = judging.workers.max(1);
    let mut handles = Vec::with_capacity(workers + 2);

    let jobs = Arc::new(Mutex::new(queues.judge));
    for worker in 0..workers {
        handles.push(tokio::spawn(judge_worker(
            worker,
            state.services().judge.clone(),
            state.judge_queue().clone(),
            jobs.clone(),
            shutdown.clone(),
        )));
    }
    if judging.judge_on_submit {
        handles.push(tokio::spawn(judge_sweep_loop(
            state.services().judge.clone(),
            state.judge_queue().clone(),
            Duration::from_secs(judging.sweep_interval_seconds),
            judging.sweep_batch,
            shutdown.clone(),
        )));
    }
    handles.push(tokio::spawn(violation_worker(
        state.services().violations.clone(),
        queues.violations,
        shutdown,
    )));

    tracing::info!(judge_workers = workers, "Background workers started");
    handles
}

pub(crate) async fn join(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }
}

async fn judge_worker(
    worker: usize,
    judge: CodeJudge,
    queue: JudgeQueue,
    jobs: Arc<Mutex<mpsc::Receiver<JudgeJob>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = {
            let mut receiver = jobs.lock().await;
            tokio::select! {
                _ = shutdown.changed() => break,
                job = receiver.recv() => job,
            }
        };
        let Some(job) = job else {
            break;
        };

        let outcome = judge.judge(job.clone()).await;
        queue.finish(&job);
        if let Err(err) = outcome {
            tracing::error!(
                worker,
                attempt_id = %job.attempt_id,
                question_id = %job.question_id,
                error = %err,
                "Failed to judge code submission"
            );
        }
    }
    tracing::debug!(worker, "Judge worker stopped");
}

/// The first tick fires at once, so answers left pending by a restart are picked up on boot.
async fn judge_sweep_loop(
    judge: CodeJudge,
    queue: JudgeQueue,
    period: Duration,
    batch: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => match judge.requeue_unjudged(&queue, batch).await {
                Ok(0) => {}
                Ok(requeued) => tracing::info!(requeued, "Requeued unjudged code answers"),
                Err(err) => tracing::error!(error = %err, "requeue_unjudged failed"),
            },
        }
    }
    tracing::debug!("Judge sweep stopped");
}

async fn violation_worker(
    tracker: ViolationTracker,
    mut reports: mpsc::Receiver<ViolationReport>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            report = reports.recv() => match report {
                Some(report) => tracker.record_best_effort(report).await,
                None => break,
            },
        }
    }
    tracing::debug!("Violation worker stopped");
}
