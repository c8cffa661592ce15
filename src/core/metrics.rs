use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    describe_counter!("http_requests_total", "HTTP requests by response status");
    describe_histogram!("http_request_duration_seconds", "HTTP request latency");
    describe_counter!("attempts_started_total", "Attempts created");
    describe_counter!("attempts_submitted_total", "Attempts transitioned to submitted");
    describe_counter!("answers_submitted_total", "Answer upserts by question type");
    describe_counter!("sandbox_runs_total", "Sandbox process runs by outcome");
    describe_histogram!("sandbox_run_duration_seconds", "Wall-clock time of one sandbox run");
    describe_counter!("judge_jobs_total", "Code judging jobs by outcome");
    describe_counter!("violations_recorded_total", "Integrity violations recorded by type");
    describe_counter!("violations_dropped_total", "Violation reports that could not be recorded");
    describe_counter!("certificates_issued_total", "Certificates issued");
}
