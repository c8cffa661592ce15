use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;
use uuid::Uuid;

use crate::core::config::Settings;
use crate::sandbox::{CodeRunner, Language, RunOutcome, SandboxError};

const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Kernel resource limits applied to every child before it execs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ResourceLimits {
    pub(crate) memory_bytes: u64,
    pub(crate) max_processes: u64,
    pub(crate) max_file_bytes: u64,
    pub(crate) cpu_seconds: u64,
}

/// Runs each submission as a short-lived interpreter process in a throwaway directory.
#[derive(Debug, Clone)]
pub(crate) struct ProcessSandbox {
    python_bin: String,
    node_bin: String,
    wrapper: Vec<String>,
    allow_unisolated: bool,
    limits: ResourceLimits,
    work_dir: PathBuf,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ProcessSandbox {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        let sandbox = settings.sandbox();
        if sandbox.wrapper.is_empty() {
            if sandbox.allow_unisolated {
                tracing::warn!(
                    "SANDBOX_WRAPPER not configured; submissions run under rlimits only"
                );
            } else {
                tracing::error!(
                    "SANDBOX_WRAPPER not configured; code execution is refused until it is set"
                );
            }
        }

        Self {
            python_bin: sandbox.python_bin.clone(),
            node_bin: sandbox.node_bin.clone(),
            wrapper: sandbox.wrapper.clone(),
            allow_unisolated: sandbox.allow_unisolated,
            limits: ResourceLimits {
                memory_bytes: sandbox.memory_limit_mb.saturating_mul(1024 * 1024),
                max_processes: sandbox.max_processes,
                max_file_bytes: sandbox.max_file_bytes,
                // Wall-clock timeout kills first; this catches a child that outlives it.
                cpu_seconds: sandbox.timeout_seconds.saturating_add(1),
            },
            work_dir: sandbox.work_dir.clone(),
            timeout: Duration::from_secs(sandbox.timeout_seconds),
            max_output_bytes: sandbox.max_output_bytes,
        }
    }

    fn isolation_missing(&self) -> bool {
        self.wrapper.is_empty() && !self.allow_unisolated
    }

    fn command_line(&self, language: Language, source: &Path) -> Vec<String> {
        let mut argv = self.wrapper.clone();
        let source = source.to_string_lossy().into_owned();
        match language {
            // -I: isolated mode, ignores PYTHON* env and user site-packages.
            Language::Python => {
                argv.extend([self.python_bin.clone(), "-I".into(), "-B".into(), source])
            }
            Language::JavaScript => argv.extend([self.node_bin.clone(), source]),
        }
        argv
    }

    async fn execute(&self, code: &str, language: Language, input: &str) -> io::Result<RunOutcome> {
        let scratch = self.work_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&scratch).await?;

        let result = self.execute_in(&scratch, code, language, input).await;

        if let Err(err) = tokio::fs::remove_dir_all(&scratch).await {
            tracing::warn!(error = %err, path = %scratch.display(), "Failed to clean sandbox dir");
        }
        result
    }

    async fn execute_in(
        &self,
        scratch: &Path,
        code: &str,
        language: Language,
        input: &str,
    ) -> io::Result<RunOutcome> {
        let source = scratch.join(language.source_file());
        tokio::fs::write(&source, code).await?;

        let argv = self.command_line(language, &source);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty sandbox command"))?;

        let mut command = Command::new(program);
        apply_limits(&mut command, self.limits, language);
        let mut child = command
            .args(args)
            .current_dir(scratch)
            .env_clear()
            .env("PATH", SANDBOX_PATH)
            .env("HOME", scratch)
            .env("LANG", "C.UTF-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = input.to_owned();
            // A program that never reads stdin closes the pipe early; that is not an error.
            tokio::spawn(async move {
                let _ = stdin.write_all(input.as_bytes()).await;
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "stderr not captured"))?;

        let limit = self.max_output_bytes;
        let run = async {
            tokio::try_join!(read_capped(stdout, limit), read_capped(stderr, limit), child.wait())
        };

        match timeout(self.timeout, run).await {
            Ok(Ok((stdout, stderr, status))) => Ok(build_outcome(&stdout, &stderr, status)),
            Ok(Err(err)) => Err(err),
            Err(_) => Ok(RunOutcome {
                output: String::new(),
                error: Some(format!(
                    "Execution timed out after {} seconds",
                    self.timeout.as_secs()
                )),
                timed_out: true,
            }),
        }
    }
}

#[async_trait]
impl CodeRunner for ProcessSandbox {
    async fn run(&self, code: &str, language: Language, input: &str) -> RunOutcome {
        if self.isolation_missing() {
            metrics::counter!(
                "sandbox_runs_total",
                "language" => language.as_str(),
                "status" => "refused"
            )
            .increment(1);
            return RunOutcome::failure(SandboxError::IsolationRequired.to_string());
        }

        let started = Instant::now();
        let outcome = match self.execute(code, language, input).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, language = language.as_str(), "Sandbox run failed");
                RunOutcome::failure(format!("Sandbox error: {err}"))
            }
        };

        let status = if outcome.timed_out {
            "timeout"
        } else if outcome.error.is_some() {
            "error"
        } else {
            "ok"
        };
        metrics::counter!(
            "sandbox_runs_total",
            "language" => language.as_str(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!("sandbox_run_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        outcome
    }
}

/// V8 reserves far more address space than it uses, so JavaScript is capped on
/// the data segment instead of RLIMIT_AS.
#[cfg(unix)]
#[allow(unsafe_code)]
fn apply_limits(command: &mut Command, limits: ResourceLimits, language: Language) {
    let memory_resource = match language {
        Language::Python => libc::RLIMIT_AS,
        Language::JavaScript => libc::RLIMIT_DATA,
    };
    let table = [
        (memory_resource, limits.memory_bytes),
        (libc::RLIMIT_NPROC, limits.max_processes),
        (libc::RLIMIT_FSIZE, limits.max_file_bytes),
        (libc::RLIMIT_CPU, limits.cpu_seconds),
        (libc::RLIMIT_CORE, 0),
    ];

    // SAFETY: the hook runs in the forked child before exec. It only reads the
    // captured array and calls setrlimit, which is async-signal-safe.
    unsafe {
        command.pre_exec(move || {
            for (resource, value) in table {
                let limit = libc::rlimit {
                    rlim_cur: value as libc::rlim_t,
                    rlim_max: value as libc::rlim_t,
                };
                if libc::setrlimit(resource, &limit) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_limits(_command: &mut Command, _limits: ResourceLimits, _language: Language) {}

/// Keeps the first `limit` bytes and discards the rest so a chatty program
/// cannot grow memory or stall on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> io::Result<Vec<u8>> {
    let mut captured = Vec::new();
    (&mut reader).take(limit as u64).read_to_end(&mut captured).await?;
    tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok(captured)
}

fn build_outcome(stdout: &[u8], stderr: &[u8], status: ExitStatus) -> RunOutcome {
    let output = String::from_utf8_lossy(stdout).into_owned();
    if status.success() {
        return RunOutcome { output, error: None, timed_out: false };
    }

    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    let error = if stderr.is_empty() { format!("Process exited with {status}") } else { stderr };
    RunOutcome { output, error: Some(error), timed_out: false }
}
