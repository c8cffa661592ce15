use std::path::PathBuf;

use super::parsing::{
    env_flag, env_optional, env_or_default, env_parse, parse_command_prefix, parse_cors_origins,
    parse_environment, parse_finite,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    ApiSettings, AttemptSettings, ConfigError, CorsSettings, DatabaseSettings, JudgingSettings,
    RedisSettings, RuntimeSettings, SandboxSettings, SecuritySettings, ServerHost, ServerPort,
    ServerSettings, Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("EXAMINER_HOST", "0.0.0.0");
        let port = env_or_default("EXAMINER_PORT", "8000");

        let environment = parse_environment(
            env_optional("EXAMINER_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config =
            env_flag("EXAMINER_STRICT_CONFIG", false) || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Examiner API");
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = env_optional("SECRET_KEY").unwrap_or_else(load_or_create_secret_key);
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let database = DatabaseSettings {
            postgres_server: env_or_default("POSTGRES_SERVER", "localhost"),
            postgres_port: env_parse("POSTGRES_PORT", "5432")?,
            postgres_user: env_or_default("POSTGRES_USER", "examiner"),
            postgres_password: env_or_default("POSTGRES_PASSWORD", ""),
            postgres_db: env_or_default("POSTGRES_DB", "examiner_db"),
            database_url: env_optional("DATABASE_URL"),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", "30")?,
        };

        let redis = RedisSettings {
            host: env_or_default("REDIS_HOST", "localhost"),
            port: env_parse("REDIS_PORT", "6379")?,
            db: env_parse("REDIS_DB", "0")?,
            password: env_or_default("REDIS_PASSWORD", ""),
        };

        let sandbox = SandboxSettings {
            timeout_seconds: env_parse("SANDBOX_TIMEOUT_SECONDS", "5")?,
            max_output_bytes: env_parse("SANDBOX_MAX_OUTPUT_BYTES", "65536")?,
            max_parallel_cases: env_parse("SANDBOX_MAX_PARALLEL_CASES", "4")?,
            python_bin: env_or_default("SANDBOX_PYTHON_BIN", "python3"),
            node_bin: env_or_default("SANDBOX_NODE_BIN", "node"),
            wrapper: parse_command_prefix(env_optional("SANDBOX_WRAPPER")),
            allow_unisolated: env_flag("SANDBOX_ALLOW_UNISOLATED", false),
            memory_limit_mb: env_parse("SANDBOX_MEMORY_LIMIT_MB", "256")?,
            max_processes: env_parse("SANDBOX_MAX_PROCESSES", "64")?,
            max_file_bytes: env_parse("SANDBOX_MAX_FILE_BYTES", "1048576")?,
            work_dir: env_optional("SANDBOX_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("examiner-sandbox")),
        };

        let judging = JudgingSettings {
            judge_on_submit: env_flag("JUDGE_ON_SUBMIT", true),
            workers: env_parse("JUDGE_WORKERS", "2")?,
            queue_capacity: env_parse("JUDGE_QUEUE_CAPACITY", "256")?,
            sweep_interval_seconds: env_parse("JUDGE_SWEEP_INTERVAL_SECONDS", "30")?,
            sweep_batch: env_parse("JUDGE_SWEEP_BATCH", "100")?,
        };

        let attempt = AttemptSettings {
            submit_grace_seconds: env_parse("ATTEMPT_SUBMIT_GRACE_SECONDS", "300")?,
            default_passing_score: parse_finite(
                "DEFAULT_PASSING_SCORE",
                env_parse("DEFAULT_PASSING_SCORE", "60")?,
            )?,
            violation_queue_capacity: env_parse("VIOLATION_QUEUE_CAPACITY", "1024")?,
            code_rate_limit_per_minute: env_parse("CODE_RATE_LIMIT_PER_MINUTE", "30")?,
        };

        let telemetry = TelemetrySettings {
            log_level: env_or_default("EXAMINER_LOG_LEVEL", "info"),
            json: env_flag("EXAMINER_LOG_JSON", false),
            prometheus_enabled: env_flag("PROMETHEUS_ENABLED", false),
        };

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database,
            redis,
            sandbox,
            judging,
            attempt,
            telemetry,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn sandbox(&self) -> &SandboxSettings {
        &self.sandbox
    }

    pub(crate) fn judging(&self) -> &JudgingSettings {
        &self.judging
    }

    pub(crate) fn attempt(&self) -> &AttemptSettings {
        &self.attempt
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require_nonzero("SANDBOX_TIMEOUT_SECONDS", self.sandbox.timeout_seconds as usize)?;
        require_nonzero("SANDBOX_MAX_PARALLEL_CASES", self.sandbox.max_parallel_cases)?;
        require_nonzero("JUDGE_WORKERS", self.judging.workers)?;
        require_nonzero("JUDGE_QUEUE_CAPACITY", self.judging.queue_capacity)?;
        require_nonzero(
            "JUDGE_SWEEP_INTERVAL_SECONDS",
            self.judging.sweep_interval_seconds as usize,
        )?;
        require_nonzero("JUDGE_SWEEP_BATCH", self.judging.sweep_batch)?;
        require_nonzero("SANDBOX_MEMORY_LIMIT_MB", self.sandbox.memory_limit_mb as usize)?;
        require_nonzero("SANDBOX_MAX_PROCESSES", self.sandbox.max_processes as usize)?;
        require_nonzero("VIOLATION_QUEUE_CAPACITY", self.attempt.violation_queue_capacity)?;

        if !(0.0..=100.0).contains(&self.attempt.default_passing_score) {
            return Err(ConfigError::InvalidValue {
                field: "DEFAULT_PASSING_SCORE",
                value: self.attempt.default_passing_score.to_string(),
            });
        }

        if self.attempt.submit_grace_seconds < 0 {
            return Err(ConfigError::InvalidValue {
                field: "ATTEMPT_SUBMIT_GRACE_SECONDS",
                value: self.attempt.submit_grace_seconds.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.sandbox.wrapper.is_empty() {
            return Err(ConfigError::MissingSecret("SANDBOX_WRAPPER"));
        }
        if self.sandbox.allow_unisolated {
            return Err(ConfigError::InvalidValue {
                field: "SANDBOX_ALLOW_UNISOLATED",
                value: "true".to_string(),
            });
        }

        Ok(())
    }
}

fn require_nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue { field, value: "0".to_string() });
    }
    Ok(())
}
