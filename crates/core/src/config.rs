use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["taskpilot.toml", "config/taskpilot.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub completion: CompletionConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Limits applied around every call to the external completion service.
#[derive(Clone, Debug)]
pub struct CompletionConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

/// Tunables of the conversational pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub confidence_threshold: f64,
    pub history_window: usize,
    pub recent_task_limit: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub completion_timeout_secs: Option<u64>,
    pub confidence_threshold: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://taskpilot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            completion: CompletionConfig { timeout_secs: 20, max_retries: 0, retry_backoff_ms: 250 },
            pipeline: PipelineConfig {
                confidence_threshold: 0.6,
                history_window: 10,
                recent_task_limit: 5,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(completion) = patch.completion {
            if let Some(timeout_secs) = completion.timeout_secs {
                self.completion.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = completion.max_retries {
                self.completion.max_retries = max_retries;
            }
            if let Some(retry_backoff_ms) = completion.retry_backoff_ms {
                self.completion.retry_backoff_ms = retry_backoff_ms;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(confidence_threshold) = pipeline.confidence_threshold {
                self.pipeline.confidence_threshold = confidence_threshold;
            }
            if let Some(history_window) = pipeline.history_window {
                self.pipeline.history_window = history_window;
            }
            if let Some(recent_task_limit) = pipeline.recent_task_limit {
                self.pipeline.recent_task_limit = recent_task_limit;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TASKPILOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TASKPILOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("TASKPILOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TASKPILOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("TASKPILOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TASKPILOT_COMPLETION_TIMEOUT_SECS") {
            self.completion.timeout_secs = parse_env("TASKPILOT_COMPLETION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TASKPILOT_COMPLETION_MAX_RETRIES") {
            self.completion.max_retries = parse_env("TASKPILOT_COMPLETION_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("TASKPILOT_COMPLETION_RETRY_BACKOFF_MS") {
            self.completion.retry_backoff_ms =
                parse_env("TASKPILOT_COMPLETION_RETRY_BACKOFF_MS", &value)?;
        }

        if let Some(value) = read_env("TASKPILOT_PIPELINE_CONFIDENCE_THRESHOLD") {
            self.pipeline.confidence_threshold =
                parse_env("TASKPILOT_PIPELINE_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TASKPILOT_PIPELINE_HISTORY_WINDOW") {
            self.pipeline.history_window = parse_env("TASKPILOT_PIPELINE_HISTORY_WINDOW", &value)?;
        }
        if let Some(value) = read_env("TASKPILOT_PIPELINE_RECENT_TASK_LIMIT") {
            self.pipeline.recent_task_limit =
                parse_env("TASKPILOT_PIPELINE_RECENT_TASK_LIMIT", &value)?;
        }

        let log_level =
            read_env("TASKPILOT_LOGGING_LEVEL").or_else(|| read_env("TASKPILOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TASKPILOT_LOGGING_FORMAT").or_else(|| read_env("TASKPILOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(timeout_secs) = overrides.completion_timeout_secs {
            self.completion.timeout_secs = timeout_secs;
        }
        if let Some(confidence_threshold) = overrides.confidence_threshold {
            self.pipeline.confidence_threshold = confidence_threshold;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_completion(&self.completion)?;
        validate_pipeline(&self.pipeline)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// First existing config file, either the explicit path or a default location.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_completion(completion: &CompletionConfig) -> Result<(), ConfigError> {
    if completion.timeout_secs == 0 || completion.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "completion.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if completion.max_retries > 5 {
        return Err(ConfigError::Validation(
            "completion.max_retries must be at most 5".to_string(),
        ));
    }

    Ok(())
}

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&pipeline.confidence_threshold) {
        return Err(ConfigError::Validation(
            "pipeline.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if !(1..=50).contains(&pipeline.history_window) {
        return Err(ConfigError::Validation(
            "pipeline.history_window must be in range 1..=50".to_string(),
        ));
    }

    if !(1..=20).contains(&pipeline.recent_task_limit) {
        return Err(ConfigError::Validation(
            "pipeline.recent_task_limit must be in range 1..=20".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    completion: Option<CompletionPatch>,
    pipeline: Option<PipelinePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionPatch {
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    confidence_threshold: Option<f64>,
    history_window: Option<usize>,
    recent_task_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
