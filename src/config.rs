//! Configuration management for tasktree.
//!
//! Configuration can be set via environment variables:
//! - `OPENROUTER_API_KEY` - Required. Your OpenRouter API key.
//! - `DEFAULT_MODEL` - Optional. The model used for every gateway call. Defaults to `perplexity/sonar-pro`.
//! - `MAX_TASKS` - Optional. Global cap on tasks admitted into the tree. Defaults to `20`.
//! - `MAX_DEPTH` - Optional. Maximum decomposition depth (root = 0). Defaults to `5`.
//! - `MAX_SUBTASKS` - Optional. Maximum children per decomposition. Defaults to `5`.
//! - `MAX_RETRIES` - Optional. Attempts per gateway protocol exchange. Defaults to `5`.
//! - `SUBTASK_OVERFLOW` - Optional. `retry` or `truncate` when a decomposition over-produces. Defaults to `retry`.
//! - `CODE_TIMEOUT_SECS` - Optional. Wall-clock limit for generated-code subprocesses. Defaults to `10`.
//! - `EXEC_DEADLINE_SECS` - Optional. Overall deadline for draining leaf executions. Defaults to `300`.
//! - `PYTHON_BIN` - Optional. Interpreter for generated code. Defaults to `python3`.
//! - `SESSION_ENDPOINT` - Optional. Base URL of the remote computer-use instance API.
//! - `SESSION_API_KEY` - Optional. API key for the remote session service.
//! - `SESSION_MAX_TURNS` - Optional. Interaction turns before a session is abandoned. Defaults to `8`.
//! - `SESSION_HISTORY_WINDOW` - Optional. Conversation turns kept in session context. Defaults to `5`.
//! - `OUTPUT_PATH` - Optional. Where the run artifact is written. Defaults to `out.json`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Policy for a decomposition that returns more children than allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtaskOverflow {
    /// Count the oversized list as a failed attempt and ask again.
    Retry,
    /// Keep the first `max_subtasks` children and drop the rest.
    Truncate,
}

impl SubtaskOverflow {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "retry" => Ok(Self::Retry),
            "truncate" => Ok(Self::Truncate),
            other => Err(ConfigError::InvalidValue(
                "SUBTASK_OVERFLOW".to_string(),
                format!("expected 'retry' or 'truncate', got '{}'", other),
            )),
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter API key
    pub api_key: String,

    /// Model identifier for every gateway call (OpenRouter format)
    pub model: String,

    /// Global cap on tasks admitted into the tree
    pub max_tasks: usize,

    /// Maximum decomposition depth (root = 0)
    pub max_depth: usize,

    /// Maximum children per decomposition
    pub max_subtasks: usize,

    /// Attempts per gateway protocol exchange (parse + validate)
    pub max_retries: u32,

    /// What to do when a decomposition over-produces
    pub subtask_overflow: SubtaskOverflow,

    /// Wall-clock limit for one generated-code subprocess
    pub code_timeout: Duration,

    /// Overall deadline for draining spawned leaf executions
    pub exec_deadline: Duration,

    /// Interpreter used to run generated code
    pub python_bin: String,

    /// Base URL of the remote computer-use instance API, if any
    pub session_endpoint: Option<String>,

    /// API key for the remote session service
    pub session_api_key: Option<String>,

    /// Interaction turns before a computer-use session is abandoned
    pub session_max_turns: usize,

    /// Conversation turns kept in the session context window
    pub session_history_window: usize,

    /// Where the run artifact is written
    pub output_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENROUTER_API_KEY` is not set,
    /// or `ConfigError::InvalidValue` for unparsable numeric/policy values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENROUTER_API_KEY".to_string()))?;

        let model =
            std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| "perplexity/sonar-pro".to_string());

        let max_tasks = parse_env("MAX_TASKS", 20)?;
        let max_depth = parse_env("MAX_DEPTH", 5)?;
        let max_subtasks = parse_env("MAX_SUBTASKS", 5)?;
        let max_retries = parse_env("MAX_RETRIES", 5u32)?;

        let subtask_overflow = match std::env::var("SUBTASK_OVERFLOW") {
            Ok(value) => SubtaskOverflow::parse(&value)?,
            Err(_) => SubtaskOverflow::Retry,
        };

        let code_timeout = Duration::from_secs(parse_env("CODE_TIMEOUT_SECS", 10u64)?);
        let exec_deadline = Duration::from_secs(parse_env("EXEC_DEADLINE_SECS", 300u64)?);

        let python_bin = std::env::var("PYTHON_BIN").unwrap_or_else(|_| "python3".to_string());

        let session_endpoint = std::env::var("SESSION_ENDPOINT").ok();
        let session_api_key = std::env::var("SESSION_API_KEY").ok();
        let session_max_turns = parse_env("SESSION_MAX_TURNS", 8)?;
        let session_history_window = parse_env("SESSION_HISTORY_WINDOW", 5)?;

        let output_path = std::env::var("OUTPUT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("out.json"));

        Ok(Self {
            api_key,
            model,
            max_tasks,
            max_depth,
            max_subtasks,
            max_retries,
            subtask_overflow,
            code_timeout,
            exec_deadline,
            python_bin,
            session_endpoint,
            session_api_key,
            session_max_turns,
            session_history_window,
            output_path,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            max_tasks: 20,
            max_depth: 5,
            max_subtasks: 5,
            max_retries: 5,
            subtask_overflow: SubtaskOverflow::Retry,
            code_timeout: Duration::from_secs(10),
            exec_deadline: Duration::from_secs(300),
            python_bin: "python3".to_string(),
            session_endpoint: None,
            session_api_key: None,
            session_max_turns: 8,
            session_history_window: 5,
            output_path: PathBuf::from("out.json"),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_policy_parses() {
        assert_eq!(
            SubtaskOverflow::parse("retry").unwrap(),
            SubtaskOverflow::Retry
        );
        assert_eq!(
            SubtaskOverflow::parse(" Truncate ").unwrap(),
            SubtaskOverflow::Truncate
        );
        assert!(SubtaskOverflow::parse("drop").is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::new("key".to_string(), "test/model".to_string());
        assert_eq!(config.max_tasks, 20);
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.max_subtasks, 5);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.subtask_overflow, SubtaskOverflow::Retry);
        assert_eq!(config.code_timeout, Duration::from_secs(10));
    }
}
