//! Process-wide harness configuration.
//!
//! Loaded from environment variables once per test. A missing region is a
//! hard error so that no provisioning call is ever made without one.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Region every provisioning and invocation call runs against.
pub const REGION_ENV_VAR: &str = "AWS_DEFAULT_REGION";

/// Set to `1` to leave infrastructure up for manual inspection.
pub const SKIP_DESTROY_ENV_VAR: &str = "TT_SKIP_DESTROY";

pub const TERRAFORM_BINARY_ENV_VAR: &str = "TT_TERRAFORM_BINARY";
pub const AWS_BINARY_ENV_VAR: &str = "TT_AWS_BINARY";
pub const MAX_RETRIES_ENV_VAR: &str = "TT_MAX_RETRIES";
pub const TIME_BETWEEN_RETRIES_ENV_VAR: &str = "TT_TIME_BETWEEN_RETRIES_SECS";

pub const DEFAULT_TERRAFORM_BINARY: &str = "terraform";
pub const DEFAULT_AWS_BINARY: &str = "aws";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIME_BETWEEN_RETRIES_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub region: String,
    pub skip_teardown: bool,
    pub terraform_binary: PathBuf,
    pub aws_binary: PathBuf,
    pub max_retries: u32,
    pub time_between_retries: Duration,
}

impl HarnessConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let region = non_empty(vars, REGION_ENV_VAR)
            .ok_or_else(|| ConfigError::MissingEnvVar(REGION_ENV_VAR.to_string()))?
            .to_string();

        let skip_teardown = vars
            .get(SKIP_DESTROY_ENV_VAR)
            .is_some_and(|v| v.trim() == "1");

        let terraform_binary = non_empty(vars, TERRAFORM_BINARY_ENV_VAR)
            .unwrap_or(DEFAULT_TERRAFORM_BINARY)
            .into();

        let aws_binary = non_empty(vars, AWS_BINARY_ENV_VAR)
            .unwrap_or(DEFAULT_AWS_BINARY)
            .into();

        let max_retries = match non_empty(vars, MAX_RETRIES_ENV_VAR) {
            Some(raw) => parse_number(MAX_RETRIES_ENV_VAR, raw)?,
            None => DEFAULT_MAX_RETRIES,
        };

        let time_between_retries = match non_empty(vars, TIME_BETWEEN_RETRIES_ENV_VAR) {
            Some(raw) => Duration::from_secs(parse_number(TIME_BETWEEN_RETRIES_ENV_VAR, raw)?),
            None => Duration::from_secs(DEFAULT_TIME_BETWEEN_RETRIES_SECS),
        };

        Ok(HarnessConfig {
            region,
            skip_teardown,
            terraform_binary,
            aws_binary,
            max_retries,
            time_between_retries,
        })
    }
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_number<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
