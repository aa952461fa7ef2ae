//! Thin driver around the Terraform CLI.
//!
//! Every command is a blocking subprocess run in the definition directory with
//! `-input=false -no-color`. Failed commands are retried when their output is
//! classified as transient by the configured [`RetryPolicy`].

pub mod outputs;
pub mod retry;

pub use outputs::{OutputError, OutputSet};
pub use retry::{RetryClassifier, RetryPolicy, RetryableErrors};

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Maximum bytes of command output kept in error messages.
const MAX_ERROR_OUTPUT_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum TerraformError {
    #[error("Failed to run {binary}: {source}. Is it installed and on PATH?")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {exit_code:?} after {attempts} attempt(s):\n{output}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        attempts: u32,
        output: String,
    },

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// Everything needed to run Terraform against one definition.
#[derive(Debug, Clone)]
pub struct TerraformOptions {
    /// Directory containing the `.tf` files.
    pub dir: PathBuf,
    /// Input variables, passed as `-var` arguments.
    pub vars: BTreeMap<String, Value>,
    /// Environment overrides for every command.
    pub env: BTreeMap<String, String>,
    /// Terraform (or OpenTofu) executable.
    pub binary: PathBuf,
    pub retry: RetryPolicy,
}

impl TerraformOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            vars: BTreeMap::new(),
            env: BTreeMap::new(),
            binary: PathBuf::from(crate::config::DEFAULT_TERRAFORM_BINARY),
            retry: RetryPolicy::default(),
        }
    }

    /// Render `vars` as `-var` arguments.
    ///
    /// Strings are passed raw; everything else is JSON-encoded, which
    /// Terraform parses as an HCL expression (lists, maps, numbers, bools).
    pub fn var_args(&self) -> Vec<String> {
        self.vars
            .iter()
            .flat_map(|(name, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                ["-var".to_string(), format!("{}={}", name, rendered)]
            })
            .collect()
    }
}

/// Captured result of one successful command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Terraform CLI driver.
#[derive(Debug, Clone)]
pub struct Terraform {
    options: TerraformOptions,
}

impl Terraform {
    pub fn new(options: TerraformOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TerraformOptions {
        &self.options
    }

    /// `terraform init`
    pub fn init(&self) -> Result<CommandOutput, TerraformError> {
        self.run_with_retry(&["init", "-upgrade=false", "-input=false", "-no-color"], false)
    }

    /// `terraform apply`
    pub fn apply(&self) -> Result<CommandOutput, TerraformError> {
        self.run_with_retry(
            &["apply", "-input=false", "-auto-approve", "-lock=true", "-no-color"],
            true,
        )
    }

    /// `terraform init` followed by `terraform apply`.
    pub fn init_and_apply(&self) -> Result<CommandOutput, TerraformError> {
        self.init()?;
        self.apply()
    }

    /// `terraform destroy`
    pub fn destroy(&self) -> Result<CommandOutput, TerraformError> {
        self.run_with_retry(
            &["destroy", "-input=false", "-auto-approve", "-lock=true", "-no-color"],
            true,
        )
    }

    /// `terraform output -json`, parsed.
    pub fn outputs(&self) -> Result<OutputSet, TerraformError> {
        let output = self.run_with_retry(&["output", "-no-color", "-json"], false)?;
        Ok(OutputSet::from_json(&output.stdout)?)
    }

    fn run_with_retry(
        &self,
        args: &[&str],
        with_vars: bool,
    ) -> Result<CommandOutput, TerraformError> {
        let mut full_args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        if with_vars {
            full_args.extend(self.options.var_args());
        }

        let command = format!("{} {}", self.options.binary.display(), args.join(" "));
        let policy = &self.options.retry;
        let mut attempts = 0;

        loop {
            attempts += 1;

            let output = self.run_once(&full_args)?;
            if output.status.success() {
                if attempts > 1 {
                    info!(
                        target: "infra_tests.terraform",
                        command = %command,
                        attempts,
                        "Command succeeded after retry"
                    );
                }
                return Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }

            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );

            let reason = policy.classify(&combined);
            match reason {
                Some(reason) if attempts <= policy.max_retries => {
                    warn!(
                        target: "infra_tests.terraform",
                        command = %command,
                        attempt = attempts,
                        max_retries = policy.max_retries,
                        reason = %reason,
                        "Retryable failure, will retry"
                    );
                    std::thread::sleep(policy.time_between_retries);
                }
                _ => {
                    return Err(TerraformError::CommandFailed {
                        command,
                        exit_code: output.status.code(),
                        attempts,
                        output: truncate_output(&combined),
                    });
                }
            }
        }
    }

    fn run_once(&self, args: &[String]) -> Result<std::process::Output, TerraformError> {
        debug!(
            target: "infra_tests.terraform",
            dir = %self.options.dir.display(),
            args = ?args,
            "Running terraform"
        );

        Command::new(&self.options.binary)
            .args(args)
            .current_dir(&self.options.dir)
            .env("TF_IN_AUTOMATION", "1")
            .envs(&self.options.env)
            .output()
            .map_err(|source| TerraformError::Spawn {
                binary: self.options.binary.display().to_string(),
                source,
            })
    }
}

/// Keep the tail of long output; Terraform prints the error last.
fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_ERROR_OUTPUT_LEN {
        return output.to_string();
    }

    let mut start = output.len() - MAX_ERROR_OUTPUT_LEN;
    while !output.is_char_boundary(start) {
        start += 1;
    }
    format!("[truncated]...{}", output.get(start..).unwrap_or_default())
}
