//! Scoped ownership of provisioned infrastructure.
//!
//! [`Deployment`] is returned by a successful apply and destroys the
//! infrastructure when dropped, including when the test panics on a failed
//! assertion. Call [`Deployment::teardown`] to observe destroy failures
//! instead of only logging them.
//!
//! ```no_run
//! use infra_tests::case::TestCase;
//! use infra_tests::config::HarnessConfig;
//! use infra_tests::deployment::Deployment;
//!
//! let config = HarnessConfig::from_env().expect("AWS_DEFAULT_REGION must be set");
//! let case = TestCase::new("tt-lf-simple", "definitions/simple")
//!     .with_default_tags("simple_web_server");
//!
//! let deployment = Deployment::provision(&config, case).expect("apply should succeed");
//! let public_ip = deployment.output("public_ip").expect("public_ip is declared");
//! // ... probe public_ip; destroy runs when `deployment` goes out of scope
//! ```

use crate::case::TestCase;
use crate::config::{ConfigError, HarnessConfig, REGION_ENV_VAR};
use crate::terraform::{
    OutputError, OutputSet, RetryClassifier, RetryPolicy, RetryableErrors, Terraform,
    TerraformError, TerraformOptions,
};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Apply failed for {test_name}: {source}")]
    Apply {
        test_name: String,
        #[source]
        source: TerraformError,
    },

    #[error("Output error for {test_name}: {source}")]
    Output {
        test_name: String,
        #[source]
        source: OutputError,
    },

    #[error("Teardown failed for {test_name}, resources may have leaked: {source}")]
    Teardown {
        test_name: String,
        #[source]
        source: TerraformError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeardownState {
    Pending,
    Skipped,
    Done,
}

/// Applied infrastructure plus its outputs.
#[derive(Debug)]
pub struct Deployment {
    test_name: String,
    terraform: Terraform,
    outputs: OutputSet,
    teardown: TeardownState,
}

impl Deployment {
    /// Load configuration from the process environment, then provision.
    pub fn provision_from_env(case: TestCase) -> Result<Self, ProvisionError> {
        Self::provision_with_env(&std::env::vars().collect(), case)
    }

    /// Load configuration from `vars`, then provision.
    ///
    /// Configuration errors are returned before the tool is ever invoked.
    pub fn provision_with_env(
        vars: &HashMap<String, String>,
        case: TestCase,
    ) -> Result<Self, ProvisionError> {
        let config = HarnessConfig::from_vars(vars)?;
        Self::provision(&config, case)
    }

    /// Run init and apply, then capture outputs.
    ///
    /// If init or apply fails, destroy is attempted for whatever partial state
    /// exists (unless teardown is skipped) and the apply error is returned.
    /// Transient failures are classified with
    /// [`RetryableErrors::terraform_defaults`].
    pub fn provision(config: &HarnessConfig, case: TestCase) -> Result<Self, ProvisionError> {
        Self::provision_with_retry(config, case, RetryableErrors::terraform_defaults())
    }

    /// Like [`provision`](Self::provision), with a caller-supplied retry
    /// classifier. Retry count and delay still come from `config`.
    pub fn provision_with_retry(
        config: &HarnessConfig,
        case: TestCase,
        classifier: impl RetryClassifier + 'static,
    ) -> Result<Self, ProvisionError> {
        let (test_name, dir, vars, mut env) = case.into_parts();
        env.insert(REGION_ENV_VAR.to_string(), config.region.clone());

        let options = TerraformOptions {
            dir,
            vars,
            env,
            binary: config.terraform_binary.clone(),
            retry: RetryPolicy::new(config.max_retries, config.time_between_retries, classifier),
        };

        Self::provision_with_options(test_name, options, config.skip_teardown)
    }

    /// Provision with fully custom Terraform options.
    ///
    /// `options.env` must carry a non-empty `AWS_DEFAULT_REGION`; otherwise a
    /// configuration error is returned before Terraform is invoked.
    pub fn provision_with_options(
        test_name: String,
        options: TerraformOptions,
        skip_teardown: bool,
    ) -> Result<Self, ProvisionError> {
        let has_region = options
            .env
            .get(REGION_ENV_VAR)
            .is_some_and(|region| !region.trim().is_empty());
        if !has_region {
            return Err(ConfigError::MissingEnvVar(REGION_ENV_VAR.to_string()).into());
        }

        info!(
            target: "infra_tests.deployment",
            test_name = %test_name,
            dir = %options.dir.display(),
            "Provisioning"
        );

        // Built before apply so an apply failure still tears down through Drop.
        let mut deployment = Deployment {
            test_name,
            terraform: Terraform::new(options),
            outputs: OutputSet::default(),
            teardown: if skip_teardown {
                TeardownState::Skipped
            } else {
                TeardownState::Pending
            },
        };

        if skip_teardown {
            warn!(
                target: "infra_tests.deployment",
                test_name = %deployment.test_name,
                "Teardown skipped, resources must be destroyed manually"
            );
        }

        if let Err(source) = deployment.terraform.init_and_apply() {
            return Err(ProvisionError::Apply {
                test_name: deployment.test_name.clone(),
                source,
            });
        }

        deployment.outputs = match deployment.terraform.outputs() {
            Ok(outputs) => outputs,
            Err(TerraformError::Output(source)) => {
                return Err(ProvisionError::Output {
                    test_name: deployment.test_name.clone(),
                    source,
                })
            }
            Err(source) => {
                return Err(ProvisionError::Apply {
                    test_name: deployment.test_name.clone(),
                    source,
                })
            }
        };

        info!(
            target: "infra_tests.deployment",
            test_name = %deployment.test_name,
            outputs = deployment.outputs.len(),
            "Provisioned"
        );

        Ok(deployment)
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn outputs(&self) -> &OutputSet {
        &self.outputs
    }

    /// A declared output as a string. Undeclared outputs are an error.
    pub fn output(&self, name: &str) -> Result<String, ProvisionError> {
        self.outputs.get(name).map_err(|source| ProvisionError::Output {
            test_name: self.test_name.clone(),
            source,
        })
    }

    /// Destroy now and report the result.
    ///
    /// A no-op when teardown is skipped. Destroy is never attempted twice.
    pub fn teardown(mut self) -> Result<(), ProvisionError> {
        self.destroy_once()
    }

    fn destroy_once(&mut self) -> Result<(), ProvisionError> {
        if self.teardown != TeardownState::Pending {
            return Ok(());
        }
        self.teardown = TeardownState::Done;

        info!(
            target: "infra_tests.deployment",
            test_name = %self.test_name,
            "Destroying"
        );

        self.terraform
            .destroy()
            .map(|_| ())
            .map_err(|source| ProvisionError::Teardown {
                test_name: self.test_name.clone(),
                source,
            })
    }
}

impl Drop for Deployment {
    fn drop(&mut self) {
        if let Err(e) = self.destroy_once() {
            error!(
                target: "infra_tests.deployment",
                test_name = %self.test_name,
                error = %e,
                "Teardown failed"
            );
        }
    }
}
