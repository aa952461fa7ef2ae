//! Function invocation probe.
//!
//! Functions are invoked once, synchronously; the raw response payload is
//! compared against an expected literal. Invocation is assumed idempotent and
//! immediately consistent, so there is no retry loop.

use super::{truncate_body, VerificationError};
use crate::config::{HarnessConfig, DEFAULT_AWS_BINARY};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// Invokes a deployed function and returns its raw response payload.
pub trait FunctionInvoker {
    fn invoke(
        &self,
        function: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<String, VerificationError>> + Send;
}

/// Invoke `function` once and require the payload to equal `expected`.
pub async fn verify_invocation<I>(
    invoker: &I,
    function: &str,
    payload: &Value,
    expected: &str,
) -> Result<(), VerificationError>
where
    I: FunctionInvoker,
{
    info!(
        target: "infra_tests.probe",
        function = %function,
        "Invoking function"
    );

    let actual = invoker.invoke(function, payload).await?;

    if actual != expected {
        return Err(VerificationError::PayloadMismatch {
            function: function.to_string(),
            expected: expected.to_string(),
            actual: truncate_body(&actual),
        });
    }

    info!(
        target: "infra_tests.probe",
        function = %function,
        "Function response verified"
    );

    Ok(())
}

/// Metadata printed by `aws lambda invoke` on stdout.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InvokeMetadata {
    status_code: u16,
    #[serde(default)]
    function_error: Option<String>,
}

/// Invokes Lambda functions through the AWS CLI.
///
/// Requires AWS CLI v2: v1 rejects `--cli-binary-format raw-in-base64-out`.
#[derive(Debug, Clone)]
pub struct AwsCliInvoker {
    binary: PathBuf,
    region: String,
}

impl AwsCliInvoker {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_AWS_BINARY),
            region: region.into(),
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            binary: config.aws_binary.clone(),
            region: config.region.clone(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn invoke_cli(&self, function: &str, payload: &Value) -> Result<String, VerificationError> {
        let fail = |message: String| VerificationError::Invocation {
            function: function.to_string(),
            message,
        };

        let response_file = tempfile::Builder::new()
            .prefix("invoke-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| fail(format!("failed to create response file: {}", e)))?;

        let payload_json = payload.to_string();

        debug!(
            target: "infra_tests.probe",
            function = %function,
            region = %self.region,
            binary = %self.binary.display(),
            "Running aws lambda invoke"
        );

        let output = Command::new(&self.binary)
            .args([
                "lambda",
                "invoke",
                "--function-name",
                function,
                "--payload",
                payload_json.as_str(),
                "--cli-binary-format",
                "raw-in-base64-out",
                "--region",
                self.region.as_str(),
                "--output",
                "json",
            ])
            .arg(response_file.path())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| fail(format!("failed to run {}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            return Err(fail(format!(
                "{} exited with {:?}: {}",
                self.binary.display(),
                output.status.code(),
                truncate_body(String::from_utf8_lossy(&output.stderr).trim())
            )));
        }

        let metadata: InvokeMetadata = serde_json::from_slice(&output.stdout)
            .map_err(|e| fail(format!("unreadable invoke metadata: {}", e)))?;

        let response = tokio::fs::read_to_string(response_file.path())
            .await
            .map_err(|e| fail(format!("failed to read response payload: {}", e)))?;

        if let Some(function_error) = metadata.function_error {
            return Err(fail(format!(
                "function error ({}): {}",
                function_error,
                truncate_body(&response)
            )));
        }

        if !(200..300).contains(&metadata.status_code) {
            return Err(fail(format!(
                "unexpected status code {}",
                metadata.status_code
            )));
        }

        Ok(response)
    }
}

impl FunctionInvoker for AwsCliInvoker {
    fn invoke(
        &self,
        function: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<String, VerificationError>> + Send {
        self.invoke_cli(function, payload)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Returns a canned payload and counts calls.
    struct CannedInvoker {
        payload: &'static str,
        calls: AtomicU32,
    }

    impl FunctionInvoker for CannedInvoker {
        fn invoke(
            &self,
            _function: &str,
            _payload: &Value,
        ) -> impl Future<Output = Result<String, VerificationError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let payload = self.payload.to_string();
            async move { Ok(payload) }
        }
    }

    #[tokio::test]
    async fn test_verify_invocation_exact_match() {
        let invoker = CannedInvoker {
            payload: "\"hello world\"",
            calls: AtomicU32::new(0),
        };

        verify_invocation(&invoker, "tt-lf-cw-trigger-abc", &json!({}), "\"hello world\"")
            .await
            .expect("payload should match");

        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_verify_invocation_is_not_retried() {
        let invoker = CannedInvoker {
            payload: "hello world",
            calls: AtomicU32::new(0),
        };

        let err = verify_invocation(&invoker, "fn", &json!({}), "\"hello world\"")
            .await
            .expect_err("unquoted payload must not match");

        match err {
            VerificationError::PayloadMismatch {
                function,
                expected,
                actual,
            } => {
                assert_eq!(function, "fn");
                assert_eq!(expected, "\"hello world\"");
                assert_eq!(actual, "hello world");
            }
            other => panic!("expected PayloadMismatch, got {:?}", other),
        }
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invoke_metadata_parsing() {
        let metadata: InvokeMetadata = serde_json::from_str(
            r#"{"StatusCode": 200, "FunctionError": "Unhandled", "ExecutedVersion": "$LATEST"}"#,
        )
        .unwrap();
        assert_eq!(metadata.status_code, 200);
        assert_eq!(metadata.function_error.as_deref(), Some("Unhandled"));

        let metadata: InvokeMetadata =
            serde_json::from_str(r#"{"StatusCode": 200, "ExecutedVersion": "$LATEST"}"#).unwrap();
        assert!(metadata.function_error.is_none());
    }

    #[test]
    fn test_from_config() {
        let config = HarnessConfig::from_vars(&std::collections::HashMap::from([
            ("AWS_DEFAULT_REGION".to_string(), "ap-southeast-2".to_string()),
            ("TT_AWS_BINARY".to_string(), "/usr/local/bin/aws".to_string()),
        ]))
        .unwrap();

        let invoker = AwsCliInvoker::from_config(&config);
        assert_eq!(invoker.region(), "ap-southeast-2");
        assert_eq!(invoker.binary, PathBuf::from("/usr/local/bin/aws"));
    }

    #[tokio::test]
    async fn test_missing_cli_is_invocation_error() {
        let invoker = AwsCliInvoker::new("us-east-1").with_binary("/nonexistent/aws");

        let err = invoker.invoke("fn", &json!({})).await.unwrap_err();
        assert!(matches!(err, VerificationError::Invocation { .. }));
    }
}
