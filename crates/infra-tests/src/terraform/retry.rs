//! Retry policy for transient provisioning failures.
//!
//! Terraform fails for reasons that have nothing to do with the definition
//! under test: registry downloads time out, AWS returns a TLS error, a fresh
//! IAM role is not yet assumable by Lambda. The policy decides which failures
//! are worth another attempt by classifying the combined command output.

use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether a failed command's output describes a transient error.
///
/// Returns a human readable reason when the failure should be retried.
pub trait RetryClassifier: Send + Sync {
    fn classify(&self, output: &str) -> Option<String>;
}

impl<F> RetryClassifier for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn classify(&self, output: &str) -> Option<String> {
        self(output)
    }
}

/// Regex table mapping output patterns to retry reasons.
#[derive(Debug, Clone, Default)]
pub struct RetryableErrors {
    patterns: Vec<(Regex, String)>,
}

/// Known-transient Terraform and AWS failures.
const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    (
        r"(?s).*Error installing provider.*",
        "Failed to download provider from the registry",
    ),
    (
        r"(?s).*Failed to query available provider packages.*",
        "Failed to query the provider registry",
    ),
    (
        r"(?s).*could not query provider registry for.*",
        "Failed to query the provider registry",
    ),
    (
        r"(?s).*timeout while waiting for plugin to start.*",
        "Provider plugin failed to start in time",
    ),
    (
        r"(?s).*timed out waiting for server handshake.*",
        "Provider plugin failed to start in time",
    ),
    (
        r"(?s).*connection reset by peer.*",
        "Connection reset while talking to a remote endpoint",
    ),
    (
        r"(?s).*TLS handshake timeout.*",
        "TLS handshake timed out",
    ),
    (
        r"(?s).*Client\.Timeout exceeded while awaiting headers.*",
        "HTTP client timed out",
    ),
    (
        r"(?s).*RequestError: send request failed.*",
        "Failed to send request to AWS",
    ),
    (
        r"(?s).*cannot be assumed by Lambda.*",
        "IAM role not yet propagated to Lambda",
    ),
    (
        r"(?s).*Provider produced inconsistent result after apply.*",
        "Eventual consistency in the provider",
    ),
];

impl RetryableErrors {
    /// An empty table; nothing is retried.
    pub fn none() -> Self {
        Self::default()
    }

    /// The built-in table of transient Terraform/AWS failures.
    pub fn terraform_defaults() -> Self {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .filter_map(|(pattern, reason)| {
                Regex::new(pattern)
                    .ok()
                    .map(|re| (re, (*reason).to_string()))
            })
            .collect();
        Self { patterns }
    }

    /// Add a pattern. Fails if the pattern is not a valid regex.
    pub fn with_pattern(
        mut self,
        pattern: &str,
        reason: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        self.patterns.push((Regex::new(pattern)?, reason.into()));
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl RetryClassifier for RetryableErrors {
    fn classify(&self, output: &str) -> Option<String> {
        self.patterns
            .iter()
            .find(|(re, _)| re.is_match(output))
            .map(|(_, reason)| reason.clone())
    }
}

/// How many times, how often, and on what to retry a failed command.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub time_between_retries: Duration,
    classifier: Arc<dyn RetryClassifier>,
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        time_between_retries: Duration,
        classifier: impl RetryClassifier + 'static,
    ) -> Self {
        Self {
            max_retries,
            time_between_retries,
            classifier: Arc::new(classifier),
        }
    }

    /// Never retry.
    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO, RetryableErrors::none())
    }

    /// Returns the retry reason if `output` is classified as transient.
    pub fn classify(&self, output: &str) -> Option<String> {
        self.classifier.classify(output)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            Duration::from_secs(5),
            RetryableErrors::terraform_defaults(),
        )
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("time_between_retries", &self.time_between_retries)
            .finish_non_exhaustive()
    }
}
