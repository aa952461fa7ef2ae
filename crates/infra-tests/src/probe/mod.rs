//! Verification probes run against provisioned infrastructure.
//!
//! Probes only read: they issue remote calls and compare the responses,
//! never mutating the deployed resources.

pub mod http;
pub mod invoke;
pub mod poll;

pub use http::{HttpProbe, HttpResponse};
pub use invoke::{verify_invocation, AwsCliInvoker, FunctionInvoker};
pub use poll::{poll, PollExhausted, PollSchedule};

use thiserror::Error;

/// Maximum length for response bodies in error messages.
const MAX_BODY_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("{target} did not return the expected response after {attempts} attempt(s); last: {last}")]
    Timeout {
        target: String,
        attempts: u32,
        last: String,
    },

    #[error("Function {function} returned {actual:?}, expected {expected:?}")]
    PayloadMismatch {
        function: String,
        expected: String,
        actual: String,
    },

    #[error("Invoking function {function} failed: {message}")]
    Invocation { function: String, message: String },
}

/// Truncate a response body for inclusion in an error message.
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_BODY_LEN {
        return body.to_string();
    }

    let mut end = MAX_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", body.get(..end).unwrap_or_default())
}
