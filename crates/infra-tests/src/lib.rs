//! Deploy-and-Verify Infrastructure Test Harness
//!
//! This crate provisions real infrastructure with Terraform, probes the
//! resulting resources over the network, and always tears them down again.
//!
//! A test is three steps:
//!
//! 1. Build a [`TestCase`](case::TestCase): a definition directory plus
//!    variables. Each case gets a unique `test_name` so parallel tests never
//!    collide on named cloud resources.
//! 2. [`Deployment::provision`](deployment::Deployment::provision) runs
//!    `init` + `apply` and captures outputs. The returned guard runs
//!    `destroy` when dropped, including on assertion panics.
//! 3. Verify with a probe: [`HttpProbe`](probe::HttpProbe) polls an HTTP
//!    endpoint, [`verify_invocation`](probe::verify_invocation) invokes a
//!    function once.
//!
//! # Features
//!
//! - `live`: suites that provision real AWS resources (requires credentials)
//!
//! # Environment
//!
//! - `AWS_DEFAULT_REGION` (required)
//! - `TT_SKIP_DESTROY=1` leaves infrastructure up for post-mortem inspection
//! - `TT_TERRAFORM_BINARY`, `TT_AWS_BINARY`, `TT_MAX_RETRIES`,
//!   `TT_TIME_BETWEEN_RETRIES_SECS` (optional overrides)
//!
//! Function invocation shells out to AWS CLI v2 (`aws lambda invoke`).
//!
//! # Usage
//!
//! ```bash
//! # Local suites only (fake CLIs, mock HTTP servers)
//! cargo test -p infra-tests
//!
//! # Live suites against AWS
//! AWS_DEFAULT_REGION=us-west-2 cargo test -p infra-tests --features live
//! ```

pub mod case;
pub mod config;
pub mod deployment;
pub mod logging;
pub mod naming;
pub mod probe;
pub mod terraform;
