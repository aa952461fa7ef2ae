//! Live AWS suites.
//!
//! Provision the definitions under `definitions/`, verify them, tear down.
//! Each test creates billable resources; run with:
//!
//! ```bash
//! AWS_DEFAULT_REGION=us-west-2 cargo test -p infra-tests --features live
//! ```

#![cfg(feature = "live")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use infra_tests::case::TestCase;
use infra_tests::config::HarnessConfig;
use infra_tests::deployment::Deployment;
use infra_tests::logging::init_test_logging;
use infra_tests::probe::{verify_invocation, AwsCliInvoker, HttpProbe, PollSchedule};
use serde_json::json;
use std::path::PathBuf;

const WEB_SERVER_PORT: u16 = 8080;

fn definition(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../definitions")
        .join(name)
}

fn config() -> HarnessConfig {
    HarnessConfig::from_env().expect("live suites need AWS_DEFAULT_REGION")
}

#[tokio::test]
async fn test_simple_web_server() {
    init_test_logging();
    let config = config();

    let case = TestCase::new("tt-lf-simple", definition("simple")).with_default_tags("simple");

    // Apply blocks on `terraform`; keep it off the async worker threads.
    let deployment = tokio::task::spawn_blocking(move || Deployment::provision(&config, case))
        .await
        .expect("provision task panicked")
        .expect("simple definition should apply");

    let public_ip = deployment.output("public_ip").expect("public_ip output");
    let url = format!("http://{}:{}", public_ip, WEB_SERVER_PORT);

    HttpProbe::new()
        .expect("build HTTP client")
        .get_with_retry(&url, &[], 200, "hello world", PollSchedule::instance_boot())
        .await
        .expect("instance should serve \"hello world\"");

    tokio::task::spawn_blocking(move || deployment.teardown())
        .await
        .expect("teardown task panicked")
        .expect("simple definition should destroy");
}

#[tokio::test]
async fn test_cloudwatch_trigger_function() {
    init_test_logging();
    let config = config();
    let invoker = AwsCliInvoker::from_config(&config);

    let case = TestCase::new("tt-lf-cw-trigger", definition("cloudwatch-trigger"))
        .with_default_tags("cloudwatch-trigger");

    let deployment = tokio::task::spawn_blocking(move || Deployment::provision(&config, case))
        .await
        .expect("provision task panicked")
        .expect("cloudwatch-trigger definition should apply");

    let function = deployment
        .output("lambda_function_name")
        .expect("lambda_function_name output");

    verify_invocation(&invoker, &function, &json!({}), "\"hello world\"")
        .await
        .expect("function should return \"hello world\"");

    tokio::task::spawn_blocking(move || deployment.teardown())
        .await
        .expect("teardown task panicked")
        .expect("cloudwatch-trigger definition should destroy");
}
