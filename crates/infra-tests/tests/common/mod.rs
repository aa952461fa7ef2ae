//! Fake CLIs for exercising the harness without touching a cloud account.
//!
//! Each fake is a small `sh` script in its own temp directory. The script
//! appends one line per invocation to `calls.log` and reads its behaviour
//! (outputs, failures, responses) from files the test writes beforehand.
//!
//! Tests that write and exec scripts must run `#[serial]`: a concurrent fork
//! can briefly inherit the write handle and make exec fail with ETXTBSY.

#![allow(dead_code)]

use infra_tests::config::HarnessConfig;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub const TEST_REGION: &str = "us-east-1";

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub args: String,
    pub region: String,
    pub cwd: String,
}

impl Call {
    pub fn command(&self) -> &str {
        self.args.split_whitespace().next().unwrap_or_default()
    }
}

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write fake script");
    let mut perms = fs::metadata(path).expect("stat fake script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod fake script");
}

fn read_calls(log: &Path) -> Vec<Call> {
    let Ok(contents) = fs::read_to_string(log) else {
        return Vec::new();
    };

    contents
        .lines()
        .map(|line| {
            let mut parts = line.rsplitn(3, '|');
            let cwd = parts.next().unwrap_or_default().to_string();
            let region = parts.next().unwrap_or_default().to_string();
            let args = parts.next().unwrap_or_default().to_string();
            Call { args, region, cwd }
        })
        .collect()
}

/// Stand-in for the `terraform` binary.
///
/// - `output` prints `outputs.json` (or `{}`)
/// - `<command>.fail` holds a countdown; while positive the command prints
///   `<command>.error` to stderr and exits 1
pub struct FakeTerraform {
    dir: TempDir,
}

impl FakeTerraform {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create fake terraform dir");
        fs::create_dir(dir.path().join("definition")).expect("create definition dir");

        let state = dir.path().display().to_string();
        let script = format!(
            r#"#!/bin/sh
STATE='{state}'
cmd="$1"
printf '%s|%s|%s\n' "$*" "$AWS_DEFAULT_REGION" "$(pwd)" >> "$STATE/calls.log"
if [ -f "$STATE/$cmd.fail" ]; then
  remaining=$(cat "$STATE/$cmd.fail")
  if [ "$remaining" -gt 0 ]; then
    echo $((remaining - 1)) > "$STATE/$cmd.fail"
    cat "$STATE/$cmd.error" >&2
    exit 1
  fi
fi
case "$cmd" in
  output)
    if [ -f "$STATE/outputs.json" ]; then cat "$STATE/outputs.json"; else echo '{{}}'; fi
    ;;
  *)
    echo "$cmd complete"
    ;;
esac
exit 0
"#
        );
        write_script(&dir.path().join("terraform"), &script);

        Self { dir }
    }

    pub fn binary(&self) -> PathBuf {
        self.dir.path().join("terraform")
    }

    pub fn definition_dir(&self) -> PathBuf {
        self.dir.path().join("definition")
    }

    /// Declare outputs as `name -> value`, wrapped the way `output -json` does.
    pub fn set_outputs(&self, outputs: &[(&str, serde_json::Value)]) {
        let document: serde_json::Map<String, serde_json::Value> = outputs
            .iter()
            .map(|(name, value)| {
                (
                    (*name).to_string(),
                    serde_json::json!({"sensitive": false, "type": "string", "value": value}),
                )
            })
            .collect();
        fs::write(
            self.dir.path().join("outputs.json"),
            serde_json::Value::Object(document).to_string(),
        )
        .expect("write outputs");
    }

    /// Make `command` fail the next `times` invocations with `message`.
    pub fn fail(&self, command: &str, times: u32, message: &str) {
        fs::write(self.dir.path().join(format!("{command}.error")), message)
            .expect("write error message");
        fs::write(self.dir.path().join(format!("{command}.fail")), times.to_string())
            .expect("write fail count");
    }

    pub fn calls(&self) -> Vec<Call> {
        read_calls(&self.dir.path().join("calls.log"))
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls().iter().filter(|c| c.command() == command).count()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.command().to_string()).collect()
    }

    /// Harness config pointing at this fake, with instant retries.
    pub fn config(&self) -> HarnessConfig {
        HarnessConfig {
            region: TEST_REGION.to_string(),
            skip_teardown: false,
            terraform_binary: self.binary(),
            aws_binary: PathBuf::from("aws"),
            max_retries: 3,
            time_between_retries: Duration::ZERO,
        }
    }
}

/// Stand-in for the `aws` CLI's `lambda invoke`.
///
/// Writes `response` to the outfile (last argument) and prints `metadata.json`.
/// If `stderr` exists it is printed and the CLI exits 255 instead.
pub struct FakeAwsCli {
    dir: TempDir,
}

impl FakeAwsCli {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create fake aws dir");

        let state = dir.path().display().to_string();
        let script = format!(
            r#"#!/bin/sh
STATE='{state}'
printf '%s|%s|%s\n' "$*" "$AWS_DEFAULT_REGION" "$(pwd)" >> "$STATE/calls.log"
for last; do :; done
if [ -f "$STATE/stderr" ]; then
  cat "$STATE/stderr" >&2
  exit 255
fi
cat "$STATE/response" > "$last"
cat "$STATE/metadata.json"
exit 0
"#
        );
        write_script(&dir.path().join("aws"), &script);

        let cli = Self { dir };
        cli.respond_with("null", None);
        cli
    }

    pub fn binary(&self) -> PathBuf {
        self.dir.path().join("aws")
    }

    /// Set the payload and optional `FunctionError` for the next invocation.
    pub fn respond_with(&self, payload: &str, function_error: Option<&str>) {
        fs::write(self.dir.path().join("response"), payload).expect("write response");

        let mut metadata = serde_json::json!({"StatusCode": 200, "ExecutedVersion": "$LATEST"});
        if let Some(error) = function_error {
            metadata["FunctionError"] = serde_json::Value::String(error.to_string());
        }
        fs::write(self.dir.path().join("metadata.json"), metadata.to_string())
            .expect("write metadata");
    }

    /// Make the CLI exit non-zero with `message` on stderr.
    pub fn fail_with(&self, message: &str) {
        fs::write(self.dir.path().join("stderr"), message).expect("write stderr");
    }

    pub fn calls(&self) -> Vec<Call> {
        read_calls(&self.dir.path().join("calls.log"))
    }
}
