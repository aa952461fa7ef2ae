//! Per-test input: definition path, variables and environment overrides.

use crate::naming;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Variable that carries the unique test name into the definition.
pub const TEST_NAME_VAR: &str = "test_name";

/// Variable that carries resource tags into the definition.
pub const TAGS_VAR: &str = "tags";

/// One provisioning run. Created at test start, consumed by
/// [`Deployment::provision`](crate::deployment::Deployment::provision).
#[derive(Debug, Clone)]
pub struct TestCase {
    name: String,
    definition: PathBuf,
    vars: BTreeMap<String, Value>,
    env: BTreeMap<String, String>,
}

impl TestCase {
    /// Create a test case with a freshly generated `<prefix>-<id>` name.
    ///
    /// The name is injected as the `test_name` variable.
    pub fn new(prefix: &str, definition: impl Into<PathBuf>) -> Self {
        let name = naming::test_name(prefix);
        let vars = BTreeMap::from([(TEST_NAME_VAR.to_string(), Value::String(name.clone()))]);

        Self {
            name,
            definition: definition.into(),
            vars,
            env: BTreeMap::new(),
        }
    }

    /// Set an input variable. `test_name` cannot be overridden.
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if name != TEST_NAME_VAR {
            self.vars.insert(name, value.into());
        }
        self
    }

    /// Merge entries into the `tags` variable.
    pub fn with_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entry = self
            .vars
            .entry(TAGS_VAR.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }

        if let Value::Object(map) = entry {
            for (k, v) in tags {
                map.insert(k.into(), Value::String(v.into()));
            }
        }
        self
    }

    /// Standard tags identifying resources created by this suite.
    pub fn with_default_tags(self, test: &str) -> Self {
        self.with_tags([
            ("Automation", "Terraform"),
            ("Terratest", "yes"),
            ("Test", test),
        ])
    }

    /// Set an environment variable for every tool invocation.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &Path {
        &self.definition
    }

    pub fn vars(&self) -> &BTreeMap<String, Value> {
        &self.vars
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        PathBuf,
        BTreeMap<String, Value>,
        BTreeMap<String, String>,
    ) {
        (self.name, self.definition, self.vars, self.env)
    }
}
