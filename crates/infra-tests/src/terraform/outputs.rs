//! Declared outputs of an applied definition.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Output '{name}' is not declared (declared outputs: {declared:?})")]
    Undeclared { name: String, declared: Vec<String> },

    #[error("Output '{name}' is not a {expected}: {message}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        message: String,
    },

    #[error("Failed to parse `output -json`: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One entry of `terraform output -json`.
#[derive(Debug, Deserialize)]
struct RawOutput {
    value: Value,
    #[serde(default)]
    sensitive: bool,
}

/// Output name to value, captured once after apply.
///
/// Read-only: the set is never refreshed, so every probe in a test sees the
/// same values.
#[derive(Debug, Clone, Default)]
pub struct OutputSet {
    values: BTreeMap<String, Value>,
    sensitive: Vec<String>,
}

impl OutputSet {
    /// Parse the document printed by `terraform output -json`.
    pub fn from_json(json: &str) -> Result<Self, OutputError> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let raw: BTreeMap<String, RawOutput> = serde_json::from_str(trimmed)?;

        let sensitive = raw
            .iter()
            .filter(|(_, o)| o.sensitive)
            .map(|(name, _)| name.clone())
            .collect();
        let values = raw.into_iter().map(|(name, o)| (name, o.value)).collect();

        Ok(Self { values, sensitive })
    }

    /// Output as a string. Non-string values are rendered as JSON.
    pub fn get(&self, name: &str) -> Result<String, OutputError> {
        Ok(match self.raw(name)? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Output as a list of strings.
    pub fn get_list(&self, name: &str) -> Result<Vec<String>, OutputError> {
        match self.raw(name)? {
            Value::Array(items) => Ok(items.iter().map(render).collect()),
            other => Err(self.mismatch(name, "list", format!("got {}", other))),
        }
    }

    /// Output as a map of strings.
    pub fn get_map(&self, name: &str) -> Result<BTreeMap<String, String>, OutputError> {
        match self.raw(name)? {
            Value::Object(entries) => Ok(entries
                .iter()
                .map(|(k, v)| (k.clone(), render(v)))
                .collect()),
            other => Err(self.mismatch(name, "map", format!("got {}", other))),
        }
    }

    /// Deserialize an output into any serde type.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, OutputError> {
        serde_json::from_value(self.raw(name)?.clone())
            .map_err(|e| self.mismatch(name, std::any::type_name::<T>(), e.to_string()))
    }

    /// Whether the output was declared `sensitive = true`. Values of
    /// sensitive outputs never appear in error messages.
    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive.iter().any(|s| s == name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn mismatch(&self, name: &str, expected: &'static str, detail: String) -> OutputError {
        let message = if self.is_sensitive(name) {
            "value is sensitive".to_string()
        } else {
            detail
        };
        OutputError::TypeMismatch {
            name: name.to_string(),
            expected,
            message,
        }
    }

    fn raw(&self, name: &str) -> Result<&Value, OutputError> {
        self.values.get(name).ok_or_else(|| OutputError::Undeclared {
            name: name.to_string(),
            declared: self.values.keys().cloned().collect(),
        })
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
