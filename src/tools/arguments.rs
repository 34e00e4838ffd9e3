//! Typed access to tool call arguments.

use crate::error::ConduitError;

/// Wrapper around decoded tool call arguments.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Decode the JSON-string arguments sent by the completions API.
    ///
    /// An empty string decodes to an empty object; anything else must be
    /// valid JSON.
    pub fn parse(raw: &str) -> Result<Self, ConduitError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::new(serde_json::json!({})));
        }
        serde_json::from_str(trimmed)
            .map(Self::new)
            .map_err(|e| ConduitError::InvalidArgument(format!("malformed tool arguments: {e}")))
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn into_value(self) -> serde_json::Value {
        self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, ConduitError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ConduitError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, ConduitError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ConduitError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get a float argument. Integers are accepted too.
    pub fn get_f64(&self, key: &str) -> Result<f64, ConduitError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ConduitError::InvalidArgument(format!("Missing number argument: {key}")))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ConduitError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ConduitError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ConduitError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            ConduitError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
