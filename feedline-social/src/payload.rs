use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw provider-shaped document as fetched, before any normalization.
///
/// Nothing is assumed about its contents; [`crate::twitter::parse`] decides
/// what it can extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Value);

impl Payload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Number of entries under `data`, for logging; `0` when absent.
    pub fn entry_count(&self) -> usize {
        match self.0.get("data") {
            Some(Value::Array(items)) => items.len(),
            Some(Value::Object(_)) => 1,
            _ => match &self.0 {
                Value::Array(items) => items.len(),
                _ => 0,
            },
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
