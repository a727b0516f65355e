use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attrs::attr_f64;

/// Freight container record.
///
/// Terminals treat this as an opaque collaborator: they read and write the
/// custom-variables map (accumulated `cost` and `time`, risk pricing via
/// `dollar_value`), stamp the current location, and index by the next
/// destination. Any fields beyond that contract pass through serialization
/// untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "containerID")]
    pub container_id: String,

    #[serde(
        rename = "containerCurrentLocation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub current_location: Option<String>,

    #[serde(
        rename = "containerNextDestination",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_destination: Option<String>,

    #[serde(rename = "customVariables", default)]
    pub custom_variables: IndexMap<String, Value>,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Container {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            current_location: None,
            next_destination: None,
            custom_variables: IndexMap::new(),
            extra: IndexMap::new(),
        }
    }

    pub fn custom_variable(&self, key: &str) -> Option<&Value> {
        self.custom_variables.get(key)
    }

    /// Numeric read of a custom variable; numeric strings are accepted.
    pub fn custom_variable_f64(&self, key: &str) -> Option<f64> {
        self.custom_variables.get(key).and_then(attr_f64)
    }

    pub fn set_custom_variable(&mut self, key: impl Into<String>, value: Value) {
        self.custom_variables.insert(key.into(), value);
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roundtrips_with_unknown_fields() {
        let raw = json!({
            "containerID": "C-001",
            "containerNextDestination": "Rotterdam",
            "customVariables": {"dollar_value": "25000"},
            "teu": 2
        });
        let container: Container = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(container.container_id, "C-001");
        assert_eq!(container.next_destination.as_deref(), Some("Rotterdam"));
        assert_eq!(container.custom_variable_f64("dollar_value"), Some(25000.0));
        assert_eq!(container.extra["teu"], json!(2));

        let back = container.to_json();
        assert_eq!(back["containerID"], raw["containerID"]);
        assert_eq!(back["teu"], raw["teu"]);
    }

    #[test]
    fn custom_variables_accumulate() {
        let mut container = Container::new("C-002");
        assert!(container.custom_variable("cost").is_none());
        container.set_custom_variable("cost", json!(125.0));
        assert_eq!(container.custom_variable_f64("cost"), Some(125.0));
    }
}
