//! Command-parameter extraction and normalization.
//!
//! Enum-valued fields accept either integers or strings; container payloads
//! accept either a JSON string or a structured object.

use serde_json::{Map, Value};

use termsim_core::{attr_f64, AttrMap, Container, SimError, SimResult, TransportationMode};

pub type Params = Map<String, Value>;

pub fn require_str<'a>(params: &'a Params, key: &str) -> SimResult<&'a str> {
    match params.get(key).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(SimError::InvalidArgs(format!("{key} must be provided"))),
    }
}

pub fn opt_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

pub fn require_f64(params: &Params, key: &str) -> SimResult<f64> {
    params
        .get(key)
        .and_then(attr_f64)
        .ok_or_else(|| SimError::InvalidArgs(format!("{key} must be provided")))
}

/// `mode` parameter: integer or string form, defaulting when absent.
pub fn mode_param(
    params: &Params,
    key: &str,
    default: TransportationMode,
) -> SimResult<TransportationMode> {
    match params.get(key) {
        Some(value) => TransportationMode::from_value(value),
        None => Ok(default),
    }
}

/// `adding_time`: absent or negative means unspecified.
pub fn adding_time_param(params: &Params) -> Option<f64> {
    params
        .get("adding_time")
        .and_then(attr_f64)
        .filter(|time| *time >= 0.0)
}

/// Route/weight attribute maps.
pub fn attrs_param(params: &Params, key: &str) -> SimResult<Option<AttrMap>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => {
            Ok(Some(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
        }
        Some(other) => Err(SimError::InvalidArgs(format!(
            "{key} must be a JSON object, got {other}"
        ))),
    }
}

/// A JSON value that may arrive as an embedded string.
pub fn json_param(params: &Params, key: &str) -> SimResult<Value> {
    match params.get(key) {
        Some(Value::String(text)) => serde_json::from_str(text)
            .map_err(|err| SimError::InvalidArgs(format!("Invalid JSON format for {key}: {err}"))),
        Some(value) => Ok(value.clone()),
        None => Err(SimError::InvalidArgs(format!("{key} must be provided"))),
    }
}

/// A single container, as a JSON string or object.
pub fn container_param(params: &Params, key: &str) -> SimResult<Container> {
    let value = json_param(params, key)?;
    serde_json::from_value(value)
        .map_err(|err| SimError::InvalidArgs(format!("Invalid container JSON: {err}")))
}

/// A list of containers, each element a JSON string or object.
pub fn containers_param(params: &Params, key: &str) -> SimResult<Vec<Container>> {
    let Some(Value::Array(items)) = params.get(key) else {
        return Err(SimError::InvalidArgs(format!("{key} must be a list")));
    };

    let mut containers = Vec::with_capacity(items.len());
    for item in items {
        let value = match item {
            Value::String(text) => serde_json::from_str(text).map_err(|err| {
                SimError::InvalidArgs(format!("Invalid container JSON: {err}"))
            })?,
            other => other.clone(),
        };
        let container = serde_json::from_value(value)
            .map_err(|err| SimError::InvalidArgs(format!("Invalid container JSON: {err}")))?;
        containers.push(container);
    }
    Ok(containers)
}

/// `allowed_regions`: optional list of region names.
pub fn regions_param(params: &Params, key: &str) -> SimResult<Option<Vec<String>>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => {
            let mut regions = Vec::with_capacity(items.len());
            for item in items {
                let region = item.as_str().ok_or_else(|| {
                    SimError::InvalidArgs(format!("{key} must be a list of strings"))
                })?;
                regions.push(region.to_string());
            }
            Ok(Some(regions))
        }
        Some(other) => Err(SimError::InvalidArgs(format!(
            "{key} must be a list of strings, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn string_params() {
        let p = params(json!({"terminal_name": "T", "empty": ""}));
        assert_eq!(require_str(&p, "terminal_name").unwrap(), "T");
        assert!(require_str(&p, "empty").is_err());
        assert!(require_str(&p, "missing").is_err());
        assert_eq!(opt_str(&p, "empty"), None);
    }

    #[test]
    fn mode_accepts_int_and_string() {
        let p = params(json!({"int": 2, "name": "Train", "bad": "Zeppelin"}));
        assert_eq!(
            mode_param(&p, "int", TransportationMode::Truck).unwrap(),
            TransportationMode::Ship
        );
        assert_eq!(
            mode_param(&p, "name", TransportationMode::Truck).unwrap(),
            TransportationMode::Train
        );
        assert_eq!(
            mode_param(&p, "missing", TransportationMode::Truck).unwrap(),
            TransportationMode::Truck
        );
        assert!(mode_param(&p, "bad", TransportationMode::Truck).is_err());
    }

    #[test]
    fn adding_time_negative_means_unset() {
        assert_eq!(adding_time_param(&params(json!({"adding_time": -1}))), None);
        assert_eq!(
            adding_time_param(&params(json!({"adding_time": 3600.0}))),
            Some(3600.0)
        );
        assert_eq!(adding_time_param(&params(json!({}))), None);
    }

    #[test]
    fn container_accepts_string_and_object() {
        let p = params(json!({
            "as_object": {"containerID": "a"},
            "as_string": "{\"containerID\": \"b\"}",
            "broken": "{nope",
        }));
        assert_eq!(container_param(&p, "as_object").unwrap().container_id, "a");
        assert_eq!(container_param(&p, "as_string").unwrap().container_id, "b");
        assert!(container_param(&p, "broken").is_err());
    }

    #[test]
    fn containers_list_mixes_forms() {
        let p = params(json!({
            "containers": [{"containerID": "a"}, "{\"containerID\": \"b\"}"],
        }));
        let containers = containers_param(&p, "containers").unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[1].container_id, "b");
    }

    #[test]
    fn regions_list() {
        let p = params(json!({"allowed_regions": ["West", "East"], "bad": [1]}));
        assert_eq!(
            regions_param(&p, "allowed_regions").unwrap().unwrap(),
            vec!["West", "East"]
        );
        assert_eq!(regions_param(&p, "missing").unwrap(), None);
        assert!(regions_param(&p, "bad").is_err());
    }
}
