//! Mode-aware linear cost function over edge attributes.

use indexmap::IndexMap;
use serde_json::Value;

use termsim_core::{attr_f64, AttrMap, TransportationMode};

/// Attribute keys that every stock weight table and default link carries.
const STANDARD_ATTRIBUTES: [&str; 6] = [
    "cost",
    "travellTime",
    "distance",
    "carbonEmissions",
    "risk",
    "energyConsumption",
];

/// Cost-function weight tables keyed by `"default"` or the stringified mode
/// integer. The `"default"` entry is the fallback for modes without their
/// own table; weights missing from a table count as 1.0.
#[derive(Debug, Clone)]
pub struct CostWeights {
    tables: IndexMap<String, IndexMap<String, f64>>,
}

impl Default for CostWeights {
    fn default() -> Self {
        let mut standard: IndexMap<String, f64> = STANDARD_ATTRIBUTES
            .iter()
            .map(|key| (key.to_string(), 1.0))
            .collect();
        standard.insert("terminal_delay".into(), 1.0);
        standard.insert("terminal_cost".into(), 1.0);

        let mut tables = IndexMap::new();
        tables.insert("default".to_string(), standard.clone());
        for mode in [
            TransportationMode::Truck,
            TransportationMode::Train,
            TransportationMode::Ship,
        ] {
            tables.insert((mode as i64).to_string(), standard.clone());
        }
        Self { tables }
    }
}

impl CostWeights {
    /// Replaces the tables from a `{mode_key: {attr: number}}` JSON object.
    /// Non-object entries and non-numeric weights are dropped.
    pub fn from_value(value: &Value) -> Self {
        let mut tables = IndexMap::new();
        if let Some(obj) = value.as_object() {
            for (mode_key, table_value) in obj {
                let Some(table_obj) = table_value.as_object() else {
                    continue;
                };
                let mut table = IndexMap::new();
                for (attr, weight) in table_obj {
                    if let Some(weight) = attr_f64(weight) {
                        table.insert(attr.clone(), weight);
                    }
                }
                tables.insert(mode_key.clone(), table);
            }
        }
        Self { tables }
    }

    pub fn to_value(&self) -> Value {
        let mut obj = serde_json::Map::new();
        for (mode_key, table) in &self.tables {
            let mut table_obj = serde_json::Map::new();
            for (attr, weight) in table {
                table_obj.insert(attr.clone(), serde_json::json!(weight));
            }
            obj.insert(mode_key.clone(), Value::Object(table_obj));
        }
        Value::Object(obj)
    }

    fn table_for(&self, mode: TransportationMode) -> Option<&IndexMap<String, f64>> {
        self.tables
            .get(&(mode as i64).to_string())
            .or_else(|| self.tables.get("default"))
    }

    /// `Σ w[k] · A[k]` over the numeric attributes of `params`; non-numeric
    /// attributes are skipped and missing weights count as 1.0.
    pub fn compute_cost(&self, params: &AttrMap, mode: TransportationMode) -> f64 {
        let table = self.table_for(mode);
        let mut cost = 0.0;
        for (key, value) in params {
            let Some(value) = attr_f64(value) else {
                continue;
            };
            let weight = table.and_then(|t| t.get(key)).copied().unwrap_or(1.0);
            cost += weight * value;
        }
        cost
    }
}

/// The stock attribute map merged into every new route.
pub fn default_link_attributes() -> AttrMap {
    STANDARD_ATTRIBUTES
        .iter()
        .map(|key| (key.to_string(), serde_json::json!(1.0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(entries: &[(&str, Value)]) -> AttrMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn folds_weighted_attributes() {
        let weights = CostWeights::from_value(&json!({
            "default": {"cost": 2.0, "distance": 0.5}
        }));
        let params = attrs(&[("cost", json!(10.0)), ("distance", json!(100.0))]);
        assert_eq!(
            weights.compute_cost(&params, TransportationMode::Truck),
            70.0
        );
    }

    #[test]
    fn missing_weight_defaults_to_one() {
        let weights = CostWeights::from_value(&json!({"default": {}}));
        let params = attrs(&[("cost", json!(10.0)), ("risk", json!(5.0))]);
        assert_eq!(weights.compute_cost(&params, TransportationMode::Ship), 15.0);
    }

    #[test]
    fn mode_table_overrides_default() {
        let weights = CostWeights::from_value(&json!({
            "default": {"cost": 1.0},
            "2": {"cost": 10.0}
        }));
        let params = attrs(&[("cost", json!(3.0))]);
        assert_eq!(weights.compute_cost(&params, TransportationMode::Ship), 30.0);
        assert_eq!(weights.compute_cost(&params, TransportationMode::Truck), 3.0);
    }

    #[test]
    fn non_numeric_attributes_are_ignored() {
        let weights = CostWeights::default();
        let params = attrs(&[("cost", json!(5.0)), ("label", json!("express"))]);
        assert_eq!(
            weights.compute_cost(&params, TransportationMode::Train),
            5.0
        );
    }

    #[test]
    fn default_tables_roundtrip_through_json() {
        let weights = CostWeights::default();
        let restored = CostWeights::from_value(&weights.to_value());
        let params = attrs(&[("cost", json!(2.0)), ("terminal_delay", json!(3.0))]);
        assert_eq!(
            weights.compute_cost(&params, TransportationMode::Truck),
            restored.compute_cost(&params, TransportationMode::Truck)
        );
    }
}
