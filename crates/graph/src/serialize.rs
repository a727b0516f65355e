//! JSON round-trip and file persistence for the graph.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use termsim_core::{AttrMap, SimError, SimResult, TransportationMode};
use termsim_terminal::Terminal;

use crate::cost::CostWeights;
use crate::engine::{GraphState, TerminalGraph};

impl TerminalGraph {
    /// Serializes the full graph: terminals (with node data), edges, alias
    /// tables, cost weights, and default link attributes.
    pub fn serialize(&self) -> Value {
        // Snapshot under the graph lock, then query terminals after
        // releasing it (Terminal::to_json takes the terminal lock).
        let (terminals, node_attributes, adjacency, aliases, canonical_to_aliases, weights, defaults) = {
            let state = self.lock();
            (
                state.terminals.clone(),
                state.node_attributes.clone(),
                state.adjacency.clone(),
                state.aliases.clone(),
                state.canonical_to_aliases.clone(),
                state.cost_weights.clone(),
                state.default_link_attributes.clone(),
            )
        };

        let mut terminals_json = Map::new();
        for (canonical, terminal) in &terminals {
            let node_data: Value = node_attributes
                .get(canonical)
                .map(|attrs| json!(attrs))
                .unwrap_or_else(|| json!({}));
            terminals_json.insert(
                canonical.clone(),
                json!({
                    "config": terminal.to_json(),
                    "node_data": node_data,
                }),
            );
        }

        let mut edges_json = Vec::new();
        for (from, edges) in &adjacency {
            for edge in edges {
                edges_json.push(json!({
                    "from": from,
                    "to": edge.to,
                    "route_id": edge.route_id,
                    "mode": edge.mode as i64,
                    "attributes": edge.attributes,
                }));
            }
        }

        let aliases_json: Map<String, Value> = aliases
            .iter()
            .map(|(alias, canonical)| (alias.clone(), json!(canonical)))
            .collect();
        let canonical_json: Map<String, Value> = canonical_to_aliases
            .iter()
            .map(|(canonical, aliases)| {
                let list: Vec<&String> = aliases.iter().collect();
                (canonical.clone(), json!(list))
            })
            .collect();

        debug!(terminals = terminals.len(), "Serialized graph");
        json!({
            "terminals": terminals_json,
            "edges": edges_json,
            "terminal_aliases": aliases_json,
            "canonical_to_aliases": canonical_json,
            "cost_function_weights": weights.to_value(),
            "default_link_attributes": defaults,
        })
    }

    /// Builds a new graph from serialized data.
    pub fn deserialize(data: &Value, dir: Option<&Path>) -> SimResult<TerminalGraph> {
        let graph = TerminalGraph::new(dir.map(Path::to_path_buf));
        graph.load_state_from_value(data)?;
        Ok(graph)
    }

    /// Replaces this graph's state with the deserialized form of `data`.
    /// Used by the `deserialize_graph` command to swap the live graph.
    pub fn load_state_from_value(&self, data: &Value) -> SimResult<()> {
        let obj = data
            .as_object()
            .ok_or_else(|| SimError::Persistence("Graph data must be a JSON object".into()))?;

        let mut state = GraphState::empty();

        if let Some(weights) = obj.get("cost_function_weights") {
            state.cost_weights = CostWeights::from_value(weights);
        }
        if let Some(Value::Object(defaults)) = obj.get("default_link_attributes") {
            for (key, value) in defaults {
                state
                    .default_link_attributes
                    .insert(key.clone(), value.clone());
            }
        }

        if let Some(Value::Object(aliases)) = obj.get("terminal_aliases") {
            for (alias, canonical) in aliases {
                if let Some(canonical) = canonical.as_str() {
                    state
                        .aliases
                        .insert(alias.clone(), canonical.to_string());
                }
            }
        }
        if let Some(Value::Object(canonical_map)) = obj.get("canonical_to_aliases") {
            for (canonical, aliases) in canonical_map {
                let Some(list) = aliases.as_array() else {
                    continue;
                };
                let set = list
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
                state.canonical_to_aliases.insert(canonical.clone(), set);
            }
        }

        if let Some(Value::Object(terminals)) = obj.get("terminals") {
            for (name, entry) in terminals {
                let Some(config) = entry.get("config") else {
                    continue;
                };
                let mut config = config.clone();
                if let Some(config_obj) = config.as_object_mut() {
                    config_obj.insert("terminal_name".into(), json!(name));
                }
                let terminal = match Terminal::from_json(&config) {
                    Ok(terminal) => terminal,
                    Err(err) => {
                        warn!(terminal = %name, %err, "Failed to restore terminal");
                        continue;
                    }
                };
                state.terminals.insert(name.clone(), Arc::new(terminal));
                state.adjacency.entry(name.clone()).or_default();

                if let Some(Value::Object(node_data)) = entry.get("node_data") {
                    if !node_data.is_empty() {
                        let attrs: AttrMap = node_data
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        state.node_attributes.insert(name.clone(), attrs);
                    }
                }
            }
        }

        if let Some(Value::Array(edges)) = obj.get("edges") {
            for entry in edges {
                let Some(edge) = entry.as_object() else {
                    continue;
                };
                let (Some(from), Some(to), Some(mode_value), Some(Value::Object(attrs))) = (
                    edge.get("from").and_then(Value::as_str),
                    edge.get("to").and_then(Value::as_str),
                    edge.get("mode"),
                    edge.get("attributes"),
                ) else {
                    continue;
                };
                let mode = match TransportationMode::from_value(mode_value)
                    .and_then(TransportationMode::concrete)
                {
                    Ok(mode) => mode,
                    Err(err) => {
                        warn!(from, to, %err, "Skipping edge with invalid mode");
                        continue;
                    }
                };
                let route_id = edge
                    .get("route_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let attributes: AttrMap =
                    attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                state.upsert_edge(from, to, route_id, mode, attributes);
            }
        }

        debug!(terminals = state.terminals.len(), "Graph deserialized");
        self.replace_state(state);
        Ok(())
    }

    /// Serializes the graph and writes it as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> SimResult<()> {
        let data = self.serialize();
        let text = serde_json::to_string_pretty(&data)?;
        std::fs::write(path, text).map_err(|err| {
            SimError::Persistence(format!("Cannot write file {}: {err}", path.display()))
        })?;
        info!(path = %path.display(), "Graph saved");
        Ok(())
    }

    /// Loads a graph from a JSON file.
    pub fn load_from_file(path: &Path, dir: Option<&Path>) -> SimResult<TerminalGraph> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            SimError::Persistence(format!("Cannot open file {}: {err}", path.display()))
        })?;
        let data: Value = serde_json::from_str(&text)?;
        Self::deserialize(&data, dir)
    }
}
