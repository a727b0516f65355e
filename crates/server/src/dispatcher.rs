//! Command dispatcher: wire envelopes in, typed engine operations, wire
//! envelopes out.

use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use termsim_core::{parse_interface_map, SimError, SimResult, TransportationMode};
use termsim_graph::{parse_name_list, TerminalGraph};

use crate::params::{
    adding_time_param, attrs_param, container_param, containers_param, json_param, mode_param,
    opt_str, regions_param, require_f64, require_str, Params,
};

/// Maps command names to engine operations and packages responses.
///
/// A dispatcher-level lock serializes command processing so graph mutations
/// observe a total order.
pub struct CommandProcessor {
    graph: Arc<TerminalGraph>,
    server_id: String,
    lock: Mutex<()>,
}

impl CommandProcessor {
    pub fn new(graph: Arc<TerminalGraph>, server_id: impl Into<String>) -> Self {
        Self {
            graph,
            server_id: server_id.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Executes one command. Every failure surfaces as a `SimError`; the
    /// envelope layer turns those into `{success: false, error}`.
    pub fn dispatch(&self, command: &str, params: &Params) -> SimResult<Value> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        debug!(command, "Processing command");

        match command {
            // ── System ───────────────────────────────────────────────
            "ping" => {
                let mut response = Map::new();
                response.insert("status".into(), json!("ok"));
                response.insert("timestamp".into(), json!(iso_timestamp()));
                if let Some(echo) = params.get("echo") {
                    response.insert("echo".into(), echo.clone());
                }
                Ok(Value::Object(response))
            }
            "serialize_graph" => Ok(self.graph.serialize()),
            "deserialize_graph" => {
                let data = params.get("graph_data").ok_or_else(|| {
                    SimError::InvalidArgs("Missing or invalid graph_data parameter".into())
                })?;
                if !data.is_object() {
                    return Err(SimError::InvalidArgs(
                        "Missing or invalid graph_data parameter".into(),
                    ));
                }
                self.graph.load_state_from_value(data)?;
                Ok(json!(true))
            }

            // ── Terminals ────────────────────────────────────────────
            "add_terminal" => {
                let names_value = params.get("terminal_names").ok_or_else(|| {
                    SimError::InvalidArgs("Missing required parameters for add_terminal".into())
                })?;
                let config = params.get("custom_config").ok_or_else(|| {
                    SimError::InvalidArgs("Missing required parameters for add_terminal".into())
                })?;
                let interfaces_value = params.get("terminal_interfaces").ok_or_else(|| {
                    SimError::InvalidArgs("Missing required parameters for add_terminal".into())
                })?;

                let names = parse_name_list(names_value)?;
                let interfaces = parse_interface_map(interfaces_value)?;
                if interfaces.is_empty() {
                    return Err(SimError::InvalidArgs(
                        "At least one terminal interface with modes must be provided".into(),
                    ));
                }
                let display_name = opt_str(params, "display_name").unwrap_or(&names[0]);
                let region = opt_str(params, "region");

                self.graph
                    .add_terminal(&names, display_name, config, interfaces, region)?;
                Ok(json!(true))
            }
            "add_alias_to_terminal" => {
                let terminal_name = require_str(params, "terminal_name")?;
                let alias = require_str(params, "alias")?;
                self.graph.add_alias_to_terminal(terminal_name, alias)?;
                Ok(json!(true))
            }
            "get_aliases_of_terminal" => {
                let terminal_name = require_str(params, "terminal_name")?;
                Ok(json!(self.graph.get_aliases_of_terminal(terminal_name)))
            }
            "remove_terminal" => {
                let terminal_name = require_str(params, "terminal_name")?;
                Ok(json!(self.graph.remove_terminal(terminal_name)))
            }
            "get_terminal_count" => Ok(json!(self.graph.get_terminal_count())),
            "get_terminal_status" => {
                let terminal_name = opt_str(params, "terminal_name");
                self.graph.get_terminal_status(terminal_name)
            }
            "get_terminal" => {
                let terminal_name = require_str(params, "terminal_name")?;
                let terminal = self.graph.get_terminal(terminal_name)?;
                Ok(terminal.to_json())
            }

            // ── Routes ───────────────────────────────────────────────
            "add_route" => {
                let route_id = require_str(params, "route_id")?;
                let start = require_str(params, "start_terminal")?;
                let end = require_str(params, "end_terminal")?;
                let mode = params
                    .get("mode")
                    .ok_or_else(|| {
                        SimError::InvalidArgs("Missing required parameters for add_route".into())
                    })
                    .and_then(TransportationMode::from_value)?;
                let attrs = attrs_param(params, "attributes")?;
                self.graph
                    .add_route(route_id, start, end, mode, attrs.as_ref())?;
                Ok(json!(true))
            }
            "change_route_weight" => {
                let start = require_str(params, "start_terminal")?;
                let end = require_str(params, "end_terminal")?;
                let mode = mode_param(params, "mode", TransportationMode::Truck)?;
                let attrs = attrs_param(params, "attributes")?.ok_or_else(|| {
                    SimError::InvalidArgs(
                        "Start terminal, end terminal, and attributes must be provided".into(),
                    )
                })?;
                if attrs.is_empty() {
                    return Err(SimError::InvalidArgs(
                        "Start terminal, end terminal, and attributes must be provided".into(),
                    ));
                }
                self.graph.change_route_weight(start, end, mode, &attrs)?;
                Ok(json!(true))
            }

            // ── Auto-wiring ──────────────────────────────────────────
            "connect_terminals_by_interface_modes" => {
                self.graph.connect_terminals_by_interface_modes()?;
                Ok(json!(true))
            }
            "connect_terminals_in_region_by_mode" => {
                let region = require_str(params, "region")?;
                self.graph.connect_terminals_in_region_by_mode(region)?;
                Ok(json!(true))
            }
            "connect_regions_by_mode" => {
                let mode = mode_param(params, "mode", TransportationMode::Truck)?;
                self.graph.connect_regions_by_mode(mode)?;
                Ok(json!(true))
            }

            // ── Path finding ─────────────────────────────────────────
            "find_shortest_path" => {
                let start = require_str(params, "start_terminal")?;
                let end = require_str(params, "end_terminal")?;
                let mode = mode_param(params, "mode", TransportationMode::Truck)?;

                let segments = match regions_param(params, "allowed_regions")? {
                    Some(regions) => self
                        .graph
                        .find_shortest_path_within_regions(start, end, &regions, mode)?,
                    None => self.graph.find_shortest_path(start, end, mode)?,
                };
                Ok(json!(segments))
            }
            "find_top_paths" => {
                let start = require_str(params, "start_terminal")?;
                let end = require_str(params, "end_terminal")?;
                let n = params
                    .get("n")
                    .and_then(Value::as_i64)
                    .unwrap_or(5)
                    .max(0) as usize;
                let mode = mode_param(params, "mode", TransportationMode::Truck)?;
                let skip_delays = params
                    .get("skip_same_mode_terminal_delays_and_costs")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);

                let paths = self
                    .graph
                    .find_top_n_shortest_paths(start, end, n, mode, skip_delays)?;
                Ok(json!(paths))
            }

            // ── Container operations ─────────────────────────────────
            "add_container" => {
                let terminal = self.terminal_from_params(params)?;
                let container = container_param(params, "container")?;
                terminal.add_container(container, adding_time_param(params))?;
                Ok(json!(true))
            }
            "add_containers" => {
                let terminal = self.terminal_from_params(params)?;
                let containers = containers_param(params, "containers")?;
                terminal.add_containers(containers, adding_time_param(params))?;
                Ok(json!(true))
            }
            "add_containers_from_json" => {
                let terminal = self.terminal_from_params(params)?;
                let containers = json_param(params, "containers_json")?;
                terminal.add_containers_from_json(&containers, adding_time_param(params))?;
                Ok(json!(true))
            }
            "get_containers_by_departing_time" => {
                let terminal = self.terminal_from_params(params)?;
                let departing_time = require_f64(params, "departing_time")?;
                let condition = opt_str(params, "condition").unwrap_or("<");
                Ok(json!(
                    terminal.containers_by_departing_time(departing_time, condition)?
                ))
            }
            "get_containers_by_added_time" => {
                let terminal = self.terminal_from_params(params)?;
                let added_time = require_f64(params, "added_time")?;
                let condition = require_str(params, "condition")?;
                Ok(json!(
                    terminal.containers_by_added_time(added_time, condition)?
                ))
            }
            "get_containers_by_next_destination" => {
                let terminal = self.terminal_from_params(params)?;
                let destination = require_str(params, "destination")?;
                Ok(json!(terminal.containers_by_next_destination(destination)))
            }
            "dequeue_containers_by_next_destination" => {
                let terminal = self.terminal_from_params(params)?;
                let destination = require_str(params, "destination")?;
                Ok(json!(
                    terminal.dequeue_containers_by_next_destination(destination)
                ))
            }
            "get_container_count" => {
                let terminal = self.terminal_from_params(params)?;
                Ok(json!(terminal.container_count()))
            }
            "get_available_capacity" => {
                let terminal = self.terminal_from_params(params)?;
                Ok(json!(terminal.available_capacity()))
            }
            "get_max_capacity" => {
                let terminal = self.terminal_from_params(params)?;
                Ok(json!(terminal.max_capacity()))
            }
            "clear_terminal" => {
                let terminal = self.terminal_from_params(params)?;
                terminal.clear();
                Ok(json!(true))
            }

            other => Err(SimError::InvalidArgs(format!("Unknown command: {other}"))),
        }
    }

    /// Processes one wire envelope and builds the response envelope. Never
    /// fails: command errors become `{success: false, error}`.
    pub fn dispatch_envelope(&self, envelope: &Value) -> Value {
        let mut response = Map::new();

        let request_id = envelope
            .get("request_id")
            .cloned()
            .unwrap_or_else(|| json!(Uuid::new_v4().to_string()));
        response.insert("request_id".into(), request_id);
        response.insert("timestamp".into(), json!(iso_timestamp()));
        response.insert("server_id".into(), json!(self.server_id));
        if let Some(message_id) = envelope.get("message_id") {
            response.insert("message_id".into(), message_id.clone());
        }

        let Some(command) = envelope.get("command").and_then(Value::as_str) else {
            response.insert("success".into(), json!(false));
            response.insert("error".into(), json!("Missing or invalid command"));
            return Value::Object(response);
        };

        let empty = Map::new();
        let params = envelope
            .get("params")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        match self.dispatch(command, params) {
            Ok(result) => {
                response.insert("success".into(), json!(true));
                response.insert("result".into(), result);
            }
            Err(err) => {
                warn!(command, error = %err, "Command failed");
                response.insert("success".into(), json!(false));
                response.insert("error".into(), json!(err.to_string()));
            }
        }
        Value::Object(response)
    }

    fn terminal_from_params(&self, params: &Params) -> SimResult<Arc<termsim_terminal::Terminal>> {
        let terminal_id = require_str(params, "terminal_id")?;
        self.graph
            .get_terminal(terminal_id)
            .map_err(|_| SimError::NotFound(format!("Terminal not found: {terminal_id}")))
    }
}

fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn processor() -> CommandProcessor {
        CommandProcessor::new(Arc::new(TerminalGraph::new(None)), "server-1")
    }

    fn params(value: Value) -> Params {
        value.as_object().unwrap().clone()
    }

    fn add_terminal(processor: &CommandProcessor, name: &str, region: Option<&str>) {
        let mut p = json!({
            "terminal_names": [name],
            "display_name": name,
            "terminal_interfaces": {"0": [0]},
            "custom_config": {},
        });
        if let Some(region) = region {
            p["region"] = json!(region);
        }
        processor.dispatch("add_terminal", &params(p)).unwrap();
    }

    #[test]
    fn ping_echoes() {
        let processor = processor();
        let result = processor
            .dispatch("ping", &params(json!({"echo": "hello"})))
            .unwrap();
        assert_eq!(result["status"], json!("ok"));
        assert_eq!(result["echo"], json!("hello"));
        assert!(result["timestamp"].is_string());
    }

    #[test]
    fn unknown_command_is_invalid_args() {
        let processor = processor();
        assert!(matches!(
            processor.dispatch("warp_drive", &Map::new()),
            Err(SimError::InvalidArgs(_))
        ));
    }

    #[test]
    fn envelope_success_shape() {
        let processor = processor();
        let response = processor.dispatch_envelope(&json!({
            "command": "get_terminal_count",
            "request_id": "req-7",
            "message_id": "msg-1",
        }));
        assert_eq!(response["success"], json!(true));
        assert_eq!(response["result"], json!(0));
        assert_eq!(response["request_id"], json!("req-7"));
        assert_eq!(response["message_id"], json!("msg-1"));
        assert_eq!(response["server_id"], json!("server-1"));
        assert!(response["timestamp"].is_string());
    }

    #[test]
    fn envelope_generates_request_id() {
        let processor = processor();
        let response = processor.dispatch_envelope(&json!({"command": "get_terminal_count"}));
        assert!(!response["request_id"].as_str().unwrap().is_empty());
    }

    #[test]
    fn envelope_error_shape() {
        let processor = processor();
        let response = processor.dispatch_envelope(&json!({
            "command": "get_terminal",
            "params": {"terminal_name": "ghost"},
        }));
        assert_eq!(response["success"], json!(false));
        assert!(response["error"].as_str().unwrap().contains("Not found"));

        let response = processor.dispatch_envelope(&json!({"params": {}}));
        assert_eq!(response["success"], json!(false));
        assert_eq!(response["error"], json!("Missing or invalid command"));
    }

    #[test]
    fn terminal_lifecycle_via_commands() {
        let processor = processor();
        add_terminal(&processor, "A", Some("West"));

        processor
            .dispatch(
                "add_alias_to_terminal",
                &params(json!({"terminal_name": "A", "alias": "Alpha"})),
            )
            .unwrap();
        let aliases = processor
            .dispatch(
                "get_aliases_of_terminal",
                &params(json!({"terminal_name": "Alpha"})),
            )
            .unwrap();
        assert_eq!(aliases, json!(["A", "Alpha"]));

        let status = processor
            .dispatch("get_terminal_status", &params(json!({"terminal_name": "A"})))
            .unwrap();
        assert_eq!(status["region"], json!("West"));

        let removed = processor
            .dispatch("remove_terminal", &params(json!({"terminal_name": "Alpha"})))
            .unwrap();
        assert_eq!(removed, json!(true));
        assert_eq!(
            processor.dispatch("get_terminal_count", &Map::new()).unwrap(),
            json!(0)
        );
    }

    #[test]
    fn route_and_path_commands() {
        let processor = processor();
        for name in ["A", "B", "C"] {
            add_terminal(&processor, name, None);
        }
        for (id, from, to, cost) in
            [("ab", "A", "B", 50.0), ("bc", "B", "C", 75.0), ("ac", "A", "C", 200.0)]
        {
            processor
                .dispatch(
                    "add_route",
                    &params(json!({
                        "route_id": id,
                        "start_terminal": from,
                        "end_terminal": to,
                        "mode": "Truck",
                        "attributes": {"cost": cost},
                    })),
                )
                .unwrap();
        }

        let path = processor
            .dispatch(
                "find_shortest_path",
                &params(json!({"start_terminal": "A", "end_terminal": "C", "mode": 0})),
            )
            .unwrap();
        let segments = path.as_array().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0]["to"], json!("B"));
        assert_eq!(segments[0]["mode"], json!(0));

        let top = processor
            .dispatch(
                "find_top_paths",
                &params(json!({"start_terminal": "A", "end_terminal": "C", "n": 2, "mode": 0})),
            )
            .unwrap();
        let paths = top.as_array().unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0]["path_id"], json!(1));
        assert!(
            paths[0]["total_path_cost"].as_f64().unwrap()
                <= paths[1]["total_path_cost"].as_f64().unwrap()
        );

        // Unknown mode strings are rejected.
        assert!(matches!(
            processor.dispatch(
                "find_shortest_path",
                &params(json!({
                    "start_terminal": "A",
                    "end_terminal": "C",
                    "mode": "Teleport",
                })),
            ),
            Err(SimError::InvalidArgs(_))
        ));
    }

    #[test]
    fn container_commands() {
        let processor = processor();
        add_terminal(&processor, "T", None);

        processor
            .dispatch(
                "add_container",
                &params(json!({
                    "terminal_id": "T",
                    "container": {"containerID": "c1", "containerNextDestination": "B"},
                })),
            )
            .unwrap();
        processor
            .dispatch(
                "add_containers",
                &params(json!({
                    "terminal_id": "T",
                    "containers": ["{\"containerID\": \"c2\"}"],
                })),
            )
            .unwrap();
        processor
            .dispatch(
                "add_containers_from_json",
                &params(json!({
                    "terminal_id": "T",
                    "containers_json": {"containers": [{"containerID": "c3"}]},
                })),
            )
            .unwrap();

        assert_eq!(
            processor
                .dispatch("get_container_count", &params(json!({"terminal_id": "T"})))
                .unwrap(),
            json!(3)
        );
        assert_eq!(
            processor
                .dispatch("get_available_capacity", &params(json!({"terminal_id": "T"})))
                .unwrap(),
            json!(null)
        );

        let bound = processor
            .dispatch(
                "get_containers_by_next_destination",
                &params(json!({"terminal_id": "T", "destination": "B"})),
            )
            .unwrap();
        assert_eq!(bound.as_array().unwrap().len(), 1);

        let dequeued = processor
            .dispatch(
                "dequeue_containers_by_next_destination",
                &params(json!({"terminal_id": "T", "destination": "B"})),
            )
            .unwrap();
        assert_eq!(dequeued.as_array().unwrap().len(), 1);

        processor
            .dispatch("clear_terminal", &params(json!({"terminal_id": "T"})))
            .unwrap();
        assert_eq!(
            processor
                .dispatch("get_container_count", &params(json!({"terminal_id": "T"})))
                .unwrap(),
            json!(0)
        );

        // Invalid comparison operator surfaces as InvalidArgs.
        assert!(matches!(
            processor.dispatch(
                "get_containers_by_departing_time",
                &params(json!({"terminal_id": "T", "departing_time": 0.0, "condition": "~"})),
            ),
            Err(SimError::InvalidArgs(_))
        ));
    }

    #[test]
    fn serialize_roundtrip_via_commands() {
        let processor = processor();
        add_terminal(&processor, "A", Some("R"));

        let serialized = processor.dispatch("serialize_graph", &Map::new()).unwrap();
        processor
            .dispatch("remove_terminal", &params(json!({"terminal_name": "A"})))
            .unwrap();
        assert_eq!(
            processor.dispatch("get_terminal_count", &Map::new()).unwrap(),
            json!(0)
        );

        processor
            .dispatch(
                "deserialize_graph",
                &params(json!({"graph_data": serialized})),
            )
            .unwrap();
        assert_eq!(
            processor.dispatch("get_terminal_count", &Map::new()).unwrap(),
            json!(1)
        );

        assert!(matches!(
            processor.dispatch("deserialize_graph", &params(json!({"graph_data": 5}))),
            Err(SimError::InvalidArgs(_))
        ));
    }
}
