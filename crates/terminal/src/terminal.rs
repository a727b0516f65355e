//! The terminal entity: capacity accounting, stochastic dwell and customs
//! delays, per-container cost accumulation, and thread-safe container
//! storage.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use termsim_core::{attr_f64, Container, SimError, SimResult, TerminalInterface, TransportationMode};

use crate::dwell::{self, get_departure_time};
use crate::storage::{CompareOp, ContainerStorage};

/// Parsed terminal configuration: capacity, dwell-time, customs, and cost
/// parameters, each section optional on the wire.
#[derive(Debug, Clone)]
pub struct TerminalConfig {
    /// `None` means unbounded.
    pub max_capacity: Option<i64>,
    /// Negative disables the critical-threshold check.
    pub critical_threshold: f64,
    pub dwell_method: String,
    pub dwell_parameters: IndexMap<String, f64>,
    pub customs_probability: f64,
    pub customs_delay_mean: f64,
    pub customs_delay_variance: f64,
    pub fixed_fees: f64,
    pub customs_fees: f64,
    pub risk_factor: f64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            max_capacity: None,
            critical_threshold: 0.9,
            dwell_method: String::new(),
            dwell_parameters: IndexMap::new(),
            customs_probability: 0.0,
            customs_delay_mean: 0.0,
            customs_delay_variance: 0.0,
            fixed_fees: 0.0,
            customs_fees: 0.0,
            risk_factor: 0.0,
        }
    }
}

impl TerminalConfig {
    /// Parses the `custom_config` object: `capacity`, `dwell_time`,
    /// `customs`, and `cost` sections, all optional.
    pub fn from_value(value: &Value) -> SimResult<Self> {
        let mut config = TerminalConfig::default();
        let Some(obj) = value.as_object() else {
            if value.is_null() {
                return Ok(config);
            }
            return Err(SimError::InvalidArgs(
                "Terminal configuration must be a JSON object".into(),
            ));
        };

        if let Some(capacity) = obj.get("capacity").and_then(Value::as_object) {
            match capacity.get("max_capacity") {
                Some(Value::Null) | None => {}
                Some(v) => {
                    config.max_capacity = Some(attr_f64(v).ok_or_else(|| {
                        SimError::InvalidArgs(format!("max_capacity must be numeric, got {v}"))
                    })? as i64);
                }
            }
            match capacity.get("critical_threshold") {
                Some(Value::Null) => config.critical_threshold = -1.0,
                Some(v) => {
                    config.critical_threshold = attr_f64(v).ok_or_else(|| {
                        SimError::InvalidArgs(format!(
                            "critical_threshold must be numeric, got {v}"
                        ))
                    })?;
                }
                None => {}
            }
        }

        if let Some(dwell) = obj.get("dwell_time").and_then(Value::as_object) {
            if let Some(method) = dwell.get("method").and_then(Value::as_str) {
                config.dwell_method = method.to_string();
            }
            if let Some(params) = dwell.get("parameters").and_then(Value::as_object) {
                // Non-numeric parameters are dropped.
                for (key, value) in params {
                    if let Some(number) = attr_f64(value) {
                        config.dwell_parameters.insert(key.clone(), number);
                    }
                }
            }
        }

        if let Some(customs) = obj.get("customs").and_then(Value::as_object) {
            config.customs_probability = customs
                .get("probability")
                .and_then(attr_f64)
                .unwrap_or(0.0);
            config.customs_delay_mean =
                customs.get("delay_mean").and_then(attr_f64).unwrap_or(0.0);
            config.customs_delay_variance = customs
                .get("delay_variance")
                .and_then(attr_f64)
                .unwrap_or(0.0);
        }

        if let Some(cost) = obj.get("cost").and_then(Value::as_object) {
            config.fixed_fees = cost.get("fixed_fees").and_then(attr_f64).unwrap_or(0.0);
            config.customs_fees = cost.get("customs_fees").and_then(attr_f64).unwrap_or(0.0);
            config.risk_factor = cost.get("risk_factor").and_then(attr_f64).unwrap_or(0.0);
        }

        Ok(config)
    }
}

struct TerminalState {
    config: TerminalConfig,
    mode_network_aliases: IndexMap<(TransportationMode, String), String>,
    storage: ContainerStorage,
}

/// A container-handling terminal.
///
/// Identity (name, display name, interfaces) is immutable; capacity
/// configuration, the mode–network alias table, and the container storage
/// sit behind the terminal's own lock. Callers must never hold the engine
/// lock while invoking methods here.
pub struct Terminal {
    name: String,
    display_name: String,
    interfaces: IndexMap<TerminalInterface, BTreeSet<TransportationMode>>,
    state: Mutex<TerminalState>,
}

impl Terminal {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        interfaces: IndexMap<TerminalInterface, BTreeSet<TransportationMode>>,
        config: TerminalConfig,
    ) -> SimResult<Self> {
        let name = name.into();
        if interfaces.is_empty() || interfaces.values().all(BTreeSet::is_empty) {
            return Err(SimError::InvalidArgs(
                "At least one terminal interface with modes must be provided".into(),
            ));
        }

        debug!(
            terminal = %name,
            interfaces = interfaces.len(),
            max_capacity = ?config.max_capacity,
            "Terminal initialized"
        );

        Ok(Self {
            name,
            display_name: display_name.into(),
            interfaces,
            state: Mutex::new(TerminalState {
                config,
                mode_network_aliases: IndexMap::new(),
                storage: ContainerStorage::new(),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, TerminalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn interfaces(&self) -> &IndexMap<TerminalInterface, BTreeSet<TransportationMode>> {
        &self.interfaces
    }

    /// Union of supported modes across every interface.
    pub fn supported_modes(&self) -> BTreeSet<TransportationMode> {
        self.interfaces.values().flatten().copied().collect()
    }

    pub fn can_accept(&self, mode: TransportationMode, interface: TerminalInterface) -> bool {
        self.interfaces
            .get(&interface)
            .is_some_and(|modes| modes.contains(&mode))
    }

    // ── Mode–network aliases ─────────────────────────────────────────

    pub fn alias_for_mode_network(&self, mode: TransportationMode, network: &str) -> Option<String> {
        self.state()
            .mode_network_aliases
            .get(&(mode, network.to_string()))
            .cloned()
    }

    pub fn add_alias_for_mode_network(
        &self,
        mode: TransportationMode,
        network: impl Into<String>,
        alias: impl Into<String>,
    ) {
        let network = network.into();
        let alias = alias.into();
        debug!(terminal = %self.name, %mode, network = %network, alias = %alias, "Added mode-network alias");
        self.state()
            .mode_network_aliases
            .insert((mode, network), alias);
    }

    // ── Capacity ─────────────────────────────────────────────────────

    /// Capacity probe for `additional` incoming containers.
    ///
    /// Returns `(accepted, message)`; a message starting with `Warning`
    /// still accepts.
    pub fn check_capacity(&self, additional: usize) -> (bool, String) {
        let state = self.state();
        Self::check_capacity_locked(&state, additional)
    }

    fn check_capacity_locked(state: &TerminalState, additional: usize) -> (bool, String) {
        let Some(max) = state.config.max_capacity else {
            return (true, "OK".to_string());
        };

        let current = state.storage.len() as i64;
        let new_count = current + additional as i64;
        if new_count > max {
            return (false, format!("Exceeds max capacity of {max}"));
        }

        let threshold = state.config.critical_threshold;
        if threshold < 0.0 {
            return (true, "OK".to_string());
        }

        // The critical and warning gates look at current occupancy; only the
        // hard max accounts for the incoming batch.
        let critical = max as f64 * threshold;
        if current as f64 > critical {
            return (
                false,
                format!("Exceeds critical threshold ({}% of {max})", threshold * 100.0),
            );
        }

        let warning = critical * 0.9;
        if current as f64 > warning {
            return (
                true,
                format!(
                    "Warning: Approaching critical capacity ({current}/{})",
                    critical.round() as i64
                ),
            );
        }

        (true, "OK".to_string())
    }

    // ── Estimation ───────────────────────────────────────────────────

    /// Expected hours a container spends here: one dwell draw (when a dwell
    /// configuration is present) plus the expected customs delay.
    pub fn estimate_handling_time(&self) -> SimResult<f64> {
        let state = self.state();
        let mut total_hours = 0.0;

        if !state.config.dwell_parameters.is_empty() {
            let method = if state.config.dwell_method.is_empty() {
                "gamma"
            } else {
                &state.config.dwell_method
            };
            total_hours += get_departure_time(0.0, method, &state.config.dwell_parameters)? / 3600.0;
        }

        if state.config.customs_probability > 0.0 && state.config.customs_delay_mean > 0.0 {
            total_hours += state.config.customs_probability * state.config.customs_delay_mean;
        }

        Ok(total_hours)
    }

    /// Per-container cost: fixed fees, customs fees when applied, and a
    /// risk surcharge proportional to the container's declared dollar value.
    pub fn estimate_container_cost(&self, container: Option<&Container>, apply_customs: bool) -> f64 {
        let state = self.state();
        Self::estimate_cost_locked(&state, container, apply_customs)
    }

    fn estimate_cost_locked(
        state: &TerminalState,
        container: Option<&Container>,
        apply_customs: bool,
    ) -> f64 {
        let mut total = 0.0;
        if state.config.fixed_fees > 0.0 {
            total += state.config.fixed_fees;
        }
        if apply_customs && state.config.customs_fees > 0.0 {
            total += state.config.customs_fees;
        }
        if let Some(container) = container {
            if state.config.risk_factor > 0.0 {
                if let Some(value) = container.custom_variable_f64("dollar_value") {
                    total += value * state.config.risk_factor;
                }
            }
        }
        total
    }

    // ── Container operations ─────────────────────────────────────────

    /// Adds one container.
    ///
    /// With an `adding_time`, the departure is drawn from the dwell
    /// distribution and a customs delay may apply; without one, both
    /// stochastic steps are suppressed and times default to zero.
    pub fn add_container(&self, container: Container, adding_time: Option<f64>) -> SimResult<()> {
        let mut state = self.state();

        let (ok, message) = Self::check_capacity_locked(&state, 1);
        if !ok {
            warn!(terminal = %self.name, %message, "Cannot add container");
            return Err(SimError::CapacityExceeded(format!(
                "Cannot add container: {message}"
            )));
        }
        if message.starts_with("Warning") {
            warn!(terminal = %self.name, %message);
        }

        let mut container = container;
        let base_adding_time = adding_time.unwrap_or(0.0).max(0.0);
        let mut departure = base_adding_time;
        let mut customs_applied = false;

        if adding_time.is_some() {
            if !state.config.dwell_method.is_empty() && !state.config.dwell_parameters.is_empty() {
                departure = get_departure_time(
                    base_adding_time,
                    &state.config.dwell_method,
                    &state.config.dwell_parameters,
                )?;
            }

            if state.config.customs_probability > 0.0 && state.config.customs_delay_mean > 0.0 {
                if dwell::global_f64() < state.config.customs_probability {
                    let delay_hours = dwell::sample_customs_delay(
                        state.config.customs_delay_mean,
                        state.config.customs_delay_variance,
                    );
                    departure += delay_hours * 3600.0;
                    customs_applied = true;
                    debug!(
                        terminal = %self.name,
                        container = %container.container_id,
                        delay_hours,
                        "Container selected for customs inspection"
                    );
                }
            }
        }

        let handling_cost = Self::estimate_cost_locked(&state, Some(&container), customs_applied);
        let total_cost = handling_cost + container.custom_variable_f64("cost").unwrap_or(0.0);
        container.set_custom_variable("cost", json!(total_cost));

        let total_time =
            (departure - base_adding_time) + container.custom_variable_f64("time").unwrap_or(0.0);
        container.set_custom_variable("time", json!(total_time));

        container.current_location = Some(self.name.clone());

        debug!(
            terminal = %self.name,
            container = %container.container_id,
            added = base_adding_time,
            departure,
            "Container added"
        );
        state.storage.add(container, base_adding_time, departure);
        Ok(())
    }

    /// Batch add: the capacity gate uses the batch size, then each container
    /// is inserted individually with the lock released between inserts.
    pub fn add_containers(
        &self,
        containers: Vec<Container>,
        adding_time: Option<f64>,
    ) -> SimResult<()> {
        let count = containers.len();
        {
            let state = self.state();
            let (ok, message) = Self::check_capacity_locked(&state, count);
            if !ok {
                warn!(terminal = %self.name, count, %message, "Cannot add containers");
                return Err(SimError::CapacityExceeded(format!(
                    "Cannot add {count} containers: {message}"
                )));
            }
            if message.starts_with("Warning") {
                warn!(terminal = %self.name, %message);
            }
        }

        for container in containers {
            self.add_container(container, adding_time)?;
        }
        Ok(())
    }

    /// Accepts `{containers: […]}`, a single container object (detected by
    /// `containerID`), or a map of id → container.
    pub fn add_containers_from_json(&self, value: &Value, adding_time: Option<f64>) -> SimResult<()> {
        let containers = parse_container_collection(value)?;
        if containers.is_empty() {
            warn!(terminal = %self.name, "No valid containers found in JSON");
            return Ok(());
        }
        debug!(terminal = %self.name, count = containers.len(), "Adding containers from JSON");
        self.add_containers(containers, adding_time)
    }

    // ── Container queries ────────────────────────────────────────────

    pub fn containers_by_departing_time(&self, time: f64, condition: &str) -> SimResult<Vec<Value>> {
        let op = CompareOp::parse(condition)?;
        let state = self.state();
        Ok(state
            .storage
            .by_departing_time(time, op)
            .into_iter()
            .map(|stored| stored.container.to_json())
            .collect())
    }

    pub fn containers_by_added_time(&self, time: f64, condition: &str) -> SimResult<Vec<Value>> {
        let op = CompareOp::parse(condition)?;
        let state = self.state();
        Ok(state
            .storage
            .by_added_time(time, op)
            .into_iter()
            .map(|stored| stored.container.to_json())
            .collect())
    }

    pub fn containers_by_next_destination(&self, destination: &str) -> Vec<Value> {
        let state = self.state();
        state
            .storage
            .by_next_destination(destination)
            .into_iter()
            .map(|stored| stored.container.to_json())
            .collect()
    }

    pub fn dequeue_containers_by_next_destination(&self, destination: &str) -> Vec<Value> {
        let mut state = self.state();
        let removed = state.storage.dequeue_by_next_destination(destination);
        debug!(
            terminal = %self.name,
            destination,
            count = removed.len(),
            "Dequeued containers by next destination"
        );
        removed
            .into_iter()
            .map(|stored| stored.container.to_json())
            .collect()
    }

    pub fn container_count(&self) -> usize {
        self.state().storage.len()
    }

    /// Remaining slots; `None` when capacity is unbounded.
    pub fn available_capacity(&self) -> Option<i64> {
        let state = self.state();
        state
            .config
            .max_capacity
            .map(|max| max - state.storage.len() as i64)
    }

    pub fn max_capacity(&self) -> Option<i64> {
        self.state().config.max_capacity
    }

    pub fn clear(&self) {
        debug!(terminal = %self.name, "Clearing all containers");
        self.state().storage.clear();
    }

    // ── Serialization ────────────────────────────────────────────────

    pub fn to_json(&self) -> Value {
        let state = self.state();

        let mut interfaces = Map::new();
        for (interface, modes) in &self.interfaces {
            let modes: Vec<Value> = modes.iter().map(|m| json!(*m as i64)).collect();
            interfaces.insert((*interface as i64).to_string(), Value::Array(modes));
        }

        let mut aliases = Map::new();
        for ((mode, network), alias) in &state.mode_network_aliases {
            aliases.insert(format!("{}:{network}", *mode as i64), json!(alias));
        }

        let mut parameters = Map::new();
        for (key, value) in &state.config.dwell_parameters {
            parameters.insert(key.clone(), json!(value));
        }

        json!({
            "terminal_name": self.name,
            "display_name": self.display_name,
            "interfaces": interfaces,
            "mode_network_aliases": aliases,
            "capacity": {
                "max_capacity": state.config.max_capacity,
                "critical_threshold": if state.config.critical_threshold < 0.0 {
                    Value::Null
                } else {
                    json!(state.config.critical_threshold)
                },
            },
            "dwell_time": {
                "method": state.config.dwell_method,
                "parameters": parameters,
            },
            "customs": {
                "probability": state.config.customs_probability,
                "delay_mean": state.config.customs_delay_mean,
                "delay_variance": state.config.customs_delay_variance,
            },
            "cost": {
                "fixed_fees": state.config.fixed_fees,
                "customs_fees": state.config.customs_fees,
                "risk_factor": state.config.risk_factor,
            },
            "container_count": state.storage.len(),
            "available_capacity": state
                .config
                .max_capacity
                .map(|max| max - state.storage.len() as i64),
        })
    }

    /// Rebuilds a terminal from its JSON form. Container contents are not
    /// part of the serialized form and start empty.
    pub fn from_json(value: &Value) -> SimResult<Self> {
        let obj = value.as_object().ok_or_else(|| {
            SimError::Persistence("Terminal JSON must be an object".into())
        })?;

        let name = obj
            .get("terminal_name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SimError::Persistence("Missing or invalid terminal_name in JSON".into())
            })?;
        let display_name = obj
            .get("display_name")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let mut interfaces: IndexMap<TerminalInterface, BTreeSet<TransportationMode>> =
            IndexMap::new();
        if let Some(map) = obj.get("interfaces").and_then(Value::as_object) {
            for (key, modes_value) in map {
                let interface = TerminalInterface::from_name(key)?;
                let mut modes = BTreeSet::new();
                for mode_value in modes_value.as_array().into_iter().flatten() {
                    modes.insert(TransportationMode::from_value(mode_value)?.concrete()?);
                }
                interfaces.insert(interface, modes);
            }
        }

        let config = TerminalConfig::from_value(value)?;
        let terminal = Terminal::new(name, display_name, interfaces, config)?;

        if let Some(map) = obj.get("mode_network_aliases").and_then(Value::as_object) {
            for (key, alias) in map {
                let Some((mode_part, network)) = key.split_once(':') else {
                    continue;
                };
                let Ok(mode) = TransportationMode::from_name(mode_part) else {
                    continue;
                };
                if let Some(alias) = alias.as_str() {
                    terminal.add_alias_for_mode_network(mode, network, alias);
                }
            }
        }

        Ok(terminal)
    }
}

/// Parses the three accepted container-collection JSON shapes.
fn parse_container_collection(value: &Value) -> SimResult<Vec<Container>> {
    let obj = value.as_object().ok_or_else(|| {
        SimError::InvalidArgs("Invalid JSON format for containers".into())
    })?;

    let mut containers = Vec::new();

    if let Some(Value::Array(items)) = obj.get("containers") {
        for item in items {
            if item.is_object() {
                containers.push(parse_container(item)?);
            }
        }
    } else if obj.contains_key("containerID") {
        containers.push(parse_container(value)?);
    } else {
        for entry in obj.values() {
            if entry.is_object() {
                containers.push(parse_container(entry)?);
            }
        }
    }

    Ok(containers)
}

fn parse_container(value: &Value) -> SimResult<Container> {
    serde_json::from_value(value.clone())
        .map_err(|e| SimError::InvalidArgs(format!("Invalid container JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truck_interfaces() -> IndexMap<TerminalInterface, BTreeSet<TransportationMode>> {
        let mut interfaces = IndexMap::new();
        interfaces.insert(
            TerminalInterface::LandSide,
            BTreeSet::from([TransportationMode::Truck]),
        );
        interfaces
    }

    fn capacity_config(max: i64, threshold: f64) -> TerminalConfig {
        TerminalConfig {
            max_capacity: Some(max),
            critical_threshold: threshold,
            ..TerminalConfig::default()
        }
    }

    fn gamma_config(shape: f64, scale: f64) -> TerminalConfig {
        let mut config = TerminalConfig::default();
        config.dwell_method = "gamma".into();
        config.dwell_parameters.insert("shape".into(), shape);
        config.dwell_parameters.insert("scale".into(), scale);
        config
    }

    #[test]
    fn rejects_empty_interfaces() {
        let result = Terminal::new("T", "T", IndexMap::new(), TerminalConfig::default());
        assert!(matches!(result, Err(SimError::InvalidArgs(_))));
    }

    #[test]
    fn can_accept_respects_interface_modes() {
        let terminal =
            Terminal::new("T", "T", truck_interfaces(), TerminalConfig::default()).unwrap();
        assert!(terminal.can_accept(TransportationMode::Truck, TerminalInterface::LandSide));
        assert!(!terminal.can_accept(TransportationMode::Ship, TerminalInterface::LandSide));
        assert!(!terminal.can_accept(TransportationMode::Truck, TerminalInterface::SeaSide));
    }

    #[test]
    fn unlimited_capacity_always_accepts() {
        let terminal =
            Terminal::new("T", "T", truck_interfaces(), TerminalConfig::default()).unwrap();
        let (ok, message) = terminal.check_capacity(1_000_000);
        assert!(ok);
        assert_eq!(message, "OK");
        assert_eq!(terminal.available_capacity(), None);
    }

    #[test]
    fn capacity_gate_matches_thresholds() {
        // max 10, critical at 5, warning at 4.5.
        let terminal =
            Terminal::new("T", "T", truck_interfaces(), capacity_config(10, 0.5)).unwrap();
        for i in 0..5 {
            terminal
                .add_container(Container::new(format!("c{i}")), None)
                .unwrap();
        }
        // Occupancy 5 == critical: warning territory, still accepted.
        let (ok, message) = terminal.check_capacity(1);
        assert!(ok);
        assert!(message.starts_with("Warning"), "{message}");
        terminal.add_container(Container::new("c5"), None).unwrap();
        // Occupancy 6 > critical 5: rejected.
        let (ok, message) = terminal.check_capacity(1);
        assert!(!ok);
        assert!(message.contains("critical threshold"), "{message}");
        // Overshooting max is reported as a max-capacity failure.
        let (ok, message) = terminal.check_capacity(20);
        assert!(!ok);
        assert!(message.contains("max capacity"), "{message}");
    }

    #[test]
    fn capacity_rejection_scenario() {
        // max_capacity 2, critical_threshold 0.5: critical = 1, warning = 0.9.
        let terminal =
            Terminal::new("T", "T", truck_interfaces(), capacity_config(2, 0.5)).unwrap();
        terminal.add_container(Container::new("c1"), None).unwrap();
        // Second add sees occupancy 1 > warning 0.9 and is accepted with a
        // warning.
        let (ok, message) = terminal.check_capacity(1);
        assert!(ok);
        assert!(message.starts_with("Warning"), "{message}");
        terminal.add_container(Container::new("c2"), None).unwrap();
        // Third would exceed max capacity.
        let err = terminal
            .add_container(Container::new("c3"), None)
            .unwrap_err();
        assert!(matches!(err, SimError::CapacityExceeded(_)));
        assert_eq!(terminal.container_count(), 2);
        assert_eq!(terminal.available_capacity(), Some(0));
    }

    #[test]
    fn unspecified_adding_time_suppresses_stochastic_steps() {
        let mut config = gamma_config(2.0, 3600.0);
        config.customs_probability = 1.0;
        config.customs_delay_mean = 24.0;
        let terminal = Terminal::new("T", "T", truck_interfaces(), config).unwrap();

        terminal.add_container(Container::new("c1"), None).unwrap();
        // Departure stays at zero, so nothing departs after time zero.
        assert_eq!(
            terminal.containers_by_departing_time(0.0, ">").unwrap().len(),
            0
        );
        assert_eq!(
            terminal.containers_by_departing_time(0.0, "==").unwrap().len(),
            1
        );
    }

    #[test]
    fn departure_time_query_scenario() {
        let terminal =
            Terminal::new("T", "T", truck_interfaces(), gamma_config(2.0, 3600.0)).unwrap();
        terminal.add_container(Container::new("c1"), Some(0.0)).unwrap();
        terminal.add_container(Container::new("c2"), Some(0.0)).unwrap();

        let after = terminal.containers_by_departing_time(0.0, ">").unwrap();
        assert_eq!(after.len(), 2);
        let before = terminal.containers_by_departing_time(0.0, "<").unwrap();
        assert!(before.is_empty());
    }

    #[test]
    fn invalid_condition_is_rejected() {
        let terminal =
            Terminal::new("T", "T", truck_interfaces(), TerminalConfig::default()).unwrap();
        assert!(terminal.containers_by_departing_time(0.0, "~").is_err());
    }

    #[test]
    fn cost_accumulates_into_custom_variables() {
        let mut config = TerminalConfig::default();
        config.fixed_fees = 100.0;
        config.risk_factor = 0.01;
        let terminal = Terminal::new("T", "T", truck_interfaces(), config).unwrap();

        let mut container = Container::new("c1");
        container.set_custom_variable("dollar_value", json!("5000"));
        container.set_custom_variable("cost", json!(25.0));
        terminal.add_container(container, Some(0.0)).unwrap();

        let stored = terminal.containers_by_departing_time(0.0, ">=").unwrap();
        let cost = stored[0]["customVariables"]["cost"].as_f64().unwrap();
        // 25 previous + 100 fixed + 5000 * 0.01 risk.
        assert!((cost - 175.0).abs() < 1e-9);
        assert_eq!(
            stored[0]["containerCurrentLocation"].as_str().unwrap(),
            "T"
        );
    }

    #[test]
    fn estimate_handling_time_includes_expected_customs() {
        let mut config = TerminalConfig::default();
        config.customs_probability = 0.5;
        config.customs_delay_mean = 10.0;
        let terminal = Terminal::new("T", "T", truck_interfaces(), config).unwrap();
        // No dwell parameters: only the expected customs term remains.
        assert!((terminal.estimate_handling_time().unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn container_json_forms() {
        let terminal =
            Terminal::new("T", "T", truck_interfaces(), TerminalConfig::default()).unwrap();

        terminal
            .add_containers_from_json(
                &json!({"containers": [{"containerID": "a"}, {"containerID": "b"}]}),
                None,
            )
            .unwrap();
        terminal
            .add_containers_from_json(&json!({"containerID": "c"}), None)
            .unwrap();
        terminal
            .add_containers_from_json(
                &json!({"d": {"containerID": "d"}, "e": {"containerID": "e"}}),
                None,
            )
            .unwrap();
        assert_eq!(terminal.container_count(), 5);
    }

    #[test]
    fn dequeue_by_destination() {
        let terminal =
            Terminal::new("T", "T", truck_interfaces(), TerminalConfig::default()).unwrap();
        let mut bound = Container::new("c1");
        bound.next_destination = Some("B".into());
        terminal.add_container(bound, None).unwrap();
        terminal.add_container(Container::new("c2"), None).unwrap();

        assert_eq!(terminal.containers_by_next_destination("B").len(), 1);
        let removed = terminal.dequeue_containers_by_next_destination("B");
        assert_eq!(removed.len(), 1);
        assert_eq!(terminal.container_count(), 1);
        assert!(terminal.containers_by_next_destination("B").is_empty());
    }

    #[test]
    fn json_roundtrip_preserves_configuration() {
        let mut config = capacity_config(1000, 0.8);
        config.dwell_method = "gamma".into();
        config.dwell_parameters.insert("shape".into(), 2.0);
        config.dwell_parameters.insert("scale".into(), 86400.0);
        config.customs_probability = 0.1;
        config.customs_delay_mean = 24.0;
        config.customs_delay_variance = 6.0;
        config.fixed_fees = 100.0;
        config.customs_fees = 50.0;
        config.risk_factor = 0.01;

        let mut interfaces = truck_interfaces();
        interfaces.insert(
            TerminalInterface::SeaSide,
            BTreeSet::from([TransportationMode::Ship]),
        );
        let terminal = Terminal::new("Port1", "Port One", interfaces, config).unwrap();
        terminal.add_alias_for_mode_network(TransportationMode::Truck, "road-net", "P1");

        let encoded = terminal.to_json();
        assert_eq!(encoded["terminal_name"], "Port1");
        assert_eq!(encoded["capacity"]["max_capacity"], 1000);
        assert_eq!(encoded["container_count"], 0);
        assert_eq!(encoded["mode_network_aliases"]["0:road-net"], "P1");

        let restored = Terminal::from_json(&encoded).unwrap();
        assert_eq!(restored.name(), "Port1");
        assert_eq!(restored.display_name(), "Port One");
        assert_eq!(restored.max_capacity(), Some(1000));
        assert!(restored.can_accept(TransportationMode::Ship, TerminalInterface::SeaSide));
        assert_eq!(
            restored
                .alias_for_mode_network(TransportationMode::Truck, "road-net")
                .as_deref(),
            Some("P1")
        );
        // Round-trip stability of the serialized form.
        assert_eq!(restored.to_json(), encoded);
    }

    #[test]
    fn unlimited_terminal_serializes_null_capacity() {
        let terminal =
            Terminal::new("T", "T", truck_interfaces(), TerminalConfig::default()).unwrap();
        let encoded = terminal.to_json();
        assert!(encoded["capacity"]["max_capacity"].is_null());
        assert!(encoded["available_capacity"].is_null());
    }
}
