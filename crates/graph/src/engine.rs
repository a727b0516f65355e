//! The terminal-graph engine: terminals, aliases, regions, routes, and the
//! path-finding entry points.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use termsim_core::{
    merge_attrs, parse_interface_map, AttrMap, SimError, SimResult, TerminalInterface,
    TransportationMode,
};
use termsim_terminal::{Terminal, TerminalConfig};

use crate::cost::{default_link_attributes, CostWeights};
use crate::edge::{EdgeKey, EdgeRecord};
use crate::path::{Path, PathSegment};
use crate::search::{shortest_path, Exclusions, SearchSnapshot, TermInfoCache};
use crate::top_paths::find_top_n;

pub(crate) struct GraphState {
    pub adjacency: IndexMap<String, Vec<EdgeRecord>>,
    pub edge_keys: BTreeSet<EdgeKey>,
    pub node_attributes: IndexMap<String, AttrMap>,
    /// Any known name (canonical included) → canonical name.
    pub aliases: IndexMap<String, String>,
    pub canonical_to_aliases: IndexMap<String, BTreeSet<String>>,
    pub terminals: IndexMap<String, Arc<Terminal>>,
    pub cost_weights: CostWeights,
    pub default_link_attributes: AttrMap,
}

impl GraphState {
    pub(crate) fn empty() -> Self {
        Self {
            adjacency: IndexMap::new(),
            edge_keys: BTreeSet::new(),
            node_attributes: IndexMap::new(),
            aliases: IndexMap::new(),
            canonical_to_aliases: IndexMap::new(),
            terminals: IndexMap::new(),
            cost_weights: CostWeights::default(),
            default_link_attributes: default_link_attributes(),
        }
    }

    pub(crate) fn canonical(&self, name: &str) -> String {
        self.aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn region_of(&self, node: &str) -> Option<&str> {
        self.node_attributes
            .get(node)
            .and_then(|attrs| attrs.get("region"))
            .and_then(Value::as_str)
    }

    fn insert_terminal(
        &mut self,
        names: &[String],
        terminal: Arc<Terminal>,
        region: Option<&str>,
    ) {
        let canonical = terminal.name().to_string();
        self.adjacency.entry(canonical.clone()).or_default();
        if let Some(region) = region {
            if !region.is_empty() {
                self.node_attributes
                    .entry(canonical.clone())
                    .or_default()
                    .insert("region".into(), json!(region));
            }
        }
        self.terminals.insert(canonical.clone(), terminal);
        self.canonical_to_aliases
            .insert(canonical.clone(), names.iter().cloned().collect());
        for name in names {
            self.aliases.insert(name.clone(), canonical.clone());
        }
    }

    /// Inserts or replaces the edge for `(from, to, mode)`.
    pub(crate) fn upsert_edge(
        &mut self,
        from: &str,
        to: &str,
        route_id: &str,
        mode: TransportationMode,
        attributes: AttrMap,
    ) {
        let edges = self.adjacency.entry(from.to_string()).or_default();
        if let Some(existing) = edges
            .iter_mut()
            .find(|edge| edge.to == to && edge.mode == mode)
        {
            existing.route_id = route_id.to_string();
            existing.attributes = attributes;
            return;
        }
        edges.push(EdgeRecord {
            to: to.to_string(),
            route_id: route_id.to_string(),
            mode,
            attributes,
        });
        self.edge_keys.insert(EdgeKey::new(from, to, mode));
    }
}

/// Thread-safe in-memory terminal graph.
///
/// One lock guards the graph structure; each terminal carries its own lock.
/// Engine methods never call into a terminal while holding the graph lock —
/// they snapshot the `Arc` handles first.
pub struct TerminalGraph {
    state: Mutex<GraphState>,
    terminals_dir: Option<PathBuf>,
}

impl TerminalGraph {
    pub fn new(terminals_dir: Option<PathBuf>) -> Self {
        info!(
            dir = %terminals_dir.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| "None".into()),
            "Graph initialized"
        );
        Self {
            state: Mutex::new(GraphState::empty()),
            terminals_dir,
        }
    }

    pub fn terminals_directory(&self) -> Option<&PathBuf> {
        self.terminals_dir.as_ref()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, GraphState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn replace_state(&self, new_state: GraphState) {
        *self.lock() = new_state;
    }

    // ── Engine configuration ─────────────────────────────────────────

    pub fn set_link_default_attributes(&self, attrs: AttrMap) {
        self.lock().default_link_attributes = attrs;
    }

    pub fn set_cost_function_parameters(&self, params: &Value) {
        self.lock().cost_weights = CostWeights::from_value(params);
    }

    // ── Terminal management ──────────────────────────────────────────

    /// Adds a terminal; the first name is canonical, the rest are aliases.
    /// Every name must be unused.
    pub fn add_terminal(
        &self,
        names: &[String],
        display_name: &str,
        config: &Value,
        interfaces: IndexMap<TerminalInterface, BTreeSet<TransportationMode>>,
        region: Option<&str>,
    ) -> SimResult<Arc<Terminal>> {
        let mut state = self.lock();

        let canonical = names
            .first()
            .ok_or_else(|| SimError::InvalidArgs("No terminal names provided".into()))?;
        for name in names {
            if state.aliases.contains_key(name) {
                return Err(SimError::NameConflict(format!(
                    "Terminal name already in use: {name}"
                )));
            }
        }

        let terminal = Arc::new(Terminal::new(
            canonical.clone(),
            display_name,
            interfaces,
            TerminalConfig::from_value(config)?,
        )?);
        state.insert_terminal(names, terminal.clone(), region);

        debug!(terminal = %canonical, aliases = names.len() - 1, "Added terminal");
        Ok(terminal)
    }

    /// Batch form with all-or-nothing semantics: every entry is validated
    /// (required fields, non-empty names, no duplicates within the batch or
    /// against existing names) before any terminal is created.
    pub fn add_terminals(&self, terminals: &[Value]) -> SimResult<Vec<String>> {
        struct ParsedEntry {
            names: Vec<String>,
            display_name: String,
            interfaces: IndexMap<TerminalInterface, BTreeSet<TransportationMode>>,
            config: Value,
            region: Option<String>,
        }

        let mut state = self.lock();
        let mut entries = Vec::with_capacity(terminals.len());
        let mut batch_names: HashSet<String> = HashSet::new();

        for entry in terminals {
            let obj = entry.as_object().ok_or_else(|| {
                SimError::InvalidArgs("Terminal entry must be a JSON object".into())
            })?;
            for field in ["terminal_names", "display_name", "terminal_interfaces", "custom_config"]
            {
                if !obj.contains_key(field) {
                    return Err(SimError::InvalidArgs(format!(
                        "Missing required field for terminal: {field}"
                    )));
                }
            }

            let names = parse_name_list(&obj["terminal_names"])?;
            for name in &names {
                if state.aliases.contains_key(name) || !batch_names.insert(name.clone()) {
                    return Err(SimError::NameConflict(format!(
                        "Duplicate terminal name: {name}"
                    )));
                }
            }

            let interfaces = parse_interface_map(&obj["terminal_interfaces"])?;
            if interfaces.is_empty() {
                return Err(SimError::InvalidArgs(
                    "At least one terminal interface with modes must be provided".into(),
                ));
            }

            entries.push(ParsedEntry {
                names,
                display_name: obj["display_name"].as_str().unwrap_or_default().to_string(),
                interfaces,
                config: obj["custom_config"].clone(),
                region: obj.get("region").and_then(Value::as_str).map(str::to_string),
            });
        }

        let mut added = Vec::with_capacity(entries.len());
        for entry in entries {
            let canonical = entry.names[0].clone();
            let terminal = Arc::new(Terminal::new(
                canonical.clone(),
                entry.display_name,
                entry.interfaces,
                TerminalConfig::from_value(&entry.config)?,
            )?);
            state.insert_terminal(&entry.names, terminal, entry.region.as_deref());
            debug!(terminal = %canonical, "Added terminal");
            added.push(canonical);
        }
        Ok(added)
    }

    /// Adds `alias` to the terminal known as `name` (canonical or alias).
    pub fn add_alias_to_terminal(&self, name: &str, alias: &str) -> SimResult<()> {
        let mut state = self.lock();
        let canonical = state.canonical(name);
        if !state.terminals.contains_key(&canonical) {
            return Err(SimError::NotFound(format!("Terminal not found: {name}")));
        }
        if state.aliases.contains_key(alias) {
            return Err(SimError::NameConflict(format!(
                "Alias already in use: {alias}"
            )));
        }
        state.aliases.insert(alias.to_string(), canonical.clone());
        state
            .canonical_to_aliases
            .entry(canonical.clone())
            .or_default()
            .insert(alias.to_string());
        debug!(alias, terminal = %canonical, "Added alias");
        Ok(())
    }

    /// All known names of a terminal (canonical included), sorted. Unknown
    /// names yield an empty list.
    pub fn get_aliases_of_terminal(&self, name: &str) -> Vec<String> {
        let state = self.lock();
        let canonical = state.canonical(name);
        state
            .canonical_to_aliases
            .get(&canonical)
            .map(|aliases| aliases.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Removes a terminal, every incident edge in both directions, and all
    /// of its aliases. Returns false when the terminal does not exist.
    pub fn remove_terminal(&self, name: &str) -> bool {
        let mut state = self.lock();
        let canonical = state.canonical(name);
        if !state.terminals.contains_key(&canonical) {
            return false;
        }

        if let Some(aliases) = state.canonical_to_aliases.shift_remove(&canonical) {
            for alias in aliases {
                state.aliases.shift_remove(&alias);
            }
        }
        state.terminals.shift_remove(&canonical);
        state.node_attributes.shift_remove(&canonical);

        state.adjacency.shift_remove(&canonical);
        for edges in state.adjacency.values_mut() {
            edges.retain(|edge| edge.to != canonical);
        }
        state
            .edge_keys
            .retain(|key| key.from != canonical && key.to != canonical);

        debug!(terminal = %canonical, "Removed terminal");
        true
    }

    pub fn get_terminal(&self, name: &str) -> SimResult<Arc<Terminal>> {
        let state = self.lock();
        let canonical = state.canonical(name);
        state
            .terminals
            .get(&canonical)
            .cloned()
            .ok_or_else(|| SimError::NotFound(format!("Terminal not found: {name}")))
    }

    pub fn terminal_exists(&self, name: &str) -> bool {
        let state = self.lock();
        let canonical = state.canonical(name);
        state.terminals.contains_key(&canonical)
    }

    pub fn get_terminal_count(&self) -> usize {
        self.lock().terminals.len()
    }

    /// Canonical name → alias list; alias lists are empty when
    /// `include_aliases` is false.
    pub fn get_all_terminal_names(&self, include_aliases: bool) -> IndexMap<String, Vec<String>> {
        let state = self.lock();
        state
            .terminals
            .keys()
            .map(|canonical| {
                let aliases = if include_aliases {
                    state
                        .canonical_to_aliases
                        .get(canonical)
                        .map(|set| set.iter().cloned().collect())
                        .unwrap_or_default()
                } else {
                    Vec::new()
                };
                (canonical.clone(), aliases)
            })
            .collect()
    }

    /// Status of one or all terminals. Terminal handles are snapshotted
    /// under the graph lock and queried after it is released.
    pub fn get_terminal_status(&self, name: Option<&str>) -> SimResult<Value> {
        let snapshot: Vec<(String, Arc<Terminal>, Option<String>, Vec<String>)> = {
            let state = self.lock();
            let selected: Vec<String> = match name {
                Some(name) if !name.is_empty() => {
                    let canonical = state.canonical(name);
                    if !state.terminals.contains_key(&canonical) {
                        return Err(SimError::NotFound(format!("Terminal not found: {name}")));
                    }
                    vec![canonical]
                }
                _ => state.terminals.keys().cloned().collect(),
            };
            selected
                .into_iter()
                .map(|canonical| {
                    let terminal = state.terminals[&canonical].clone();
                    let region = state.region_of(&canonical).map(str::to_string);
                    let aliases = state
                        .canonical_to_aliases
                        .get(&canonical)
                        .map(|set| set.iter().cloned().collect())
                        .unwrap_or_default();
                    (canonical, terminal, region, aliases)
                })
                .collect()
        };

        let status_of = |terminal: &Terminal, region: &Option<String>, aliases: &[String]| {
            json!({
                "container_count": terminal.container_count(),
                "available_capacity": terminal.available_capacity(),
                "max_capacity": terminal.max_capacity(),
                "region": region,
                "aliases": aliases,
            })
        };

        if name.is_some_and(|n| !n.is_empty()) {
            let (_, terminal, region, aliases) = &snapshot[0];
            Ok(status_of(terminal, region, aliases))
        } else {
            let mut result = Map::new();
            for (canonical, terminal, region, aliases) in &snapshot {
                result.insert(canonical.clone(), status_of(terminal, region, aliases));
            }
            Ok(Value::Object(result))
        }
    }

    /// Drops every terminal and resets the graph to its initial state.
    pub fn clear(&self) {
        let mut state = self.lock();
        let weights = state.cost_weights.clone();
        let defaults = state.default_link_attributes.clone();
        *state = GraphState::empty();
        state.cost_weights = weights;
        state.default_link_attributes = defaults;
        debug!("Graph cleared");
    }

    // ── Route management ─────────────────────────────────────────────

    /// Adds (or overwrites) the route `(start, end, mode)`. Attributes are
    /// the engine defaults overlaid with `attrs`.
    pub fn add_route(
        &self,
        route_id: &str,
        start: &str,
        end: &str,
        mode: TransportationMode,
        attrs: Option<&AttrMap>,
    ) -> SimResult<(String, String)> {
        let mode = mode.concrete()?;
        let mut state = self.lock();
        let start_canonical = state.canonical(start);
        let end_canonical = state.canonical(end);
        if !state.terminals.contains_key(&start_canonical)
            || !state.terminals.contains_key(&end_canonical)
        {
            return Err(SimError::NotFound("Terminal not found".into()));
        }

        let merged = match attrs {
            Some(attrs) => merge_attrs(&state.default_link_attributes, attrs),
            None => state.default_link_attributes.clone(),
        };
        state.upsert_edge(&start_canonical, &end_canonical, route_id, mode, merged);
        debug!(route = route_id, from = %start_canonical, to = %end_canonical, "Added route");
        Ok((start_canonical, end_canonical))
    }

    /// Batch form: validates every entry before adding any route.
    pub fn add_routes(&self, routes: &[Value]) -> SimResult<Vec<(String, String)>> {
        let mut state = self.lock();

        let mut parsed = Vec::with_capacity(routes.len());
        for route in routes {
            let obj = route.as_object().ok_or_else(|| {
                SimError::InvalidArgs("Route entry must be a JSON object".into())
            })?;
            for field in ["route_id", "start_terminal", "end_terminal", "mode"] {
                if !obj.contains_key(field) {
                    return Err(SimError::InvalidArgs(format!(
                        "Missing required field for route: {field}"
                    )));
                }
            }
            let route_id = obj["route_id"].as_str().unwrap_or_default().to_string();
            let start = obj["start_terminal"].as_str().unwrap_or_default();
            let end = obj["end_terminal"].as_str().unwrap_or_default();
            let mode = TransportationMode::from_value(&obj["mode"])?.concrete()?;

            let start_canonical = state.canonical(start);
            let end_canonical = state.canonical(end);
            if !state.terminals.contains_key(&start_canonical)
                || !state.terminals.contains_key(&end_canonical)
            {
                return Err(SimError::NotFound(format!(
                    "Terminal not found for route ID: {route_id}"
                )));
            }

            let attrs = match obj.get("attributes") {
                Some(Value::Object(map)) => {
                    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                }
                _ => AttrMap::new(),
            };
            parsed.push((route_id, start_canonical, end_canonical, mode, attrs));
        }

        let mut added = Vec::with_capacity(parsed.len());
        for (route_id, start, end, mode, attrs) in parsed {
            let merged = merge_attrs(&state.default_link_attributes, &attrs);
            state.upsert_edge(&start, &end, &route_id, mode, merged);
            debug!(route = %route_id, from = %start, to = %end, "Added route");
            added.push((start, end));
        }
        Ok(added)
    }

    /// Merges `attrs` into the existing edge's attributes.
    pub fn change_route_weight(
        &self,
        start: &str,
        end: &str,
        mode: TransportationMode,
        attrs: &AttrMap,
    ) -> SimResult<()> {
        let mut state = self.lock();
        let start_canonical = state.canonical(start);
        let end_canonical = state.canonical(end);
        if !state.terminals.contains_key(&start_canonical)
            || !state.terminals.contains_key(&end_canonical)
        {
            return Err(SimError::NotFound("Terminal not found".into()));
        }

        let edge = state
            .adjacency
            .get_mut(&start_canonical)
            .and_then(|edges| {
                edges
                    .iter_mut()
                    .find(|edge| edge.to == end_canonical && edge.mode == mode)
            })
            .ok_or_else(|| SimError::NotFound("Route not found".into()))?;
        for (key, value) in attrs {
            edge.attributes.insert(key.clone(), value.clone());
        }
        debug!(from = %start_canonical, to = %end_canonical, "Updated route weight");
        Ok(())
    }

    /// Attribute map of the `(start, end, mode)` edge plus `mode` and
    /// `route_id`; empty when the edge or either terminal is absent.
    pub fn get_edge_by_mode(&self, start: &str, end: &str, mode: TransportationMode) -> AttrMap {
        let state = self.lock();
        let start_canonical = state.canonical(start);
        let end_canonical = state.canonical(end);
        if !state.terminals.contains_key(&start_canonical)
            || !state.terminals.contains_key(&end_canonical)
        {
            return AttrMap::new();
        }

        let Some(edge) = state.adjacency.get(&start_canonical).and_then(|edges| {
            edges
                .iter()
                .find(|edge| edge.to == end_canonical && edge.mode == mode)
        }) else {
            return AttrMap::new();
        };

        let mut result = edge.attributes.clone();
        result.insert("mode".into(), json!(edge.mode as i64));
        result.insert("route_id".into(), json!(edge.route_id));
        result
    }

    // ── Region operations ────────────────────────────────────────────

    pub fn get_terminals_by_region(&self, region: &str) -> Vec<String> {
        let state = self.lock();
        state
            .adjacency
            .keys()
            .filter(|node| state.region_of(node) == Some(region))
            .cloned()
            .collect()
    }

    /// Directed edges from region-a terminals to region-b terminals,
    /// self-loops excluded.
    pub fn get_routes_between_regions(&self, region_a: &str, region_b: &str) -> Vec<Value> {
        let state = self.lock();
        let terminals_a: Vec<&String> = state
            .adjacency
            .keys()
            .filter(|node| state.region_of(node) == Some(region_a))
            .collect();
        let terminals_b: HashSet<&String> = state
            .adjacency
            .keys()
            .filter(|node| state.region_of(node) == Some(region_b))
            .collect();

        let mut routes = Vec::new();
        for term_a in terminals_a {
            let Some(edges) = state.adjacency.get(term_a) else {
                continue;
            };
            for edge in edges {
                if edge.to == *term_a || !terminals_b.contains(&edge.to) {
                    continue;
                }
                routes.push(json!({
                    "start": term_a,
                    "end": edge.to,
                    "route_id": edge.route_id,
                    "mode": edge.mode as i64,
                    "attributes": edge.attributes,
                }));
            }
        }
        debug!(
            count = routes.len(),
            region_a, region_b, "Found routes between regions"
        );
        routes
    }

    // ── Auto-wiring ──────────────────────────────────────────────────

    /// For every unordered terminal pair and every interface both sides
    /// share, adds bidirectional routes per common mode.
    pub fn connect_terminals_by_interface_modes(&self) -> SimResult<()> {
        let planned = {
            let state = self.lock();
            let terminals: Vec<Arc<Terminal>> = state.terminals.values().cloned().collect();
            let mut planned: Vec<(String, String, String, TransportationMode)> = Vec::new();
            let mut counter = 0usize;

            for i in 0..terminals.len() {
                for j in (i + 1)..terminals.len() {
                    let term_a = &terminals[i];
                    let term_b = &terminals[j];
                    for (interface, modes_a) in term_a.interfaces() {
                        let Some(modes_b) = term_b.interfaces().get(interface) else {
                            continue;
                        };
                        for mode in modes_a.intersection(modes_b) {
                            counter += 1;
                            planned.push((
                                format!("auto_{counter}"),
                                term_a.name().to_string(),
                                term_b.name().to_string(),
                                *mode,
                            ));
                            counter += 1;
                            planned.push((
                                format!("auto_{counter}"),
                                term_b.name().to_string(),
                                term_a.name().to_string(),
                                *mode,
                            ));
                        }
                    }
                }
            }
            planned
        };

        let count = planned.len();
        for (route_id, from, to, mode) in planned {
            self.add_route(&route_id, &from, &to, mode, None)?;
        }
        debug!(count, "Connected terminals by interface modes");
        Ok(())
    }

    /// Bidirectionally connects every pair of distinct terminals within
    /// `region` per shared mode (union over interfaces).
    pub fn connect_terminals_in_region_by_mode(&self, region: &str) -> SimResult<()> {
        let planned = {
            let state = self.lock();
            let members: Vec<Arc<Terminal>> = state
                .adjacency
                .keys()
                .filter(|node| state.region_of(node) == Some(region))
                .filter_map(|node| state.terminals.get(node).cloned())
                .collect();
            if members.len() < 2 {
                return Err(SimError::InvalidArgs(format!(
                    "Too few terminals in region: {region}"
                )));
            }

            let mut planned: Vec<(String, String, String, TransportationMode)> = Vec::new();
            let mut counter = 0usize;
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    let term_a = &members[i];
                    let term_b = &members[j];
                    let shared: Vec<TransportationMode> = term_a
                        .supported_modes()
                        .intersection(&term_b.supported_modes())
                        .copied()
                        .collect();
                    for mode in &shared {
                        counter += 1;
                        planned.push((
                            format!("region_{region}_{counter}"),
                            term_a.name().to_string(),
                            term_b.name().to_string(),
                            *mode,
                        ));
                    }
                    for mode in &shared {
                        counter += 1;
                        planned.push((
                            format!("region_{region}_{counter}"),
                            term_b.name().to_string(),
                            term_a.name().to_string(),
                            *mode,
                        ));
                    }
                }
            }
            planned
        };

        let count = planned.len();
        for (route_id, from, to, mode) in planned {
            self.add_route(&route_id, &from, &to, mode, None)?;
        }
        debug!(region, count, "Connected region terminals");
        Ok(())
    }

    /// Connects every ordered pair of terminals in different regions that
    /// both support `mode`.
    pub fn connect_regions_by_mode(&self, mode: TransportationMode) -> SimResult<()> {
        let mode = mode.concrete()?;
        let planned = {
            let state = self.lock();
            let supporting: Vec<(String, Option<String>)> = state
                .terminals
                .iter()
                .filter(|(_, terminal)| terminal.supported_modes().contains(&mode))
                .map(|(name, _)| (name.clone(), state.region_of(name).map(str::to_string)))
                .collect();

            let mut planned: Vec<(String, String, String)> = Vec::new();
            let mut counter = 0usize;
            for (i, (term_a, region_a)) in supporting.iter().enumerate() {
                let Some(region_a) = region_a else { continue };
                for (j, (term_b, region_b)) in supporting.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let Some(region_b) = region_b else { continue };
                    if region_a == region_b {
                        continue;
                    }
                    counter += 1;
                    planned.push((
                        format!("inter_region_route_{counter}"),
                        term_a.clone(),
                        term_b.clone(),
                    ));
                }
            }
            planned
        };

        let count = planned.len();
        for (route_id, from, to) in planned {
            self.add_route(&route_id, &from, &to, mode, None)?;
        }
        debug!(%mode, count, "Connected regions by mode");
        Ok(())
    }

    // ── Path finding ─────────────────────────────────────────────────

    /// Snapshot of the graph plus the canonical forms of `names`, taken in
    /// one critical section.
    fn snapshot(&self, names: &[&str]) -> (SearchSnapshot, Vec<String>) {
        let state = self.lock();
        let canonicals = names.iter().map(|name| state.canonical(name)).collect();
        let regions = state
            .adjacency
            .keys()
            .filter_map(|node| {
                state
                    .region_of(node)
                    .map(|region| (node.clone(), region.to_string()))
            })
            .collect();
        let snapshot = SearchSnapshot {
            adjacency: state.adjacency.clone(),
            regions,
            terminals: state.terminals.clone(),
            weights: state.cost_weights.clone(),
        };
        (snapshot, canonicals)
    }

    /// Mode-filtered shortest path (Dijkstra).
    pub fn find_shortest_path(
        &self,
        start: &str,
        end: &str,
        mode: TransportationMode,
    ) -> SimResult<Vec<PathSegment>> {
        let (snapshot, canonicals) = self.snapshot(&[start, end]);
        let mut cache = TermInfoCache::default();
        shortest_path(
            &snapshot,
            &canonicals[0],
            &canonicals[1],
            mode,
            &Exclusions::default(),
            None,
            &mut cache,
        )
    }

    /// Shortest path restricted to the allowed regions (nodes without a
    /// region tag pass the filter).
    pub fn find_shortest_path_within_regions(
        &self,
        start: &str,
        end: &str,
        regions: &[String],
        mode: TransportationMode,
    ) -> SimResult<Vec<PathSegment>> {
        let (snapshot, canonicals) = self.snapshot(&[start, end]);
        let mut cache = TermInfoCache::default();
        shortest_path(
            &snapshot,
            &canonicals[0],
            &canonicals[1],
            mode,
            &Exclusions::default(),
            Some(regions),
            &mut cache,
        )
    }

    /// Shortest path avoiding the given edges and nodes. An edge triple
    /// with mode `Any` excludes every mode on that node pair.
    pub fn find_shortest_path_with_exclusions(
        &self,
        start: &str,
        end: &str,
        mode: TransportationMode,
        edges_to_exclude: &BTreeSet<EdgeKey>,
        nodes_to_exclude: &BTreeSet<String>,
    ) -> SimResult<Vec<PathSegment>> {
        let (snapshot, canonicals) = self.snapshot(&[start, end]);
        let exclusions = Exclusions {
            edges: edges_to_exclude.clone(),
            nodes: nodes_to_exclude.clone(),
        };
        let mut cache = TermInfoCache::default();
        shortest_path(
            &snapshot,
            &canonicals[0],
            &canonicals[1],
            mode,
            &exclusions,
            None,
            &mut cache,
        )
    }

    /// Top-N structurally diverse paths, cheapest first. Unknown endpoints
    /// yield an empty list.
    pub fn find_top_n_shortest_paths(
        &self,
        start: &str,
        end: &str,
        n: usize,
        mode: TransportationMode,
        skip_delays: bool,
    ) -> SimResult<Vec<Path>> {
        let (snapshot, canonicals) = self.snapshot(&[start, end]);
        if !snapshot.terminals.contains_key(&canonicals[0])
            || !snapshot.terminals.contains_key(&canonicals[1])
        {
            warn!(start, end, "Terminal not found for top-N path search");
            return Ok(Vec::new());
        }
        find_top_n(&snapshot, &canonicals[0], &canonicals[1], n, mode, skip_delays)
    }
}

/// `terminal_names` accepts a single string or a list of strings.
pub fn parse_name_list(value: &Value) -> SimResult<Vec<String>> {
    let names: Vec<String> = match value {
        Value::String(name) => vec![name.clone()],
        Value::Array(items) => {
            let mut names = Vec::with_capacity(items.len());
            for item in items {
                let name = item.as_str().ok_or_else(|| {
                    SimError::InvalidArgs(
                        "terminal_names must be a string or list of strings".into(),
                    )
                })?;
                names.push(name.to_string());
            }
            names
        }
        _ => {
            return Err(SimError::InvalidArgs(
                "terminal_names must be a string or list of strings".into(),
            ))
        }
    };
    if names.is_empty() {
        return Err(SimError::InvalidArgs(
            "At least one terminal name must be provided".into(),
        ));
    }
    Ok(names)
}
