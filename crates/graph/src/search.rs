//! Dijkstra search over a consistent snapshot of the graph.
//!
//! Path finding never runs under the engine lock: the engine clones the
//! adjacency structure, node regions, terminal handles, and cost weights
//! into a [`SearchSnapshot`] and releases the lock before computing.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::json;

use termsim_core::{AttrMap, SimError, SimResult, TransportationMode};
use termsim_terminal::Terminal;

use crate::cost::CostWeights;
use crate::edge::{EdgeKey, EdgeRecord};
use crate::path::PathSegment;

/// Immutable view of the graph taken under the engine lock.
pub(crate) struct SearchSnapshot {
    pub adjacency: IndexMap<String, Vec<EdgeRecord>>,
    pub regions: IndexMap<String, String>,
    pub terminals: IndexMap<String, Arc<Terminal>>,
    pub weights: CostWeights,
}

/// Cached handling time and cost per terminal, one draw per search.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TermInfo {
    pub handling_time: f64,
    pub cost: f64,
}

#[derive(Default)]
pub(crate) struct TermInfoCache {
    cache: HashMap<String, TermInfo>,
}

impl TermInfoCache {
    pub fn get(&mut self, snapshot: &SearchSnapshot, name: &str) -> SimResult<TermInfo> {
        if let Some(info) = self.cache.get(name) {
            return Ok(*info);
        }
        let terminal = snapshot
            .terminals
            .get(name)
            .ok_or_else(|| SimError::NotFound(format!("Terminal not found: {name}")))?;
        let info = TermInfo {
            handling_time: terminal.estimate_handling_time()?,
            cost: terminal.estimate_container_cost(None, false),
        };
        self.cache.insert(name.to_string(), info);
        Ok(info)
    }
}

/// Edge/node exclusions for alternative-path searches. An edge triple with
/// mode `Any` masks every mode on that node pair.
#[derive(Debug, Default, Clone)]
pub(crate) struct Exclusions {
    pub edges: BTreeSet<EdgeKey>,
    pub nodes: BTreeSet<String>,
}

impl Exclusions {
    fn excludes_edge(&self, from: &str, to: &str, mode: TransportationMode) -> bool {
        self.edges.contains(&EdgeKey::new(from, to, mode))
            || self
                .edges
                .contains(&EdgeKey::new(from, to, TransportationMode::Any))
    }
}

/// Heap entry ordered by distance, then node name for deterministic pops.
#[derive(Debug, PartialEq)]
struct HeapEntry {
    dist: f64,
    node: String,
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Augments edge attributes with the endpoint terminals' handling time and
/// cost, then applies the cost function.
pub(crate) fn augmented_edge_cost(
    snapshot: &SearchSnapshot,
    cache: &mut TermInfoCache,
    from: &str,
    edge: &EdgeRecord,
) -> SimResult<f64> {
    let from_info = cache.get(snapshot, from)?;
    let to_info = cache.get(snapshot, &edge.to)?;

    let mut params = edge.attributes.clone();
    params.insert(
        "terminal_delay".into(),
        json!(from_info.handling_time + to_info.handling_time),
    );
    params.insert(
        "terminal_cost".into(),
        json!(from_info.cost + to_info.cost),
    );
    Ok(snapshot.weights.compute_cost(&params, edge.mode))
}

/// Mode-filtered Dijkstra with optional exclusions and region scoping.
///
/// Returns the segment list from `start` to `end` (empty when they are the
/// same node). Fails with `NotFound` for unknown terminals, `InvalidArgs`
/// for excluded endpoints or endpoints outside the allowed regions, and
/// `NoPath` when the search exhausts without reaching `end`.
pub(crate) fn shortest_path(
    snapshot: &SearchSnapshot,
    start: &str,
    end: &str,
    mode: TransportationMode,
    exclusions: &Exclusions,
    allowed_regions: Option<&[String]>,
    cache: &mut TermInfoCache,
) -> SimResult<Vec<PathSegment>> {
    if !snapshot.terminals.contains_key(start) || !snapshot.terminals.contains_key(end) {
        return Err(SimError::NotFound("Terminal not found".into()));
    }
    if exclusions.nodes.contains(start) || exclusions.nodes.contains(end) {
        return Err(SimError::InvalidArgs(
            "Start or end terminal is excluded".into(),
        ));
    }
    if let Some(regions) = allowed_regions {
        if regions.is_empty() {
            return Err(SimError::InvalidArgs(
                "Allowed regions must be non-empty".into(),
            ));
        }
        for (label, node) in [("Start", start), ("End", end)] {
            if let Some(region) = snapshot.regions.get(node) {
                if !regions.iter().any(|r| r == region) {
                    return Err(SimError::InvalidArgs(format!(
                        "{label} not in allowed regions"
                    )));
                }
            }
        }
    }

    let node_allowed = |node: &str| -> bool {
        if exclusions.nodes.contains(node) {
            return false;
        }
        match allowed_regions {
            // Nodes without a region tag pass the region filter.
            Some(regions) => snapshot
                .regions
                .get(node)
                .map_or(true, |region| regions.iter().any(|r| r == region)),
            None => true,
        }
    };

    let mut distance: HashMap<String, f64> = HashMap::new();
    let mut previous: HashMap<String, (String, TransportationMode, AttrMap)> = HashMap::new();
    let mut processed: HashSet<String> = HashSet::new();
    let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::new();

    distance.insert(start.to_string(), 0.0);
    heap.push(Reverse(HeapEntry {
        dist: 0.0,
        node: start.to_string(),
    }));

    while let Some(Reverse(entry)) = heap.pop() {
        let current = entry.node;
        if processed.contains(&current) {
            continue;
        }
        if current == end {
            break;
        }
        processed.insert(current.clone());

        let Some(edges) = snapshot.adjacency.get(&current) else {
            continue;
        };
        // Adjacency lists are iterated in insertion order so equal-cost
        // relaxations resolve deterministically.
        for edge in edges {
            if mode != TransportationMode::Any && edge.mode != mode {
                continue;
            }
            let neighbor = edge.to.as_str();
            if processed.contains(neighbor) || !node_allowed(neighbor) {
                continue;
            }
            if exclusions.excludes_edge(&current, neighbor, edge.mode) {
                continue;
            }

            let edge_cost = augmented_edge_cost(snapshot, cache, &current, edge)?;
            let alt = entry.dist + edge_cost;
            if alt < distance.get(neighbor).copied().unwrap_or(f64::INFINITY) {
                distance.insert(neighbor.to_string(), alt);
                previous.insert(
                    neighbor.to_string(),
                    (current.clone(), edge.mode, edge.attributes.clone()),
                );
                heap.push(Reverse(HeapEntry {
                    dist: alt,
                    node: neighbor.to_string(),
                }));
            }
        }
    }

    if start == end {
        return Ok(Vec::new());
    }
    if !previous.contains_key(end) {
        return Err(SimError::NoPath(format!(
            "No path found from {start} to {end}"
        )));
    }

    let mut segments = Vec::new();
    let mut current = end.to_string();
    while let Some((prev, mode, attributes)) = previous.get(&current) {
        let weight = distance[&current] - distance[prev];
        segments.push(PathSegment {
            from: prev.clone(),
            to: current.clone(),
            mode: *mode,
            weight,
            attributes: attributes.clone(),
        });
        current = prev.clone();
    }
    segments.reverse();
    Ok(segments)
}
