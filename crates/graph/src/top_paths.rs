//! Top-N diverse paths: direct edges, the global shortest path, then
//! structural diversification via edge exclusion or intermediate terminals.

use std::collections::{BTreeSet, HashSet};

use serde_json::json;
use tracing::debug;

use termsim_core::{AttrMap, SimResult, TransportationMode};

use crate::edge::EdgeKey;
use crate::path::{path_signature, Path, PathSegment, TerminalVisit};
use crate::search::{augmented_edge_cost, shortest_path, Exclusions, SearchSnapshot, TermInfoCache};

struct TopPathsContext<'a> {
    snapshot: &'a SearchSnapshot,
    cache: TermInfoCache,
    signatures: HashSet<String>,
    skip_delays: bool,
}

/// Finds up to `n` structurally diverse paths, cheapest first.
pub(crate) fn find_top_n(
    snapshot: &SearchSnapshot,
    start: &str,
    end: &str,
    n: usize,
    mode: TransportationMode,
    skip_delays: bool,
) -> SimResult<Vec<Path>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut context = TopPathsContext {
        snapshot,
        cache: TermInfoCache::default(),
        signatures: HashSet::new(),
        skip_delays,
    };
    let mut result: Vec<Path> = Vec::new();

    collect_direct_paths(&mut context, &mut result, start, end, n, mode)?;
    if result.len() < n {
        add_shortest_path(&mut context, &mut result, start, end, mode);
    }

    if result.len() < n {
        if result.iter().any(|path| path.segments.len() > 1) {
            diversify_by_edge_exclusion(&mut context, &mut result, start, end, n, mode)?;
        } else {
            diversify_via_intermediates(&mut context, &mut result, start, end, n, mode)?;
        }
    }

    finalize(&mut result, n);
    Ok(result)
}

/// Enumerates direct edges `start → end` (mode-filtered), sorted by
/// augmented cost.
fn collect_direct_paths(
    context: &mut TopPathsContext<'_>,
    result: &mut Vec<Path>,
    start: &str,
    end: &str,
    n: usize,
    mode: TransportationMode,
) -> SimResult<()> {
    let Some(edges) = context.snapshot.adjacency.get(start) else {
        return Ok(());
    };

    let mut direct: Vec<(f64, PathSegment)> = Vec::new();
    for edge in edges {
        if edge.to != end {
            continue;
        }
        if mode != TransportationMode::Any && edge.mode != mode {
            continue;
        }
        let weight = augmented_edge_cost(context.snapshot, &mut context.cache, start, edge)?;
        direct.push((
            weight,
            PathSegment {
                from: start.to_string(),
                to: end.to_string(),
                mode: edge.mode,
                weight,
                attributes: edge.attributes.clone(),
            },
        ));
    }
    // Stable sort: equal-cost edges keep insertion order.
    direct.sort_by(|a, b| a.0.total_cmp(&b.0));

    for (_, segment) in direct {
        if result.len() >= n {
            break;
        }
        let segments = vec![segment];
        let signature = path_signature(&segments);
        if !context.signatures.insert(signature) {
            continue;
        }
        let path = build_path_details(context, &segments, result.len() as i64 + 1)?;
        debug!(mode = %segments[0].mode, cost = path.total_path_cost, "Added direct path");
        result.push(path);
    }
    Ok(())
}

/// Runs the global shortest path, excluding already-chosen direct edges so a
/// genuinely different route can surface.
fn add_shortest_path(
    context: &mut TopPathsContext<'_>,
    result: &mut Vec<Path>,
    start: &str,
    end: &str,
    mode: TransportationMode,
) {
    let mut exclusions = Exclusions::default();
    for path in result.iter() {
        if let [segment] = path.segments.as_slice() {
            exclusions
                .edges
                .insert(EdgeKey::new(&segment.from, &segment.to, segment.mode));
        }
    }

    match shortest_path(
        context.snapshot,
        start,
        end,
        mode,
        &exclusions,
        None,
        &mut context.cache,
    ) {
        Ok(segments) => {
            let signature = path_signature(&segments);
            if context.signatures.insert(signature) {
                match build_path_details(context, &segments, result.len() as i64 + 1) {
                    Ok(path) => {
                        debug!(
                            segments = path.segments.len(),
                            cost = path.total_path_cost,
                            "Added shortest path"
                        );
                        result.push(path);
                    }
                    Err(err) => debug!(%err, "Failed to expand shortest path"),
                }
            }
        }
        Err(err) => debug!(%err, "No additional shortest path found"),
    }
}

/// Edge-exclusion diversification: remove one known edge at a time (then
/// pairs) and re-search, growing the exclusion pool with every new path.
fn diversify_by_edge_exclusion(
    context: &mut TopPathsContext<'_>,
    result: &mut Vec<Path>,
    start: &str,
    end: &str,
    n: usize,
    mode: TransportationMode,
) -> SimResult<()> {
    let mut key_edges: BTreeSet<EdgeKey> = BTreeSet::new();
    for path in result.iter() {
        if path.segments.len() > 1 {
            for segment in &path.segments {
                key_edges.insert(EdgeKey::new(&segment.from, &segment.to, segment.mode));
            }
        }
    }
    let mut ordered: Vec<EdgeKey> = key_edges.iter().cloned().collect();

    while result.len() < n {
        let mut found = false;

        for key in ordered.clone() {
            let mut exclusions = Exclusions::default();
            exclusions.edges.insert(key.clone());

            let Ok(alternative) = shortest_path(
                context.snapshot,
                start,
                end,
                mode,
                &exclusions,
                None,
                &mut context.cache,
            ) else {
                continue;
            };

            let signature = path_signature(&alternative);
            if !context.signatures.insert(signature) {
                continue;
            }

            let path = build_path_details(context, &alternative, result.len() as i64 + 1)?;
            debug!(
                from = %key.from,
                to = %key.to,
                mode = %key.mode,
                "Found new path by excluding edge"
            );
            result.push(path);

            for segment in &alternative {
                let new_key = EdgeKey::new(&segment.from, &segment.to, segment.mode);
                if key_edges.insert(new_key.clone()) {
                    ordered.push(new_key);
                }
            }
            ordered.sort();
            found = true;
            break;
        }

        if !found && ordered.len() >= 2 {
            'pairs: for j in 0..ordered.len() {
                for k in (j + 1)..ordered.len() {
                    let mut exclusions = Exclusions::default();
                    exclusions.edges.insert(ordered[j].clone());
                    exclusions.edges.insert(ordered[k].clone());

                    let Ok(alternative) = shortest_path(
                        context.snapshot,
                        start,
                        end,
                        mode,
                        &exclusions,
                        None,
                        &mut context.cache,
                    ) else {
                        continue;
                    };

                    let signature = path_signature(&alternative);
                    if !context.signatures.insert(signature) {
                        continue;
                    }

                    let path = build_path_details(context, &alternative, result.len() as i64 + 1)?;
                    debug!("Found new path by excluding edge pair");
                    result.push(path);
                    found = true;
                    break 'pairs;
                }
            }
        }

        if !found {
            debug!("No more unique paths found after trying all exclusion strategies");
            break;
        }
    }
    Ok(())
}

/// Intermediate-node diversification: compose `start → mid` and `mid → end`
/// shortest paths for every other terminal, rejecting cycles, the direct
/// path, and duplicates.
fn diversify_via_intermediates(
    context: &mut TopPathsContext<'_>,
    result: &mut Vec<Path>,
    start: &str,
    end: &str,
    n: usize,
    mode: TransportationMode,
) -> SimResult<()> {
    let mut intermediates: Vec<&String> = context
        .snapshot
        .adjacency
        .keys()
        .filter(|node| node.as_str() != start && node.as_str() != end)
        .collect();
    intermediates.sort();

    let no_exclusions = Exclusions::default();
    for intermediate in intermediates {
        if result.len() >= n {
            break;
        }

        let Ok(first_leg) = shortest_path(
            context.snapshot,
            start,
            intermediate,
            mode,
            &no_exclusions,
            None,
            &mut context.cache,
        ) else {
            continue;
        };
        let Ok(second_leg) = shortest_path(
            context.snapshot,
            intermediate,
            end,
            mode,
            &no_exclusions,
            None,
            &mut context.cache,
        ) else {
            continue;
        };

        let mut full_path = first_leg;
        full_path.extend(second_leg);

        // The composition can collapse back onto the direct edge.
        if let [only] = full_path.as_slice() {
            if only.from == start && only.to == end {
                continue;
            }
        }

        let mut seen: HashSet<&str> = HashSet::from([start]);
        let has_cycle = full_path.iter().any(|segment| !seen.insert(&segment.to));
        if has_cycle {
            continue;
        }

        let signature = path_signature(&full_path);
        if !context.signatures.insert(signature) {
            continue;
        }

        let path = build_path_details(context, &full_path, result.len() as i64 + 1)?;
        debug!(
            via = %intermediate,
            segments = path.segments.len(),
            "Found alternative path via intermediate"
        );
        result.push(path);
    }
    Ok(())
}

/// Cost sort, truncation to `n`, and 1-based path-id reassignment.
fn finalize(result: &mut Vec<Path>, n: usize) {
    result.sort_by(|a, b| a.total_path_cost.total_cmp(&b.total_path_cost));
    result.truncate(n);
    for (index, path) in result.iter_mut().enumerate() {
        path.path_id = index as i64 + 1;
    }
}

/// Expands raw segments into a full [`Path`]: edge costs recomputed without
/// the terminal augmentation fields, terminal visits with the skip rules
/// applied.
fn build_path_details(
    context: &mut TopPathsContext<'_>,
    segments: &[PathSegment],
    path_id: i64,
) -> SimResult<Path> {
    let mut total_edge_costs = 0.0;
    let mut total_terminal_costs = 0.0;
    let mut terminals_in_path = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let mut edge_attrs = segment.attributes.clone();
        edge_attrs.swap_remove("terminal_delay");
        edge_attrs.swap_remove("terminal_cost");
        total_edge_costs += context
            .snapshot
            .weights
            .compute_cost(&edge_attrs, segment.mode);

        if i == 0 {
            let info = context.cache.get(context.snapshot, &segment.from)?;
            let skipped = context.skip_delays;
            terminals_in_path.push(TerminalVisit {
                terminal: segment.from.clone(),
                handling_time: info.handling_time,
                cost: info.cost,
                costs_skipped: skipped,
            });
            if !skipped {
                total_terminal_costs += info.cost;
            }
        }

        let info = context.cache.get(context.snapshot, &segment.to)?;
        let skipped = if i + 1 < segments.len() {
            // Seamless transfer: same mode in and out attributes handling to
            // the edges, not this terminal.
            context.skip_delays && segment.mode == segments[i + 1].mode
        } else {
            // The destination terminal is always counted.
            false
        };
        terminals_in_path.push(TerminalVisit {
            terminal: segment.to.clone(),
            handling_time: info.handling_time,
            cost: info.cost,
            costs_skipped: skipped,
        });
        if !skipped {
            total_terminal_costs += info.cost;
        }
    }

    let mut cost_breakdown = AttrMap::new();
    cost_breakdown.insert("edge_costs".into(), json!(total_edge_costs));
    cost_breakdown.insert("terminal_costs".into(), json!(total_terminal_costs));

    Ok(Path {
        path_id,
        total_path_cost: total_edge_costs + total_terminal_costs,
        total_edge_costs,
        total_terminal_costs,
        terminals_in_path,
        segments: segments.to_vec(),
        cost_breakdown,
    })
}
