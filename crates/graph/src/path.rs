//! Path types returned by the path-finding operations.

use serde::Serialize;

use termsim_core::{AttrMap, TransportationMode};

/// One hop of a path: a directed edge taken under a concrete mode, with the
/// augmented weight computed during the search.
#[derive(Debug, Clone, Serialize)]
pub struct PathSegment {
    pub from: String,
    pub to: String,
    pub mode: TransportationMode,
    pub weight: f64,
    pub attributes: AttrMap,
}

/// Terminal entry in a path's cost breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct TerminalVisit {
    pub terminal: String,
    pub handling_time: f64,
    pub cost: f64,
    pub costs_skipped: bool,
}

/// A complete path with per-terminal and per-edge cost details.
#[derive(Debug, Clone, Serialize)]
pub struct Path {
    pub path_id: i64,
    pub total_path_cost: f64,
    pub total_edge_costs: f64,
    pub total_terminal_costs: f64,
    pub terminals_in_path: Vec<TerminalVisit>,
    pub segments: Vec<PathSegment>,
    pub cost_breakdown: AttrMap,
}

/// Canonical duplicate-detection form: `from₀` followed by
/// `"->" + to + ":" + mode` per segment.
pub fn path_signature(segments: &[PathSegment]) -> String {
    let Some(first) = segments.first() else {
        return String::new();
    };
    let mut signature = first.from.clone();
    for segment in segments {
        signature.push_str("->");
        signature.push_str(&segment.to);
        signature.push(':');
        signature.push_str(&(segment.mode as i64).to_string());
    }
    signature
}

/// Contiguity check: each segment starts where the previous one ended.
pub fn segments_are_contiguous(segments: &[PathSegment]) -> bool {
    segments.windows(2).all(|pair| pair[0].to == pair[1].from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(from: &str, to: &str, mode: TransportationMode) -> PathSegment {
        PathSegment {
            from: from.into(),
            to: to.into(),
            mode,
            weight: 0.0,
            attributes: AttrMap::new(),
        }
    }

    #[test]
    fn signature_encodes_stops_and_modes() {
        let segments = vec![
            segment("A", "B", TransportationMode::Truck),
            segment("B", "C", TransportationMode::Ship),
        ];
        assert_eq!(path_signature(&segments), "A->B:0->C:2");
        assert_eq!(path_signature(&[]), "");
    }

    #[test]
    fn contiguity() {
        let good = vec![
            segment("A", "B", TransportationMode::Truck),
            segment("B", "C", TransportationMode::Truck),
        ];
        assert!(segments_are_contiguous(&good));
        let bad = vec![
            segment("A", "B", TransportationMode::Truck),
            segment("C", "D", TransportationMode::Truck),
        ];
        assert!(!segments_are_contiguous(&bad));
    }
}
