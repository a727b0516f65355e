use termsim_core::{AttrMap, TransportationMode};

/// An outgoing edge stored in the adjacency list.
#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub to: String,
    pub route_id: String,
    pub mode: TransportationMode,
    pub attributes: AttrMap,
}

/// `(from, to, mode)` identity of an edge.
///
/// At most one edge exists per key; the derived `Ord` gives the
/// deterministic ordering used by exclusion-based path diversification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub from: String,
    pub to: String,
    pub mode: TransportationMode,
}

impl EdgeKey {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        mode: TransportationMode,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ordering_is_from_to_mode() {
        let mut keys = vec![
            EdgeKey::new("B", "A", TransportationMode::Truck),
            EdgeKey::new("A", "B", TransportationMode::Ship),
            EdgeKey::new("A", "B", TransportationMode::Truck),
            EdgeKey::new("A", "A", TransportationMode::Train),
        ];
        keys.sort();
        assert_eq!(keys[0], EdgeKey::new("A", "A", TransportationMode::Train));
        assert_eq!(keys[1], EdgeKey::new("A", "B", TransportationMode::Truck));
        assert_eq!(keys[2], EdgeKey::new("A", "B", TransportationMode::Ship));
        assert_eq!(keys[3], EdgeKey::new("B", "A", TransportationMode::Truck));
    }
}
