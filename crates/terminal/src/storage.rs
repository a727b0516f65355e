//! In-memory container store with time- and destination-indexed queries.

use indexmap::IndexMap;

use termsim_core::{Container, SimError, SimResult};

/// Comparison operator accepted by the time-indexed queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn parse(condition: &str) -> SimResult<Self> {
        match condition {
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            "==" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            other => Err(SimError::InvalidArgs(format!(
                "Invalid condition: {other}. Must be one of: <, <=, >, >=, ==, !="
            ))),
        }
    }

    pub fn matches(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

/// A container together with the times the terminal stamped on it.
#[derive(Debug, Clone)]
pub struct StoredContainer {
    pub container: Container,
    pub added_time: f64,
    pub departure_time: f64,
}

/// Container records keyed by container id, preserving insertion order.
#[derive(Debug, Default)]
pub struct ContainerStorage {
    containers: IndexMap<String, StoredContainer>,
}

impl ContainerStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a container; an existing record under the same id is replaced.
    pub fn add(&mut self, container: Container, added_time: f64, departure_time: f64) {
        self.containers.insert(
            container.container_id.clone(),
            StoredContainer {
                container,
                added_time,
                departure_time,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn clear(&mut self) {
        self.containers.clear();
    }

    pub fn by_departing_time(&self, time: f64, op: CompareOp) -> Vec<&StoredContainer> {
        self.containers
            .values()
            .filter(|stored| op.matches(stored.departure_time, time))
            .collect()
    }

    pub fn by_added_time(&self, time: f64, op: CompareOp) -> Vec<&StoredContainer> {
        self.containers
            .values()
            .filter(|stored| op.matches(stored.added_time, time))
            .collect()
    }

    pub fn by_next_destination(&self, destination: &str) -> Vec<&StoredContainer> {
        self.containers
            .values()
            .filter(|stored| stored.container.next_destination.as_deref() == Some(destination))
            .collect()
    }

    /// Removes and returns every container bound for `destination`.
    pub fn dequeue_by_next_destination(&mut self, destination: &str) -> Vec<StoredContainer> {
        let ids: Vec<String> = self
            .containers
            .values()
            .filter(|stored| stored.container.next_destination.as_deref() == Some(destination))
            .map(|stored| stored.container.container_id.clone())
            .collect();

        ids.iter()
            .filter_map(|id| self.containers.shift_remove(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str, destination: Option<&str>) -> Container {
        let mut c = Container::new(id);
        c.next_destination = destination.map(str::to_string);
        c
    }

    #[test]
    fn condition_parsing() {
        assert_eq!(CompareOp::parse(">=").unwrap(), CompareOp::Ge);
        assert!(CompareOp::parse("=>").is_err());
        assert!(CompareOp::parse("between").is_err());
    }

    #[test]
    fn departing_time_queries_filter_on_stored_departure() {
        let mut storage = ContainerStorage::new();
        storage.add(container("a", None), 0.0, 3600.0);
        storage.add(container("b", None), 0.0, 7200.0);

        assert_eq!(storage.by_departing_time(0.0, CompareOp::Gt).len(), 2);
        assert_eq!(storage.by_departing_time(0.0, CompareOp::Lt).len(), 0);
        assert_eq!(storage.by_departing_time(3600.0, CompareOp::Le).len(), 1);
        assert_eq!(storage.by_departing_time(3600.0, CompareOp::Ne).len(), 1);
    }

    #[test]
    fn added_time_queries() {
        let mut storage = ContainerStorage::new();
        storage.add(container("a", None), 10.0, 100.0);
        storage.add(container("b", None), 20.0, 200.0);

        assert_eq!(storage.by_added_time(10.0, CompareOp::Eq).len(), 1);
        assert_eq!(storage.by_added_time(15.0, CompareOp::Gt).len(), 1);
    }

    #[test]
    fn dequeue_removes_matching_containers() {
        let mut storage = ContainerStorage::new();
        storage.add(container("a", Some("Hamburg")), 0.0, 1.0);
        storage.add(container("b", Some("Antwerp")), 0.0, 1.0);
        storage.add(container("c", Some("Hamburg")), 0.0, 1.0);

        let removed = storage.dequeue_by_next_destination("Hamburg");
        assert_eq!(removed.len(), 2);
        assert_eq!(storage.len(), 1);
        assert!(storage.by_next_destination("Hamburg").is_empty());
        assert_eq!(storage.by_next_destination("Antwerp").len(), 1);
    }

    #[test]
    fn same_id_replaces() {
        let mut storage = ContainerStorage::new();
        storage.add(container("a", None), 0.0, 1.0);
        storage.add(container("a", None), 5.0, 6.0);
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.by_added_time(5.0, CompareOp::Eq).len(), 1);
    }
}
