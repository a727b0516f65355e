pub mod attrs;
pub mod container;
pub mod error;
pub mod modes;

pub use attrs::{attr_f64, merge_attrs, AttrMap};
pub use container::Container;
pub use error::SimError;
pub use modes::{mode_can_use_interface, parse_interface_map, TerminalInterface, TransportationMode};

/// Convenience alias used across the workspace.
pub type SimResult<T> = Result<T, SimError>;
