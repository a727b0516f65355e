pub mod dwell;
pub mod storage;
pub mod terminal;

pub use dwell::{get_departure_time, DwellDistribution};
pub use storage::{CompareOp, ContainerStorage, StoredContainer};
pub use terminal::{Terminal, TerminalConfig};
