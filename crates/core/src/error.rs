use thiserror::Error;

/// Workspace-wide error taxonomy.
///
/// Every failure that crosses a crate boundary is mapped into one of these
/// variants; the command dispatcher turns them into `{success: false, error}`
/// envelopes without ever crashing the process.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Name conflict: {0}")]
    NameConflict(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("No path found: {0}")]
    NoPath(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::Persistence(format!("JSON error: {err}"))
    }
}
