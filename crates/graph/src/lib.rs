pub mod cost;
pub mod edge;
pub mod engine;
pub mod path;
mod search;
mod serialize;
mod top_paths;

pub use cost::CostWeights;
pub use edge::{EdgeKey, EdgeRecord};
pub use engine::{parse_name_list, TerminalGraph};
pub use path::{path_signature, segments_are_contiguous, Path, PathSegment, TerminalVisit};
