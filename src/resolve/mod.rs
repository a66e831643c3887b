//! Include resolution support for the parse engine

pub mod heuristics;
pub mod resolver;
pub mod search;

pub use heuristics::{IncludeHeuristics, IncludeSearchCandidate, compute_score, select_best};
pub use resolver::IncludeResolver;
pub use search::ProjectSearch;

#[cfg(test)]
pub use search::MockProjectSearch;
