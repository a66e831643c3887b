//! Change notification analysis

pub mod analyzer;
pub mod classification;
pub mod node;

pub use analyzer::{DeltaAnalyzer, DeltaError};
pub use classification::{ChangeClassification, Classification, InputSet};
pub use node::{ChangeFlags, DeltaKind, ElementDelta, ResourceDelta};
