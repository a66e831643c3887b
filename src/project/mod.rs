//! Project model module
//!
//! Logical project trees, their build configuration, and the workspace that
//! ties several projects together.

pub mod collector;
pub mod compilation_database;
pub mod element;
pub mod error;
pub mod model;
pub mod workspace;

pub use collector::{HeaderSink, TranslationUnitCollector};
pub use compilation_database::{CompilationDatabase, CompilationDatabaseError};
pub use element::{
    CompilationInput, ElementKind, ElementVisitor, Membership, ProjectElement, UnitKind,
};
pub use error::ProjectError;
pub use model::{ProjectId, ProjectModel, ScanOptions};
pub use workspace::{Workspace, WorkspaceProject};
