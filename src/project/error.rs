use thiserror::Error;

use crate::project::compilation_database::CompilationDatabaseError;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path does not exist: {path}")]
    PathNotFound { path: String },

    #[error("Project root is not a directory: {path}")]
    InvalidRoot { path: String },

    #[error("Compilation database error: {0}")]
    CompilationDatabase(#[from] CompilationDatabaseError),

    #[error("Failed to scan project tree: {reason}")]
    Scan { reason: String },

    #[error("Unknown project: {name}")]
    UnknownProject { name: String },
}
