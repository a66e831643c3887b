use std::path::PathBuf;

/// What an Update task checks to find stale files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Reparse every file in scope, stale or not
    pub update_all: bool,
    /// Compare modification time and size with the index record
    pub check_timestamps: bool,
    /// Compare the content hash with the index record
    pub check_content_hash: bool,
    /// Reparse files whose unresolved includes would now resolve
    pub unresolved_includes: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            update_all: false,
            check_timestamps: true,
            check_content_hash: false,
            unresolved_includes: false,
        }
    }
}

/// Part of the project an Update task looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateScope {
    Project,
    /// Explicit files and folders
    Selection(Vec<PathBuf>),
}
