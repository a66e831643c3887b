use json_compilation_db::Entry;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompilationDatabaseError {
    #[error("Compilation database file not found: {path}")]
    FileNotFound { path: String },
    #[error("Failed to read compilation database file: {error}")]
    ReadError { error: String },
    #[error("Failed to parse compilation database JSON: {error}")]
    ParseError { error: String },
    #[error("Compilation database is empty")]
    EmptyDatabase,
}

/// Build configuration of a project, read from compile_commands.json
///
/// Decides which sources are real project members; anything else found on
/// disk is only a potential translation unit. When serialized, only the path
/// is included.
#[derive(Debug, Deserialize)]
pub struct CompilationDatabase {
    /// Path to the compilation database file (compile_commands.json)
    pub path: PathBuf,
    /// Parsed compilation database entries (loaded at initialization)
    #[serde(skip)]
    pub entries: Vec<Entry>,
}

impl CompilationDatabase {
    /// Load and parse the compilation database at the given path
    pub fn new(path: PathBuf) -> Result<Self, CompilationDatabaseError> {
        if !path.exists() {
            return Err(CompilationDatabaseError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            });
        }

        let file = std::fs::File::open(&path).map_err(|e| CompilationDatabaseError::ReadError {
            error: e.to_string(),
        })?;

        let reader = std::io::BufReader::new(file);
        let entries: Vec<Entry> =
            serde_json::from_reader(reader).map_err(|e| CompilationDatabaseError::ParseError {
                error: e.to_string(),
            })?;

        if entries.is_empty() {
            return Err(CompilationDatabaseError::EmptyDatabase);
        }

        Ok(Self { path, entries })
    }

    /// Build a database from in-memory entries
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self {
            path: PathBuf::from("compile_commands.json"),
            entries,
        }
    }

    /// Get the number of entries in the compilation database
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Absolute paths of every source listed by the database, sorted and unique
    pub fn member_files(&self) -> BTreeSet<PathBuf> {
        self.entries
            .iter()
            .map(|entry| absolutize(&entry.directory, &entry.file))
            .collect()
    }

    /// Check if the database lists the given absolute source path
    pub fn contains_file(&self, file_path: &Path) -> bool {
        self.entries
            .iter()
            .any(|entry| absolutize(&entry.directory, &entry.file) == file_path)
    }

    /// Include directories passed with `-I` / `-isystem` / `-iquote`, unique
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = BTreeSet::new();
        for entry in &self.entries {
            let mut args = entry.arguments.iter();
            while let Some(arg) = args.next() {
                let value = match arg.as_str() {
                    "-I" | "-isystem" | "-iquote" => args.next().map(String::as_str),
                    other => other
                        .strip_prefix("-I")
                        .or_else(|| other.strip_prefix("-isystem"))
                        .or_else(|| other.strip_prefix("-iquote")),
                };
                if let Some(value) = value.filter(|v| !v.is_empty()) {
                    dirs.insert(absolutize(&entry.directory, Path::new(value)));
                }
            }
        }
        dirs.into_iter().collect()
    }
}

fn absolutize(directory: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        directory.join(file)
    }
}

/// Custom serialization that only outputs the path field
impl Serialize for CompilationDatabase {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.path.serialize(serializer)
    }
}
