//! Incremental re-indexing for C/C++ projects
//!
//! Changes to a project arrive as element deltas. The [`delta`] analyzer
//! turns them into forced, changed and removed file sets, [`task`] runs
//! preemptible indexer tasks over those sets, and [`resolve`] answers the
//! include lookups made while parsing, backed by the directory listing
//! cache in [`cache`].

pub mod cache;
pub mod config;
pub mod delta;
pub mod engine;
pub mod index;
pub mod io;
pub mod logging;
pub mod project;
pub mod resolve;
pub mod task;

#[cfg(test)]
mod test_utils;
