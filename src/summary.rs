// src/summary.rs
//
// Machine-readable record of what an expansion produced, written next to
// the generated artifacts so downstream analysis can find every document
// and script without re-deriving the naming.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Summary schema version. Increment on breaking changes.
pub const SUMMARY_SCHEMA_VERSION: u32 = 1;

/// Expansion summary written as pretty JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionSummary {
    pub schema_version: u32,
    pub tool_version: String,
    /// Model file the expansion was built from.
    pub model: String,
    /// Common experiment-name prefix of the generated runs.
    pub experiment_prefix: String,
    pub runs: usize,
    /// Sampling seed, for Monte-Carlo expansions.
    pub seed: Option<u64>,
    /// Scheduler dialect, when scripts were rendered.
    pub scheduler: Option<String>,
    pub documents: Vec<String>,
    pub submission_script: Option<String>,
    pub sleeper_script: Option<String>,
}

impl ExpansionSummary {
    pub fn new(model: &str, experiment_prefix: &str, runs: usize) -> Self {
        Self {
            schema_version: SUMMARY_SCHEMA_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            model: model.to_string(),
            experiment_prefix: experiment_prefix.to_string(),
            runs,
            seed: None,
            scheduler: None,
            documents: Vec::new(),
            submission_script: None,
            sleeper_script: None,
        }
    }

    /// Write the summary to a file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
