//! Engine configuration.
//!
//! [`EngineConfig`] carries every knob the upstream collaborator can set. All fields have
//! defaults, so a JSON config only needs to name the values it overrides:
//!
//! ```no_run
//! use cohortbeam::config::EngineConfig;
//! # fn main() -> anyhow::Result<()> {
//! // {"memory_budget_mb": 64, "sort_mode": "unsorted"}
//! let config = EngineConfig::from_json_file("engine.json")?;
//! assert_eq!(config.size_check_interval, 1000);
//! # Ok(())
//! # }
//! ```

use crate::error::EngineError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Bytes per configured megabyte.
pub const MB: f64 = 1024.0 * 1024.0;

/// How the engine decides between sorted-merge and partitioned assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Probe every selected file and merge only if all of them are sorted.
    #[default]
    Auto,
    /// Trust that every selected file is sorted.
    Sorted,
    /// Always split into buckets first.
    Unsorted,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Memory budget per partition, in megabytes. Also the global flush threshold of the
    /// splitter's in-memory buffers.
    pub memory_budget_mb: f64,
    /// Soft cap on the size of one rolling output file, in megabytes.
    pub max_output_file_mb: f64,
    /// Number of subjects written to a rolling file between two size checks.
    pub size_check_interval: usize,
    /// Maximum number of integrity violations logged per run.
    pub max_logged_violations: usize,
    pub sort_mode: SortMode,
    /// Multi-character delimiter tried after comma, tab and semicolon.
    pub string_delimiter: String,
    /// Extension (without dot) of every output file.
    pub output_extension: String,
    /// Directory under the work dir holding bucket files during partitioned runs.
    pub scratch_dir_name: String,
    /// Directory under the work dir receiving assembled output.
    pub output_dir_name: String,
    /// Output file stem for subjects without a subset tag.
    pub default_subset: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_budget_mb: 256.0,
            max_output_file_mb: 1024.0,
            size_check_interval: 1000,
            max_logged_violations: 100,
            sort_mode: SortMode::Auto,
            string_delimiter: "|~|".to_string(),
            output_extension: "txt".to_string(),
            scratch_dir_name: "split".to_string(),
            output_dir_name: "subjectObjects".to_string(),
            default_subset: "all".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load a config from a JSON file; absent fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON for this shape, or
    /// fails [`EngineConfig::validate`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let config: Self = serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse engine config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that cannot drive a run.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        let problem = if !(self.memory_budget_mb > 0.0) {
            Some("memory_budget_mb must be positive")
        } else if !(self.max_output_file_mb > 0.0) {
            Some("max_output_file_mb must be positive")
        } else if self.size_check_interval == 0 {
            Some("size_check_interval must be at least 1")
        } else if self.string_delimiter.chars().count() < 2 {
            Some("string_delimiter must have at least two characters")
        } else if self.scratch_dir_name.is_empty() || self.output_dir_name.is_empty() {
            Some("scratch and output directory names must not be empty")
        } else {
            None
        };
        match problem {
            Some(msg) => Err(EngineError::InvalidConfig(msg.to_string()).into()),
            None => Ok(()),
        }
    }

    /// Memory budget in bytes (at least one).
    #[must_use]
    pub fn memory_budget_bytes(&self) -> u64 {
        ((self.memory_budget_mb * MB) as u64).max(1)
    }

    /// Rolling output cap in bytes (at least one).
    #[must_use]
    pub fn max_output_file_bytes(&self) -> u64 {
        ((self.max_output_file_mb * MB) as u64).max(1)
    }
}
