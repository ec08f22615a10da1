//! Run statistics.
//!
//! [`RunStatistics`] is threaded through both assemblers and returned with the run
//! outcome. It replaces any run-wide mutable counters: every count the orchestration layer
//! displays lives here.

use crate::record::SubjectAggregate;
use crate::schema::RecordType;
use crate::splitter::SplitSummary;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Subjects assembled and emitted.
    pub subjects: u64,
    /// Dependent records attached to a subject, per type.
    pub events: u64,
    pub dispensings: u64,
    pub measurements: u64,
    /// Dependent records routed to the unassigned output, per type.
    pub unassigned_events: u64,
    pub unassigned_dispensings: u64,
    pub unassigned_measurements: u64,
    /// Data lines that could not be parsed (subject lines are skipped, dependent lines
    /// are also counted as unassigned).
    pub malformed_lines: u64,
    pub integrity_violations: u64,
    /// Buckets used by a partitioned run; zero for a sorted merge.
    pub buckets: u64,
    /// Subject lines per subset tag (`""` when untagged), counted by the split pass.
    pub subset_counts: BTreeMap<String, u64>,
    /// Lines the split pass routed to a bucket.
    pub split_lines: u64,
    /// Lines without an identifier, parked in the lost directory.
    pub lost_lines: u64,
    pub flushes: u64,
    pub output_files: u64,
    pub elapsed_ms: u64,
}

impl RunStatistics {
    /// Count an emitted subject and its attached records.
    pub fn record_subject(&mut self, aggregate: &SubjectAggregate) {
        self.subjects += 1;
        self.events += aggregate.events.len() as u64;
        self.dispensings += aggregate.dispensings.len() as u64;
        self.measurements += aggregate.measurements.len() as u64;
    }

    /// Count one dependent record routed to the unassigned output.
    pub fn record_unassigned(&mut self, ty: RecordType) {
        match ty {
            RecordType::Event => self.unassigned_events += 1,
            RecordType::Dispensing => self.unassigned_dispensings += 1,
            RecordType::Measurement => self.unassigned_measurements += 1,
            RecordType::Subject => {}
        }
    }

    /// Fold in the accounting of a partitioned run's split pass.
    pub fn record_split(&mut self, summary: &SplitSummary) {
        self.split_lines = summary.lines.iter().sum();
        self.lost_lines = summary.lost_lines.iter().sum();
        self.flushes = summary.flushes;
        self.subset_counts.clone_from(&summary.subset_counts);
    }

    /// Attached dependent records of every type.
    #[must_use]
    pub fn assigned_total(&self) -> u64 {
        self.events + self.dispensings + self.measurements
    }

    /// Unassigned dependent records of every type.
    #[must_use]
    pub fn unassigned_total(&self) -> u64 {
        self.unassigned_events + self.unassigned_dispensings + self.unassigned_measurements
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Write the statistics to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let formatted = serde_json::to_string_pretty(self)?;
        file.write_all(formatted.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Emit the statistics as one structured log event.
    pub fn log_summary(&self) {
        tracing::info!(
            subjects = self.subjects,
            events = self.events,
            dispensings = self.dispensings,
            measurements = self.measurements,
            unassigned = self.unassigned_total(),
            malformed = self.malformed_lines,
            integrity_violations = self.integrity_violations,
            buckets = self.buckets,
            split_lines = self.split_lines,
            lost_lines = self.lost_lines,
            flushes = self.flushes,
            subsets = ?self.subset_counts,
            output_files = self.output_files,
            elapsed_ms = self.elapsed_ms,
            "assembly finished"
        );
    }
}
