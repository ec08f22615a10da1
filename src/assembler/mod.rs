//! Assembly of subject aggregates.
//!
//! Two interchangeable strategies produce the same aggregates:
//!
//! - [`SortedMerge`] synchronizes one reader per selected file when every file is already
//!   ordered by `(subset, identifier)`. Only one subject and one lookahead record per
//!   dependent type are resident.
//! - [`PartitionedJoin`] works bucket by bucket on the output of the
//!   [`Splitter`](crate::splitter::Splitter): it loads one bucket's subjects into a lookup
//!   table and streams that bucket's dependent records against it.
//!
//! Both finish every subject through the shared [`Assembly`] context, which numbers it,
//! checks its integrity, counts it and hands it to the sink.

mod hash_join;
mod merge;

pub use hash_join::PartitionedJoin;
pub use merge::SortedMerge;

use crate::descriptor::FileDescriptor;
use crate::integrity::IntegrityChecker;
use crate::output::SubjectSink;
use crate::record::{DependentRecord, LineError, Occurrence, SubjectAggregate};
use crate::schema::RecordType;
use crate::stats::RunStatistics;
use anyhow::Result;
use std::path::Path;

/// Per-run state shared by both assembly strategies.
pub struct Assembly<'s> {
    sink: &'s mut dyn SubjectSink,
    checker: IntegrityChecker,
    stats: RunStatistics,
    next_position: u64,
}

impl<'s> Assembly<'s> {
    pub fn new(sink: &'s mut dyn SubjectSink, checker: IntegrityChecker) -> Self {
        Self {
            sink,
            checker,
            stats: RunStatistics::default(),
            next_position: 0,
        }
    }

    /// Number, check, count and deliver one finished subject.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn emit(&mut self, mut aggregate: SubjectAggregate) -> Result<()> {
        self.next_position += 1;
        aggregate.position = self.next_position;
        self.checker.check_subject(&mut aggregate);
        self.stats.record_subject(&aggregate);
        self.sink.accept_subject(&aggregate)
    }

    /// Route a well-formed dependent record that has no subject.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn unassigned(&mut self, record: &DependentRecord) -> Result<()> {
        let ty = record.record_type();
        self.stats.record_unassigned(ty);
        let mut fields = Vec::with_capacity(8);
        fields.push(record.key().subset.clone().unwrap_or_default());
        fields.extend(record.to_fields());
        self.sink.accept_unassigned(ty, &fields)
    }

    /// Route an unparsable dependent line to the unassigned output as raw fields.
    ///
    /// The row leads with the subset column like a well-formed unassigned record, left
    /// empty when the line carries no subset.
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn malformed_dependent(
        &mut self,
        desc: &FileDescriptor,
        ty: RecordType,
        fields: &[String],
        path: &Path,
        line: u64,
        err: &LineError,
    ) -> Result<()> {
        tracing::debug!(path = %path.display(), line, record_type = %ty, error = %err, "malformed line");
        self.stats.malformed_lines += 1;
        self.stats.record_unassigned(ty);
        let subset = desc
            .subset_index()
            .and_then(|idx| fields.get(idx))
            .cloned()
            .unwrap_or_default();
        let mut row = Vec::with_capacity(fields.len() + 1);
        row.push(subset);
        row.extend_from_slice(fields);
        self.sink.accept_unassigned(ty, &row)
    }

    /// Skip an unparsable subject line.
    pub fn malformed_subject(&mut self, path: &Path, line: u64, err: &LineError) {
        tracing::warn!(path = %path.display(), line, error = %err, "skipping malformed subject line");
        self.stats.malformed_lines += 1;
    }

    /// Close the sink and integrity log and return the accumulated accounting.
    ///
    /// Always closes both, even if the first close fails.
    pub fn finish(mut self) -> (RunStatistics, Vec<String>, Result<()>) {
        let sink_result = self.sink.finish();
        let log_result = self.checker.finish();
        self.stats.integrity_violations = self.checker.violation_count();
        self.stats.output_files = self.sink.files_written() as u64;
        let messages = self.checker.messages().to_vec();
        (self.stats, messages, sink_result.and(log_result))
    }
}
