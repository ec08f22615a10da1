use super::Assembly;
use crate::descriptor::FileDescriptor;
use crate::error::EngineError;
use crate::file_set::FileSet;
use crate::ident::SubjectKey;
use crate::io::LineReader;
use crate::record::{Occurrence, SubjectAggregate, parse_dependent, parse_subject};
use crate::schema::RecordType;
use crate::splitter::SplitLayout;
use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::remove_dir_all;
use std::path::Path;

/// Bucket-by-bucket hash join over split input.
///
/// Only one bucket's subjects are resident at a time. Subjects are emitted in the order
/// they appear in their bucket file, buckets in ascending order.
pub struct PartitionedJoin<'a> {
    files: &'a FileSet,
    layout: &'a SplitLayout,
}

impl<'a> PartitionedJoin<'a> {
    #[must_use]
    pub fn new(files: &'a FileSet, layout: &'a SplitLayout) -> Self {
        Self { files, layout }
    }

    /// Join every bucket, then drain the lost directory.
    ///
    /// Each bucket directory is removed once its subjects have been emitted.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::DuplicateSubject`] when a bucket holds the same subject
    /// key twice, and on I/O or sink errors.
    pub fn run(&self, asm: &mut Assembly<'_>) -> Result<()> {
        let subject_desc = self.files.require(RecordType::Subject)?;
        for bucket in 0..self.layout.bucket_count() {
            self.join_bucket(bucket, subject_desc, asm)?;
            let dir = self.layout.bucket_dir(bucket);
            remove_dir_all(&dir).with_context(|| format!("remove {}", dir.display()))?;
        }
        self.drain_lost(subject_desc, asm)
    }

    fn join_bucket(
        &self,
        bucket: usize,
        subject_desc: &FileDescriptor,
        asm: &mut Assembly<'_>,
    ) -> Result<()> {
        let mut aggregates: Vec<SubjectAggregate> = Vec::new();
        let mut index: HashMap<SubjectKey, usize> = HashMap::new();

        let path = self.layout.bucket_file(bucket, RecordType::Subject);
        let mut lines = LineReader::open(&path)?;
        while let Some(line) = lines.next_line()? {
            let fields = subject_desc.split(line);
            let subject = match parse_subject(subject_desc, &fields) {
                Ok(subject) => subject,
                Err(err) => {
                    asm.malformed_subject(&path, lines.line_number(), &err);
                    continue;
                }
            };
            match index.entry(subject.key.clone()) {
                Entry::Occupied(_) => {
                    tracing::error!(
                        subject = %subject.key,
                        bucket,
                        "duplicate subject identifier"
                    );
                    return Err(EngineError::DuplicateSubject(subject.key).into());
                }
                Entry::Vacant(v) => {
                    v.insert(aggregates.len());
                    aggregates.push(SubjectAggregate::new(subject));
                }
            }
        }

        for desc in self.files.dependents() {
            let ty = record_type_of(desc)?;
            let path = self.layout.bucket_file(bucket, ty);
            let mut lines = LineReader::open(&path)?;
            while let Some(line) = lines.next_line()? {
                let fields = desc.split(line);
                match parse_dependent(desc, &fields) {
                    Ok(record) => match index.get(record.key()) {
                        Some(&slot) => aggregates[slot].attach(record),
                        None => asm.unassigned(&record)?,
                    },
                    Err(err) => {
                        let line_no = lines.line_number();
                        asm.malformed_dependent(desc, ty, &fields, &path, line_no, &err)?;
                    }
                }
            }
        }

        tracing::debug!(bucket, subjects = aggregates.len(), "joined bucket");
        for aggregate in aggregates {
            asm.emit(aggregate)?;
        }
        Ok(())
    }

    /// Lines without an identifier field cannot belong to any subject.
    fn drain_lost(&self, subject_desc: &FileDescriptor, asm: &mut Assembly<'_>) -> Result<()> {
        let lost = self.layout.lost_file(RecordType::Subject);
        drain_file(&lost, subject_desc, |fields, line_no| {
            if let Err(err) = parse_subject(subject_desc, fields) {
                asm.malformed_subject(&lost, line_no, &err);
            }
            Ok(())
        })?;

        for desc in self.files.dependents() {
            let ty = record_type_of(desc)?;
            let path = self.layout.lost_file(ty);
            drain_file(&path, desc, |fields, line_no| match parse_dependent(desc, fields) {
                Ok(record) => asm.unassigned(&record),
                Err(err) => asm.malformed_dependent(desc, ty, fields, &path, line_no, &err),
            })?;
        }
        Ok(())
    }
}

fn record_type_of(desc: &FileDescriptor) -> Result<RecordType> {
    desc.record_type()
        .ok_or_else(|| anyhow!("{} has no record type", desc.path().display()))
}

/// Feed every line of `path`, split with `desc`, to `f`; a missing file is empty.
fn drain_file<F>(path: &Path, desc: &FileDescriptor, mut f: F) -> Result<()>
where
    F: FnMut(&[String], u64) -> Result<()>,
{
    if !path.exists() {
        return Ok(());
    }
    let mut lines = LineReader::open(path)?;
    while let Some(line) = lines.next_line()? {
        let fields = desc.split(line);
        f(&fields, lines.line_number())?;
    }
    Ok(())
}
