use super::Assembly;
use crate::descriptor::FileDescriptor;
use crate::error::EngineError;
use crate::file_set::FileSet;
use crate::ident::SubjectKey;
use crate::io::LineReader;
use crate::record::{DependentRecord, Occurrence, SubjectAggregate, parse_dependent, parse_subject};
use crate::schema::RecordType;
use anyhow::{Result, anyhow};
use std::cmp::Ordering;

/// Synchronized merge over pre-sorted input files.
///
/// Every dependent record is compared against the current subject: equal keys attach,
/// smaller keys belong to a subject that never appeared (unassigned), and the first larger
/// key is held back as lookahead for the following subjects.
pub struct SortedMerge<'a> {
    files: &'a FileSet,
}

struct DependentCursor<'f> {
    desc: &'f FileDescriptor,
    ty: RecordType,
    lines: LineReader,
    lookahead: Option<DependentRecord>,
}

impl<'f> DependentCursor<'f> {
    fn open(desc: &'f FileDescriptor) -> Result<Self> {
        let ty = desc
            .record_type()
            .ok_or_else(|| anyhow!("{} has no record type", desc.path().display()))?;
        Ok(Self {
            desc,
            ty,
            lines: desc.data_lines()?,
            lookahead: None,
        })
    }

    /// The next well-formed record; malformed lines on the way go to the unassigned output.
    fn peek(&mut self, asm: &mut Assembly<'_>) -> Result<Option<&DependentRecord>> {
        if self.lookahead.is_none() {
            while let Some(line) = self.lines.next_line()? {
                let fields = self.desc.split(line);
                match parse_dependent(self.desc, &fields) {
                    Ok(record) => {
                        self.lookahead = Some(record);
                        break;
                    }
                    Err(err) => {
                        let line_no = self.lines.line_number();
                        asm.malformed_dependent(
                            self.desc,
                            self.ty,
                            &fields,
                            self.desc.path(),
                            line_no,
                            &err,
                        )?;
                    }
                }
            }
        }
        Ok(self.lookahead.as_ref())
    }

    /// Attach every record of `aggregate`'s subject and route passed-over ones.
    fn drain_into(&mut self, aggregate: &mut SubjectAggregate, asm: &mut Assembly<'_>) -> Result<()> {
        loop {
            let ordering = match self.peek(asm)? {
                Some(record) => record.key().cmp(aggregate.key()),
                None => return Ok(()),
            };
            match ordering {
                Ordering::Greater => return Ok(()),
                Ordering::Equal => {
                    if let Some(record) = self.lookahead.take() {
                        aggregate.attach(record);
                    }
                }
                Ordering::Less => {
                    if let Some(record) = self.lookahead.take() {
                        asm.unassigned(&record)?;
                    }
                }
            }
        }
    }

    /// Called after the last subject. Every remaining record sorts after the last subject
    /// and is unassigned.
    fn finish(&mut self, asm: &mut Assembly<'_>) -> Result<()> {
        let mut remaining = 0u64;
        while self.peek(asm)?.is_some() {
            if let Some(record) = self.lookahead.take() {
                asm.unassigned(&record)?;
                remaining += 1;
            }
        }
        if remaining > 0 {
            tracing::warn!(
                path = %self.desc.path().display(),
                record_type = %self.ty,
                remaining,
                "records remain after the last subject; routed to unassigned"
            );
        }
        Ok(())
    }
}

impl<'a> SortedMerge<'a> {
    #[must_use]
    pub fn new(files: &'a FileSet) -> Self {
        Self { files }
    }

    /// Merge all selected files, emitting subjects in input order.
    ///
    /// # Errors
    ///
    /// Fails with [`EngineError::DuplicateSubject`] or [`EngineError::SubjectOutOfOrder`]
    /// when the subject stream violates the sort order, and on I/O or sink errors.
    pub fn run(&self, asm: &mut Assembly<'_>) -> Result<()> {
        let subject_desc = self.files.require(RecordType::Subject)?;
        let mut cursors = self
            .files
            .dependents()
            .map(DependentCursor::open)
            .collect::<Result<Vec<_>>>()?;

        let mut subjects = subject_desc.data_lines()?;
        let mut previous: Option<SubjectKey> = None;
        while let Some(line) = subjects.next_line()? {
            let fields = subject_desc.split(line);
            let subject = match parse_subject(subject_desc, &fields) {
                Ok(subject) => subject,
                Err(err) => {
                    asm.malformed_subject(subject_desc.path(), subjects.line_number(), &err);
                    continue;
                }
            };

            if let Some(prev) = previous.take() {
                match subject.key.cmp(&prev) {
                    Ordering::Equal => {
                        tracing::error!(
                            subject = %subject.key,
                            path = %subject_desc.path().display(),
                            line = subjects.line_number(),
                            "duplicate subject identifier"
                        );
                        return Err(EngineError::DuplicateSubject(subject.key).into());
                    }
                    Ordering::Less => {
                        tracing::error!(
                            subject = %subject.key,
                            previous = %prev,
                            "subject file is not sorted"
                        );
                        return Err(EngineError::SubjectOutOfOrder {
                            previous: prev,
                            current: subject.key,
                        }
                        .into());
                    }
                    Ordering::Greater => {}
                }
            }

            let mut aggregate = SubjectAggregate::new(subject);
            for cursor in &mut cursors {
                cursor.drain_into(&mut aggregate, asm)?;
            }
            previous = Some(aggregate.key().clone());
            asm.emit(aggregate)?;
        }

        for cursor in &mut cursors {
            cursor.finish(asm)?;
        }
        Ok(())
    }
}
