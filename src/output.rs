//! Downstream delivery of assembled subjects.
//!
//! Assemblers hand every finished [`SubjectAggregate`] and every unassigned record to a
//! [`SubjectSink`]. Two sinks ship with the crate:
//!
//! - [`OutputWriter`] serializes to rolling per-subset files named
//!   `<subset>_subjectObjects_<index>.<ext>` plus a flat `unassignedRecords.<ext>`.
//! - [`MemorySink`] keeps everything in memory for in-process consumers.
//!
//! Rolling files are size-capped softly: the size is checked every `check_interval`
//! subjects written to that file, so a file may overshoot the cap between two checks.
//! Each subset rolls independently.

use crate::config::EngineConfig;
use crate::io::glob::list_matching;
use crate::record::SubjectAggregate;
use crate::schema::RecordType;
use anyhow::{Context, Result};
use csv::WriterBuilder;
use glob::Pattern;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{File, create_dir_all, remove_file};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receiver of assembled subjects and unassigned records.
pub trait SubjectSink {
    /// Consume one finished subject. Called exactly once per subject.
    fn accept_subject(&mut self, subject: &SubjectAggregate) -> Result<()>;

    /// Consume one dependent record that matched no subject, as its split fields.
    fn accept_unassigned(&mut self, record_type: RecordType, fields: &[String]) -> Result<()>;

    /// Flush and close everything. Called once, on success and on failure.
    fn finish(&mut self) -> Result<()>;

    /// Number of output files produced so far.
    fn files_written(&self) -> usize {
        0
    }
}

/// Name of rolling output file `index` for `stem`.
#[must_use]
pub fn rolling_file_name(stem: &str, index: u32, extension: &str) -> String {
    format!("{stem}_subjectObjects_{index}.{extension}")
}

fn rolling_file_pattern(extension: &str) -> String {
    format!("*_subjectObjects_*.{}", Pattern::escape(extension))
}

/// Name of the unassigned-records file.
#[must_use]
pub fn unassigned_file_name(extension: &str) -> String {
    format!("unassignedRecords.{extension}")
}

/// Name of the integrity log file.
#[must_use]
pub fn integrity_file_name(extension: &str) -> String {
    format!("integrityErrors.{extension}")
}

fn write_aggregate<W: Write>(wtr: &mut csv::Writer<W>, subject: &SubjectAggregate) -> csv::Result<()> {
    let subset = subject.key().subset.clone().unwrap_or_default();
    let mut row = vec![
        RecordType::Subject.tag().to_string(),
        subject.position.to_string(),
        subset.clone(),
    ];
    row.extend(subject.subject.to_fields());
    wtr.write_record(&row)?;

    for record in subject.occurrences() {
        let mut row = vec![record.record_type().tag().to_string(), subset.clone()];
        row.extend(record.to_fields());
        wtr.write_record(&row)?;
    }
    Ok(())
}

struct RollingFile {
    stem: String,
    index: u32,
    path: PathBuf,
    writer: csv::Writer<File>,
    since_check: usize,
    full: bool,
}

impl RollingFile {
    fn create(dir: &Path, extension: &str, stem: &str, index: u32) -> Result<Self> {
        let path = dir.join(rolling_file_name(stem, index, extension));
        let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        tracing::debug!(path = %path.display(), "opened output file");
        Ok(Self {
            stem: stem.to_string(),
            index,
            path,
            writer: WriterBuilder::new().flexible(true).from_writer(file),
            since_check: 0,
            full: false,
        })
    }

    /// Flush and compare the on-disk size against `max_bytes`.
    fn check_size(&mut self, max_bytes: u64) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))?;
        let len = self
            .writer
            .get_ref()
            .metadata()
            .with_context(|| format!("stat {}", self.path.display()))?
            .len();
        self.full = len >= max_bytes;
        Ok(())
    }
}

/// File-backed sink with rolling per-subset output files.
pub struct OutputWriter {
    dir: PathBuf,
    extension: String,
    default_subset: String,
    max_bytes: u64,
    check_interval: usize,
    rolling: HashMap<String, RollingFile>,
    unassigned: Option<csv::Writer<BufWriter<File>>>,
    written: Vec<PathBuf>,
}

impl OutputWriter {
    /// Create `dir` and the unassigned-records file inside it.
    ///
    /// Rolling files with this extension left in `dir` by an earlier run are removed first.
    ///
    /// `max_bytes` is the soft cap per rolling file, checked every `check_interval`
    /// subjects written to that file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or the unassigned-records file cannot be created.
    pub fn new(
        dir: impl AsRef<Path>,
        extension: &str,
        default_subset: &str,
        max_bytes: u64,
        check_interval: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        let stale = list_matching(&dir, &rolling_file_pattern(extension))?;
        for path in &stale {
            remove_file(path).with_context(|| format!("remove {}", path.display()))?;
        }
        if !stale.is_empty() {
            tracing::info!(dir = %dir.display(), removed = stale.len(), "removed previous output files");
        }
        let unassigned_path = dir.join(unassigned_file_name(extension));
        let file = File::create(&unassigned_path)
            .with_context(|| format!("create {}", unassigned_path.display()))?;
        Ok(Self {
            dir,
            extension: extension.to_string(),
            default_subset: default_subset.to_string(),
            max_bytes: max_bytes.max(1),
            check_interval: check_interval.max(1),
            rolling: HashMap::new(),
            unassigned: Some(
                WriterBuilder::new()
                    .flexible(true)
                    .from_writer(BufWriter::new(file)),
            ),
            written: vec![unassigned_path],
        })
    }

    /// Writer configured from an [`EngineConfig`].
    ///
    /// # Errors
    ///
    /// See [`OutputWriter::new`].
    pub fn from_config(dir: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        Self::new(
            dir,
            &config.output_extension,
            &config.default_subset,
            config.max_output_file_bytes(),
            config.size_check_interval,
        )
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every file created so far, the unassigned-records file first.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.written
    }
}

impl SubjectSink for OutputWriter {
    fn accept_subject(&mut self, subject: &SubjectAggregate) -> Result<()> {
        let stem = subject
            .key()
            .subset
            .clone()
            .unwrap_or_else(|| self.default_subset.clone());

        let file = match self.rolling.entry(stem) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let f = RollingFile::create(&self.dir, &self.extension, v.key(), 1)?;
                self.written.push(f.path.clone());
                v.insert(f)
            }
        };

        if file.full {
            file.writer
                .flush()
                .with_context(|| format!("flush {}", file.path.display()))?;
            let next = RollingFile::create(&self.dir, &self.extension, &file.stem, file.index + 1)?;
            tracing::info!(
                subset = %file.stem,
                from = %file.path.display(),
                to = %next.path.display(),
                "output file reached size cap"
            );
            self.written.push(next.path.clone());
            *file = next;
        }

        write_aggregate(&mut file.writer, subject)
            .with_context(|| format!("write subject to {}", file.path.display()))?;
        file.since_check += 1;
        if file.since_check >= self.check_interval {
            file.since_check = 0;
            file.check_size(self.max_bytes)?;
        }
        Ok(())
    }

    fn accept_unassigned(&mut self, record_type: RecordType, fields: &[String]) -> Result<()> {
        let Some(wtr) = self.unassigned.as_mut() else {
            return Ok(());
        };
        let mut row = Vec::with_capacity(fields.len() + 1);
        row.push(record_type.tag());
        row.extend(fields.iter().map(String::as_str));
        wtr.write_record(&row).context("write unassigned record")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        for (_, mut file) in self.rolling.drain() {
            file.writer
                .flush()
                .with_context(|| format!("flush {}", file.path.display()))?;
        }
        if let Some(mut wtr) = self.unassigned.take() {
            wtr.flush().context("flush unassigned records")?;
        }
        Ok(())
    }

    fn files_written(&self) -> usize {
        self.written.len()
    }
}

/// In-memory sink; keeps every subject and unassigned record.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub subjects: Vec<SubjectAggregate>,
    pub unassigned: Vec<(RecordType, Vec<String>)>,
    pub finished: bool,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubjectSink for MemorySink {
    fn accept_subject(&mut self, subject: &SubjectAggregate) -> Result<()> {
        self.subjects.push(subject.clone());
        Ok(())
    }

    fn accept_unassigned(&mut self, record_type: RecordType, fields: &[String]) -> Result<()> {
        self.unassigned.push((record_type, fields.to_vec()));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}
