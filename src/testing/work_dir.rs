//! Temporary working directories populated with input files.

use super::fixtures::{CohortFixture, RowOrder};
use crate::schema::RecordType;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File name used for each record type when writing a fixture.
#[must_use]
pub fn fixture_file_name(ty: RecordType) -> &'static str {
    match ty {
        RecordType::Subject => "population.csv",
        RecordType::Event => "events.csv",
        RecordType::Dispensing => "dispensings.csv",
        RecordType::Measurement => "measurements.csv",
    }
}

/// Fluent builder over a fresh temporary directory.
///
/// ```
/// use cohortbeam::testing::{CohortFixture, RowOrder, WorkDirBuilder};
///
/// # fn main() -> anyhow::Result<()> {
/// let cohort = CohortFixture::generate(20, &["A", "B"]);
/// let work = WorkDirBuilder::new()?
///     .cohort(&cohort, RowOrder::Shuffled)?
///     .file("notes.txt", "not a record file\n")?
///     .build();
/// assert!(work.path().join("population.csv").exists());
/// # Ok(())
/// # }
/// ```
pub struct WorkDirBuilder {
    dir: TempDir,
    delimiter: String,
}

impl WorkDirBuilder {
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create temporary work dir")?,
            delimiter: ",".to_string(),
        })
    }

    /// Delimiter used by [`WorkDirBuilder::cohort`] and [`WorkDirBuilder::table`].
    #[must_use]
    pub fn delimiter(mut self, delimiter: &str) -> Self {
        self.delimiter = delimiter.to_string();
        self
    }

    /// Write a file with literal contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn file(self, name: &str, contents: &str) -> Result<Self> {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(self)
    }

    /// Write a header and rows joined with the builder's delimiter.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn table(self, name: &str, header: &[&str], rows: &[&[&str]]) -> Result<Self> {
        let mut text = header.join(self.delimiter.as_str());
        text.push('\n');
        for row in rows {
            text.push_str(&row.join(self.delimiter.as_str()));
            text.push('\n');
        }
        self.file(name, &text)
    }

    /// Write every non-empty table of `cohort` under [`fixture_file_name`].
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written.
    pub fn cohort(mut self, cohort: &CohortFixture, order: RowOrder) -> Result<Self> {
        for ty in RecordType::ALL {
            let table = cohort.table(ty);
            if table.is_empty() {
                continue;
            }
            let text = table.render(&self.delimiter, order);
            self = self.file(fixture_file_name(ty), &text)?;
        }
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> WorkDir {
        WorkDir { dir: self.dir }
    }
}

/// A populated temporary directory, removed on drop.
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Paths of the regular files directly under `dir` (relative to the work dir), sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list(&self, dir: &str) -> Result<Vec<String>> {
        let root = self.join(dir);
        let mut names = Vec::new();
        for entry in fs::read_dir(&root).with_context(|| format!("read {}", root.display()))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Contents of a file relative to the work dir.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.join(name);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}
