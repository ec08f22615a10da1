//! Hash partitioning of unsorted input into buckets.
//!
//! The splitter streams every selected file once (the subject file first) and appends
//! each data line to an in-memory buffer chosen by the bucket of its subject key. When
//! the total buffered size reaches the memory budget, every non-empty buffer of every
//! bucket is appended to its bucket file and cleared; a global flush keeps the heap
//! bounded no matter how the keys are distributed.
//!
//! Bucket files hold raw data lines without a header. They are parsed later with the
//! descriptor of the file they came from.
//!
//! ## Layout
//!
//! ```text
//! <root>/0/subjects.txt
//! <root>/0/events.txt
//! ...
//! <root>/<n-1>/measurements.txt
//! <root>/lost/...            lines without an identifier field
//! ```

use crate::descriptor::FileDescriptor;
use crate::file_set::FileSet;
use crate::schema::RecordType;
use anyhow::{Context, Result, anyhow};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions, create_dir_all, remove_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name of the reserved directory for lines that cannot be routed.
pub const LOST_DIR: &str = "lost";

/// Number of buckets needed so that each holds about `budget_bytes` of input.
#[must_use]
pub fn bucket_count(total_bytes: u64, budget_bytes: u64) -> usize {
    let buckets = total_bytes.div_ceil(budget_bytes.max(1)).max(1);
    usize::try_from(buckets).unwrap_or(usize::MAX)
}

/// Where bucket files live on disk.
#[derive(Clone, Debug)]
pub struct SplitLayout {
    root: PathBuf,
    bucket_count: usize,
}

impl SplitLayout {
    pub fn new(root: impl Into<PathBuf>, bucket_count: usize) -> Self {
        Self {
            root: root.into(),
            bucket_count: bucket_count.max(1),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    #[must_use]
    pub fn bucket_dir(&self, bucket: usize) -> PathBuf {
        self.root.join(bucket.to_string())
    }

    #[must_use]
    pub fn bucket_file(&self, bucket: usize, ty: RecordType) -> PathBuf {
        self.bucket_dir(bucket).join(ty.bucket_file_name())
    }

    #[must_use]
    pub fn lost_file(&self, ty: RecordType) -> PathBuf {
        self.root.join(LOST_DIR).join(ty.bucket_file_name())
    }

    /// Delete the whole scratch tree, including the lost directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing tree cannot be removed.
    pub fn teardown(&self) -> Result<()> {
        if self.root.exists() {
            remove_dir_all(&self.root)
                .with_context(|| format!("remove {}", self.root.display()))?;
        }
        Ok(())
    }
}

/// What one split pass saw.
#[derive(Clone, Debug, Default)]
pub struct SplitSummary {
    /// Routed data lines per type, indexed by [`RecordType::index`].
    pub lines: [u64; 4],
    /// Lines written to the lost directory per type.
    pub lost_lines: [u64; 4],
    /// Subject lines per subset tag (`""` for untagged subjects).
    pub subset_counts: BTreeMap<String, u64>,
    /// Number of global buffer flushes.
    pub flushes: u64,
}

/// Streams input files into bucket files.
pub struct Splitter {
    layout: SplitLayout,
    flush_threshold: u64,
    buffers: Vec<[String; 4]>,
    lost: [String; 4],
    buffered_bytes: u64,
    summary: SplitSummary,
}

impl Splitter {
    /// Splitter writing into `layout`, flushing once `flush_threshold` bytes are buffered.
    #[must_use]
    pub fn new(layout: SplitLayout, flush_threshold: u64) -> Self {
        let buffers = vec![Default::default(); layout.bucket_count()];
        Self {
            layout,
            flush_threshold: flush_threshold.max(1),
            buffers,
            lost: Default::default(),
            buffered_bytes: 0,
            summary: SplitSummary::default(),
        }
    }

    /// Create a fresh scratch tree: one directory per bucket with an empty file for each
    /// selected type, plus the lost directory.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory or placeholder cannot be created.
    pub fn prepare(&self, files: &FileSet) -> Result<()> {
        self.layout.teardown()?;
        let lost = self.layout.root().join(LOST_DIR);
        create_dir_all(&lost).with_context(|| format!("mkdir -p {}", lost.display()))?;
        for bucket in 0..self.layout.bucket_count() {
            let dir = self.layout.bucket_dir(bucket);
            create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
            for desc in files.iter() {
                let Some(ty) = desc.record_type() else { continue };
                let path = self.layout.bucket_file(bucket, ty);
                File::create(&path).with_context(|| format!("create {}", path.display()))?;
            }
        }
        tracing::debug!(
            root = %self.layout.root().display(),
            buckets = self.layout.bucket_count(),
            "prepared bucket directories"
        );
        Ok(())
    }

    /// Split every selected file, subject file first.
    ///
    /// # Errors
    ///
    /// Returns an error if no subject file is selected or any file cannot be read or
    /// written.
    pub fn split(mut self, files: &FileSet) -> Result<SplitSummary> {
        self.prepare(files)?;
        self.split_file(files.require(RecordType::Subject)?)?;
        for desc in files.dependents() {
            self.split_file(desc)?;
        }
        tracing::info!(
            buckets = self.layout.bucket_count(),
            flushes = self.summary.flushes,
            subsets = self.summary.subset_counts.len(),
            "split input into buckets"
        );
        Ok(self.summary)
    }

    fn split_file(&mut self, desc: &FileDescriptor) -> Result<()> {
        let ty = desc
            .record_type()
            .ok_or_else(|| anyhow!("{} has no record type", desc.path().display()))?;
        let buckets = self.layout.bucket_count();
        let mut lines = desc.data_lines()?;
        while let Some(line) = lines.next_line()? {
            let fields = desc.split(line);
            match desc.key_of(&fields) {
                Some(key) => {
                    let bucket = key.bucket(buckets);
                    if ty == RecordType::Subject {
                        *self
                            .summary
                            .subset_counts
                            .entry(key.subset.unwrap_or_default())
                            .or_insert(0) += 1;
                    }
                    self.summary.lines[ty.index()] += 1;
                    self.append(Some(bucket), ty, line)?;
                }
                None => {
                    self.summary.lost_lines[ty.index()] += 1;
                    self.append(None, ty, line)?;
                }
            }
        }
        self.flush_all()
    }

    fn append(&mut self, bucket: Option<usize>, ty: RecordType, line: &str) -> Result<()> {
        let buf = match bucket {
            Some(b) => &mut self.buffers[b][ty.index()],
            None => &mut self.lost[ty.index()],
        };
        buf.push_str(line);
        buf.push('\n');
        self.buffered_bytes += line.len() as u64 + 1;
        if self.buffered_bytes >= self.flush_threshold {
            self.flush_all()?;
        }
        Ok(())
    }

    fn flush_all(&mut self) -> Result<()> {
        if self.buffered_bytes == 0 {
            return Ok(());
        }
        for (bucket, buffers) in self.buffers.iter_mut().enumerate() {
            for ty in RecordType::ALL {
                let buf = &mut buffers[ty.index()];
                if !buf.is_empty() {
                    append_to_file(&self.layout.bucket_file(bucket, ty), buf)?;
                    buf.clear();
                }
            }
        }
        for ty in RecordType::ALL {
            let buf = &mut self.lost[ty.index()];
            if !buf.is_empty() {
                append_to_file(&self.layout.lost_file(ty), buf)?;
                buf.clear();
            }
        }
        tracing::debug!(bytes = self.buffered_bytes, "flushed bucket buffers");
        self.buffered_bytes = 0;
        self.summary.flushes += 1;
        Ok(())
    }
}

fn append_to_file(path: &Path, data: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {} for append", path.display()))?;
    file.write_all(data.as_bytes())
        .with_context(|| format!("append to {}", path.display()))
}
