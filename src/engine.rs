//! Run orchestration.
//!
//! An [`Engine`] owns the configuration and the selected input files. It decides once,
//! at construction, whether the input can be merged directly or must be partitioned
//! first, then drives the chosen assembler into a [`SubjectSink`].
//!
//! ```no_run
//! use cohortbeam::config::EngineConfig;
//! use cohortbeam::engine::Engine;
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = Engine::from_directory(EngineConfig::default(), "/data/cohort")?;
//! let outcome = engine.run("/data/cohort")?;
//! println!("{} subjects via {:?}", outcome.statistics.subjects, outcome.mode);
//! # Ok(())
//! # }
//! ```

use crate::assembler::{Assembly, PartitionedJoin, SortedMerge};
use crate::config::{EngineConfig, SortMode};
use crate::file_set::FileSet;
use crate::integrity::IntegrityChecker;
use crate::output::{OutputWriter, SubjectSink, integrity_file_name};
use crate::schema::RecordType;
use crate::splitter::{SplitLayout, SplitSummary, Splitter, bucket_count};
use crate::stats::RunStatistics;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Assembly strategy of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssemblyMode {
    /// Every selected file is sorted; merge them in one pass.
    SortedMerge,
    /// Split into hash buckets, then join bucket by bucket.
    Partitioned,
}

/// What a successful run produced.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub mode: AssemblyMode,
    pub statistics: RunStatistics,
    /// Logged integrity violations, ending with the continuation marker if capped.
    pub integrity_messages: Vec<String>,
}

pub struct Engine {
    config: EngineConfig,
    files: FileSet,
    mode: AssemblyMode,
}

impl Engine {
    /// Validate the configuration, require a subject file and pick the assembly mode.
    ///
    /// With [`SortMode::Auto`] every selected file is streamed once to probe its order.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, no subject file is selected, or a
    /// probed file cannot be read.
    pub fn new(config: EngineConfig, files: FileSet) -> Result<Self> {
        config.validate()?;
        files.require(RecordType::Subject)?;
        let mode = match config.sort_mode {
            SortMode::Sorted => AssemblyMode::SortedMerge,
            SortMode::Unsorted => AssemblyMode::Partitioned,
            SortMode::Auto => probe_mode(&files)?,
        };
        tracing::info!(
            mode = ?mode,
            files = files.iter().count(),
            presence = files.presence_mask(),
            "engine ready"
        );
        Ok(Self {
            config,
            files,
            mode,
        })
    }

    /// Discover the input files in `dir` and build an engine over them.
    ///
    /// # Errors
    ///
    /// See [`FileSet::from_directory`] and [`Engine::new`].
    pub fn from_directory(config: EngineConfig, dir: impl AsRef<Path>) -> Result<Self> {
        let files = FileSet::from_directory(dir, &config)?;
        Self::new(config, files)
    }

    #[must_use]
    pub fn assembly_mode(&self) -> AssemblyMode {
        self.mode
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn files(&self) -> &FileSet {
        &self.files
    }

    /// Output directory used by [`Engine::run`].
    pub fn output_dir(&self, work_dir: impl AsRef<Path>) -> PathBuf {
        work_dir.as_ref().join(&self.config.output_dir_name)
    }

    /// Assemble into rolling files under `<work_dir>/<output_dir_name>`, with the integrity
    /// log written next to them.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a run-terminating condition such as a duplicate
    /// subject. Output written so far is flushed before returning.
    pub fn run(&self, work_dir: impl AsRef<Path>) -> Result<RunOutcome> {
        let work_dir = work_dir.as_ref();
        let out_dir = self.output_dir(work_dir);
        let mut writer = OutputWriter::from_config(&out_dir, &self.config)?;
        let checker = IntegrityChecker::with_log_file(
            self.config.max_logged_violations,
            out_dir.join(integrity_file_name(&self.config.output_extension)),
        )?;
        self.execute(work_dir, &mut writer, checker)
    }

    /// Assemble into a caller-provided sink. Scratch files still go under `work_dir`.
    ///
    /// # Errors
    ///
    /// See [`Engine::run`].
    pub fn run_with_sink(
        &self,
        work_dir: impl AsRef<Path>,
        sink: &mut dyn SubjectSink,
    ) -> Result<RunOutcome> {
        let checker = IntegrityChecker::new(self.config.max_logged_violations);
        self.execute(work_dir.as_ref(), sink, checker)
    }

    fn execute(
        &self,
        work_dir: &Path,
        sink: &mut dyn SubjectSink,
        checker: IntegrityChecker,
    ) -> Result<RunOutcome> {
        let started = Instant::now();
        let mut asm = Assembly::new(sink, checker);
        let mut buckets = 0;
        let mut split = None;
        let result = match self.mode {
            AssemblyMode::SortedMerge => SortedMerge::new(&self.files).run(&mut asm),
            AssemblyMode::Partitioned => {
                let layout = SplitLayout::new(
                    work_dir.join(&self.config.scratch_dir_name),
                    bucket_count(self.files.total_bytes(), self.config.memory_budget_bytes()),
                );
                buckets = layout.bucket_count() as u64;
                self.partitioned(&layout, &mut asm)
                    .map(|summary| split = Some(summary))
            }
        };

        let (mut statistics, integrity_messages, closed) = asm.finish();
        statistics.buckets = buckets;
        if let Some(summary) = &split {
            statistics.record_split(summary);
        }
        statistics.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if let Err(err) = &result {
            tracing::error!(error = %err, "assembly aborted");
        }
        result?;
        closed?;

        statistics.log_summary();
        Ok(RunOutcome {
            mode: self.mode,
            statistics,
            integrity_messages,
        })
    }

    /// Split, join, and remove the scratch tree whether or not the join succeeded.
    fn partitioned(&self, layout: &SplitLayout, asm: &mut Assembly<'_>) -> Result<SplitSummary> {
        let splitter = Splitter::new(layout.clone(), self.config.memory_budget_bytes());
        let result = splitter.split(&self.files).and_then(|summary| {
            PartitionedJoin::new(&self.files, layout).run(asm)?;
            Ok(summary)
        });
        let removed = layout.teardown();
        let summary = result?;
        removed?;
        Ok(summary)
    }
}

fn probe_mode(files: &FileSet) -> Result<AssemblyMode> {
    for desc in files.iter() {
        if !desc.probe_sorted()? {
            tracing::info!(path = %desc.path().display(), "input is not sorted; partitioning");
            return Ok(AssemblyMode::Partitioned);
        }
    }
    Ok(AssemblyMode::SortedMerge)
}
