//! # Cohortbeam
//!
//! A **record-assembly engine** that turns large delimited files of subjects (a population)
//! and their dependent records (events, drug dispensings, measurements) into one aggregate
//! per subject, under a fixed memory budget.
//!
//! ## Key Features
//!
//! - **Header-driven input** - delimiter and record type are detected from each file's header
//! - **Two assembly strategies** - a streaming merge for sorted input, a bucketed hash join
//!   for anything else
//! - **Bounded memory** - at most one subject (merge) or one bucket of subjects (join) is
//!   resident
//! - **No record loss** - dependent records without a subject are routed to an unassigned
//!   output, never dropped
//! - **Temporal integrity checks** - records outside their subject's validity window are
//!   counted and logged up to a cap
//! - **Rolling output** - per-subset output files with a soft size cap
//! - **Compressed input** - gzip and zstd files are read transparently (feature flags)
//!
//! ## Quick Start
//!
//! ```no_run
//! use cohortbeam::{Engine, EngineConfig};
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let config = EngineConfig {
//!     memory_budget_mb: 64.0,
//!     ..EngineConfig::default()
//! };
//! let engine = Engine::from_directory(config, "/data/cohort")?;
//! let outcome = engine.run("/data/cohort")?;
//!
//! println!("mode: {:?}", outcome.mode);
//! println!("subjects: {}", outcome.statistics.subjects);
//! for message in &outcome.integrity_messages {
//!     println!("{message}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Subjects and keys
//!
//! Every line carries a `SubjectID` and, optionally, a `SubsetID`. Together they form a
//! [`SubjectKey`]. Keys order by subset, then by identifier length, then ordinally, so
//! `"9" < "10"`.
//!
//! ### Input files
//!
//! [`FileSet`] selects at most one usable file per [`RecordType`]. A subject file is
//! required; the dependent types are optional.
//!
//! ### Assembly
//!
//! [`Engine`] picks an [`AssemblyMode`]: if every selected file is sorted by key it merges
//! them directly, otherwise it splits the input into hash buckets on disk and joins one
//! bucket at a time. Both strategies produce the same aggregates.
//!
//! ### Output
//!
//! Assembled [`SubjectAggregate`]s go to a [`SubjectSink`]. [`OutputWriter`] writes rolling
//! files named `<subset>_subjectObjects_<n>.<ext>`, plus `unassignedRecords.<ext>` and
//! `integrityErrors.<ext>`. [`MemorySink`] keeps everything in memory.
//!
//! ## Feature Flags
//!
//! - `compression-gzip` (default) - read `.gz` input through `flate2`
//! - `compression-zstd` (default) - read `.zst` input through `zstd`
//!
//! ## Module Overview
//!
//! - [`config`] - engine configuration, JSON loading and validation
//! - [`descriptor`] - header inspection and delimiter sniffing
//! - [`file_set`] - input discovery and selection
//! - [`ident`] - identifier ordering and bucket routing
//! - [`record`] - parsed records and aggregates
//! - [`splitter`] - hash partitioning into bucket files
//! - [`assembler`] - sorted merge and partitioned hash join
//! - [`integrity`] - validity-window checks
//! - [`output`] - sinks and rolling output files
//! - [`stats`] - run statistics
//! - [`engine`] - run orchestration
//! - [`io`] - compressed input, line reading, file listing
//! - [`testing`] - fixtures for tests

pub mod assembler;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod file_set;
pub mod ident;
pub mod integrity;
pub mod io;
pub mod output;
pub mod record;
pub mod schema;
pub mod splitter;
pub mod stats;
pub mod testing;

pub use config::{EngineConfig, SortMode};
pub use descriptor::{Delimiter, FileDescriptor};
pub use engine::{AssemblyMode, Engine, RunOutcome};
pub use error::EngineError;
pub use file_set::FileSet;
pub use ident::{SubjectKey, compare_ids};
pub use integrity::{IntegrityChecker, IntegrityViolation};
pub use output::{MemorySink, OutputWriter, SubjectSink};
pub use record::{DependentRecord, Occurrence, SubjectAggregate, SubjectRecord};
pub use schema::RecordType;
pub use stats::RunStatistics;
