//! Test support for code that drives the engine.
//!
//! - [`CohortFixture`] generates subject and dependent tables with a known number of
//!   orphaned and out-of-window records.
//! - [`WorkDirBuilder`] writes fixtures or literal files into a temporary directory that is
//!   removed when the resulting [`WorkDir`] is dropped.
//! - [`init_test_logging`] routes `tracing` output through the test harness; call it
//!   first in a test to see engine logs with `--nocapture`.
//!
//! ```
//! use cohortbeam::config::EngineConfig;
//! use cohortbeam::engine::Engine;
//! use cohortbeam::output::MemorySink;
//! use cohortbeam::testing::{CohortFixture, RowOrder, WorkDirBuilder};
//!
//! # fn main() -> anyhow::Result<()> {
//! let cohort = CohortFixture::generate(30, &[]);
//! let work = WorkDirBuilder::new()?.cohort(&cohort, RowOrder::Sorted)?.build();
//!
//! let engine = Engine::from_directory(EngineConfig::default(), work.path())?;
//! let mut sink = MemorySink::new();
//! let outcome = engine.run_with_sink(work.path(), &mut sink)?;
//! assert_eq!(outcome.statistics.unassigned_total() as usize, cohort.orphans);
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod work_dir;

pub use fixtures::{CohortFixture, FixtureTable, GAP_EVERY, OUT_OF_WINDOW_EVERY, RowOrder};
pub use work_dir::{WorkDir, WorkDirBuilder, fixture_file_name};

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Install a `tracing` subscriber that writes through the test harness's captured output.
///
/// Safe to call from every test; only the first call installs. Filtering follows
/// `RUST_LOG`, defaulting to `warn`.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
