//! Temporal integrity of assembled subjects.
//!
//! Every dependent record attached to a subject should fall inside the subject's validity
//! window `[start date, end date]`. Records outside it, or without a parsable date, are
//! violations: they are counted and logged, but never removed from the aggregate.
//!
//! Logging is bounded. After `max_logged` messages the checker keeps counting but stops
//! logging, and appends a single continuation marker so readers know the list is cut.
//!
//! ```
//! use cohortbeam::integrity::IntegrityChecker;
//! # use cohortbeam::record::*;
//! # use cohortbeam::ident::SubjectKey;
//! # let subject = SubjectRecord {
//! #     key: SubjectKey::plain("1"), birth_date: "19500101".into(), gender: "F".into(),
//! #     start_date: "20000101".into(), end_date: "20001231".into(), extras: vec![],
//! # };
//! let mut checker = IntegrityChecker::new(10);
//! let mut subject = SubjectAggregate::new(subject);
//! assert_eq!(checker.check_subject(&mut subject), 0);
//! ```

use crate::ident::SubjectKey;
use crate::record::SubjectAggregate;
use crate::schema::RecordType;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Marker appended once the logging cap has been reached.
pub const CONTINUATION_MARKER: &str = "...to be continued";

/// One dependent record outside its subject's window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub key: SubjectKey,
    pub record_type: RecordType,
    pub date: Option<NaiveDate>,
    pub raw_date: String,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
}

fn show(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "open".to_string(), |d| d.format("%Y-%m-%d").to_string())
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date {
            Some(date) => write!(
                f,
                "subject {}: {} dated {} outside window [{}, {}]",
                self.key,
                self.record_type,
                date.format("%Y-%m-%d"),
                show(self.window_start),
                show(self.window_end),
            ),
            None => write!(
                f,
                "subject {}: {} has unreadable date '{}'",
                self.key, self.record_type, self.raw_date
            ),
        }
    }
}

/// Violations in `aggregate`, in list order (events, dispensings, measurements).
#[must_use]
pub fn violations_in(aggregate: &SubjectAggregate) -> Vec<IntegrityViolation> {
    let start = aggregate.subject.window_start();
    let end = aggregate.subject.window_end();
    aggregate
        .occurrences()
        .filter(|r| match r.date() {
            Some(d) => start.is_some_and(|s| d < s) || end.is_some_and(|e| d > e),
            None => true,
        })
        .map(|r| IntegrityViolation {
            key: r.key().clone(),
            record_type: r.record_type(),
            date: r.date(),
            raw_date: r.raw_date().to_string(),
            window_start: start,
            window_end: end,
        })
        .collect()
}

/// Run-wide integrity accounting with a bounded message log.
pub struct IntegrityChecker {
    max_logged: usize,
    violations: u64,
    messages: Vec<String>,
    truncated: bool,
    log: Option<BufWriter<File>>,
}

impl IntegrityChecker {
    /// Checker that logs at most `max_logged` violations.
    #[must_use]
    pub fn new(max_logged: usize) -> Self {
        Self {
            max_logged,
            violations: 0,
            messages: Vec::new(),
            truncated: false,
            log: None,
        }
    }

    /// Checker that also writes logged violations to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be created.
    pub fn with_log_file(max_logged: usize, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut checker = Self::new(max_logged);
        checker.log = Some(BufWriter::new(file));
        Ok(checker)
    }

    /// Sort the aggregate's records chronologically and account for its violations.
    ///
    /// Returns the number of violations found in this aggregate. Checking the same
    /// aggregate again yields the same number.
    pub fn check_subject(&mut self, aggregate: &mut SubjectAggregate) -> usize {
        aggregate.sort_chronologically();
        let found = violations_in(aggregate);
        for violation in &found {
            self.violations += 1;
            self.record(violation.to_string());
        }
        found.len()
    }

    fn record(&mut self, message: String) {
        if self.messages.len() < self.max_logged {
            tracing::warn!(target: "cohortbeam::integrity", "{message}");
            self.write_log(&message);
            self.messages.push(message);
        } else if !self.truncated {
            self.truncated = true;
            tracing::warn!(
                target: "cohortbeam::integrity",
                cap = self.max_logged,
                "integrity violation log cap reached; further violations are only counted"
            );
            self.write_log(CONTINUATION_MARKER);
            self.messages.push(CONTINUATION_MARKER.to_string());
        }
    }

    fn write_log(&mut self, line: &str) {
        if let Some(log) = self.log.as_mut()
            && let Err(err) = writeln!(log, "{line}")
        {
            tracing::error!(error = %err, "cannot write integrity log; disabling it");
            self.log = None;
        }
    }

    /// Total violations seen, logged or not.
    #[must_use]
    pub fn violation_count(&self) -> u64 {
        self.violations
    }

    /// Logged messages, ending with [`CONTINUATION_MARKER`] if the cap was reached.
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Whether some violations were counted but not logged.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Flush and close the log file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(mut log) = self.log.take() {
            log.flush().context("flush integrity log")?;
        }
        Ok(())
    }
}

impl fmt::Display for IntegrityChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrityChecker({} violations)", self.violations)
    }
}
