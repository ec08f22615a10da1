//! Record types and their column conventions.
//!
//! Every input file is classified as one of four [`RecordType`]s by checking its header
//! against the mandatory column set of each type, in the fixed order
//! subject, event, dispensing, measurement. The first type whose mandatory set is fully
//! contained in the header wins, so a header that satisfies several schemas at once is
//! classified as the earliest one.
//!
//! Column names are compared lower-cased and trimmed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Name of the identifier column shared by all record types.
pub const ID_COLUMN: &str = "subjectid";

/// Name of the optional subset (cohort tag) column.
pub const SUBSET_COLUMN: &str = "subsetid";

/// The four kinds of input file the engine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordType {
    Subject,
    Event,
    Dispensing,
    Measurement,
}

impl RecordType {
    /// All types in classification priority order.
    pub const ALL: [Self; 4] = [
        Self::Subject,
        Self::Event,
        Self::Dispensing,
        Self::Measurement,
    ];

    /// The dependent types, in the order they are joined onto a subject.
    pub const DEPENDENT: [Self; 3] = [Self::Event, Self::Dispensing, Self::Measurement];

    /// Mandatory column names, lower-cased, in the order records expose them.
    #[must_use]
    pub const fn mandatory_columns(self) -> &'static [&'static str] {
        match self {
            Self::Subject => &["subjectid", "birthdate", "gender", "startdate", "enddate"],
            Self::Event => &["subjectid", "eventtype", "date"],
            Self::Dispensing => &["subjectid", "date", "atc", "duration"],
            Self::Measurement => &["subjectid", "date", "measurementtype", "value"],
        }
    }

    /// Slot (within the mandatory ordering) holding the occurrence date of a dependent type.
    #[must_use]
    pub const fn date_slot(self) -> Option<usize> {
        match self {
            Self::Subject => None,
            Self::Event => Some(2),
            Self::Dispensing | Self::Measurement => Some(1),
        }
    }

    /// Position in [`RecordType::ALL`], used to index per-type arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Subject => 0,
            Self::Event => 1,
            Self::Dispensing => 2,
            Self::Measurement => 3,
        }
    }

    /// Presence bit: subject = 1, event = 2, dispensing = 4, measurement = 8.
    #[must_use]
    pub const fn bit(self) -> u8 {
        1 << self.index()
    }

    /// Tag written in front of every output line of this type.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Subject => "SUBJECT",
            Self::Event => "EVENT",
            Self::Dispensing => "DISPENSING",
            Self::Measurement => "MEASUREMENT",
        }
    }

    /// Fixed file name used for this type inside each bucket directory.
    #[must_use]
    pub const fn bucket_file_name(self) -> &'static str {
        match self {
            Self::Subject => "subjects.txt",
            Self::Event => "events.txt",
            Self::Dispensing => "dispensings.txt",
            Self::Measurement => "measurements.txt",
        }
    }

    /// Classify a lower-cased header field set.
    ///
    /// Returns the first type (in [`RecordType::ALL`] order) whose mandatory columns are all
    /// present, or `None` when no schema matches.
    #[must_use]
    pub fn classify(header: &HashSet<String>) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| {
            ty.mandatory_columns()
                .iter()
                .all(|col| header.contains(*col))
        })
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Subject => "subject",
            Self::Event => "event",
            Self::Dispensing => "dispensing",
            Self::Measurement => "measurement",
        };
        f.write_str(name)
    }
}
