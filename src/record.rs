//! Parsed records and per-subject aggregates.
//!
//! Dependent records (events, dispensings, measurements) share one [`DependentRecord`]
//! sum type so the assemblers handle all three through a single code path; the
//! [`Occurrence`] trait exposes what they have in common (key, date, type).
//!
//! Dates are parsed leniently: `yyyyMMdd`, `yyyy-MM-dd` and `yyyy/MM/dd` are accepted.
//! A dependent record whose date does not parse is kept (records are never dropped) and
//! reported by the integrity checker.

use crate::descriptor::FileDescriptor;
use crate::ident::SubjectKey;
use crate::schema::RecordType;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

const DATE_FORMATS: [&str; 3] = ["%Y%m%d", "%Y-%m-%d", "%Y/%m/%d"];

/// Parse a date in any accepted format.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Why a data line could not be turned into a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineError {
    /// The line has fewer fields than the file's highest mandatory column index.
    MissingFields { expected: usize, found: usize },
    /// The identifier field is empty.
    EmptyIdentifier,
    /// The descriptor is not usable for this record type.
    WrongDescriptor,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFields { expected, found } => {
                write!(f, "expected at least {expected} fields, found {found}")
            }
            Self::EmptyIdentifier => f.write_str("empty subject identifier"),
            Self::WrongDescriptor => f.write_str("descriptor does not describe this record type"),
        }
    }
}

impl std::error::Error for LineError {}

/// Common accessors of the dependent record kinds.
pub trait Occurrence {
    fn key(&self) -> &SubjectKey;
    /// Date checked against the subject window; `None` if it did not parse.
    fn date(&self) -> Option<NaiveDate>;
    /// The date text as it appeared in the input.
    fn raw_date(&self) -> &str;
    fn record_type(&self) -> RecordType;
    /// Mandatory values in schema order followed by extra column values.
    fn to_fields(&self) -> Vec<String>;
}

/// One line of the subject (population) file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub key: SubjectKey,
    pub birth_date: String,
    pub gender: String,
    pub start_date: String,
    pub end_date: String,
    pub extras: Vec<(String, String)>,
}

impl SubjectRecord {
    /// Start of the validity window, or `None` if open or unparsable.
    #[must_use]
    pub fn window_start(&self) -> Option<NaiveDate> {
        parse_date(&self.start_date)
    }

    /// End of the validity window, or `None` if open or unparsable.
    #[must_use]
    pub fn window_end(&self) -> Option<NaiveDate> {
        parse_date(&self.end_date)
    }

    #[must_use]
    pub fn to_fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.key.id.clone(),
            self.birth_date.clone(),
            self.gender.clone(),
            self.start_date.clone(),
            self.end_date.clone(),
        ];
        fields.extend(self.extras.iter().map(|(_, v)| v.clone()));
        fields
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub key: SubjectKey,
    pub event_type: String,
    pub date: Option<NaiveDate>,
    pub raw_date: String,
    pub extras: Vec<(String, String)>,
}

/// A drug dispensing covering `[date, date + duration)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispensingRecord {
    pub key: SubjectKey,
    pub date: Option<NaiveDate>,
    pub raw_date: String,
    pub atc: String,
    pub duration: String,
    pub extras: Vec<(String, String)>,
}

impl DispensingRecord {
    /// Duration in days, if it parses as a non-negative integer.
    #[must_use]
    pub fn duration_days(&self) -> Option<u32> {
        self.duration.trim().parse().ok()
    }

    /// First day after the dispensing interval.
    #[must_use]
    pub fn end_date(&self) -> Option<NaiveDate> {
        let days = Days::new(u64::from(self.duration_days()?));
        self.date?.checked_add_days(days)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub key: SubjectKey,
    pub date: Option<NaiveDate>,
    pub raw_date: String,
    pub measurement_type: String,
    pub value: String,
    pub extras: Vec<(String, String)>,
}

macro_rules! impl_occurrence {
    ($ty:ty, $tag:expr, |$r:ident| $fields:expr) => {
        impl Occurrence for $ty {
            fn key(&self) -> &SubjectKey {
                &self.key
            }
            fn date(&self) -> Option<NaiveDate> {
                self.date
            }
            fn raw_date(&self) -> &str {
                &self.raw_date
            }
            fn record_type(&self) -> RecordType {
                $tag
            }
            fn to_fields(&self) -> Vec<String> {
                let $r = self;
                let mut fields: Vec<String> = $fields;
                fields.extend($r.extras.iter().map(|(_, v)| v.clone()));
                fields
            }
        }
    };
}

impl_occurrence!(EventRecord, RecordType::Event, |r| vec![
    r.key.id.clone(),
    r.event_type.clone(),
    r.raw_date.clone(),
]);
impl_occurrence!(DispensingRecord, RecordType::Dispensing, |r| vec![
    r.key.id.clone(),
    r.raw_date.clone(),
    r.atc.clone(),
    r.duration.clone(),
]);
impl_occurrence!(MeasurementRecord, RecordType::Measurement, |r| vec![
    r.key.id.clone(),
    r.raw_date.clone(),
    r.measurement_type.clone(),
    r.value.clone(),
]);

/// An event, dispensing or measurement tied to one subject.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependentRecord {
    Event(EventRecord),
    Dispensing(DispensingRecord),
    Measurement(MeasurementRecord),
}

impl DependentRecord {
    fn inner(&self) -> &dyn Occurrence {
        match self {
            Self::Event(r) => r,
            Self::Dispensing(r) => r,
            Self::Measurement(r) => r,
        }
    }
}

impl Occurrence for DependentRecord {
    fn key(&self) -> &SubjectKey {
        self.inner().key()
    }
    fn date(&self) -> Option<NaiveDate> {
        self.inner().date()
    }
    fn raw_date(&self) -> &str {
        self.inner().raw_date()
    }
    fn record_type(&self) -> RecordType {
        self.inner().record_type()
    }
    fn to_fields(&self) -> Vec<String> {
        self.inner().to_fields()
    }
}

/// A subject with every dependent record joined onto it.
///
/// `position` is assigned when the aggregate is emitted (1, 2, ... in emission order) and
/// lets downstream passes correlate subjects without exposing identifiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAggregate {
    pub position: u64,
    pub subject: SubjectRecord,
    pub events: Vec<EventRecord>,
    pub dispensings: Vec<DispensingRecord>,
    pub measurements: Vec<MeasurementRecord>,
}

impl SubjectAggregate {
    #[must_use]
    pub fn new(subject: SubjectRecord) -> Self {
        Self {
            position: 0,
            subject,
            events: Vec::new(),
            dispensings: Vec::new(),
            measurements: Vec::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &SubjectKey {
        &self.subject.key
    }

    /// Append a dependent record to the list of its type.
    pub fn attach(&mut self, record: DependentRecord) {
        match record {
            DependentRecord::Event(r) => self.events.push(r),
            DependentRecord::Dispensing(r) => self.dispensings.push(r),
            DependentRecord::Measurement(r) => self.measurements.push(r),
        }
    }

    /// Number of attached dependent records of all types.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.events.len() + self.dispensings.len() + self.measurements.len()
    }

    /// Stable sort of every dependent list by date; undated records sort first.
    pub fn sort_chronologically(&mut self) {
        self.events.sort_by_key(|r| r.date);
        self.dispensings.sort_by_key(|r| r.date);
        self.measurements.sort_by_key(|r| r.date);
    }

    /// All attached records as trait objects, events first.
    pub fn occurrences(&self) -> impl Iterator<Item = &dyn Occurrence> {
        let events = self.events.iter().map(|r| r as &dyn Occurrence);
        let dispensings = self.dispensings.iter().map(|r| r as &dyn Occurrence);
        let measurements = self.measurements.iter().map(|r| r as &dyn Occurrence);
        events.chain(dispensings).chain(measurements)
    }
}

fn checked_values<'a>(
    desc: &FileDescriptor,
    fields: &'a [String],
    expected: RecordType,
) -> Result<(SubjectKey, Vec<&'a str>), LineError> {
    if desc.record_type() != Some(expected) {
        return Err(LineError::WrongDescriptor);
    }
    let indices = desc.mandatory_indices().ok_or(LineError::WrongDescriptor)?;
    let values = desc.mandatory_values(fields).ok_or(LineError::MissingFields {
        expected: indices.iter().max().map_or(0, |m| m + 1),
        found: fields.len(),
    })?;
    let key = desc.key_of(fields).ok_or(LineError::WrongDescriptor)?;
    if key.id.is_empty() {
        return Err(LineError::EmptyIdentifier);
    }
    Ok((key, values))
}

/// Parse a split line of a subject file.
///
/// # Errors
///
/// Returns a [`LineError`] if mandatory fields are missing or the identifier is empty.
pub fn parse_subject(desc: &FileDescriptor, fields: &[String]) -> Result<SubjectRecord, LineError> {
    let (key, v) = checked_values(desc, fields, RecordType::Subject)?;
    Ok(SubjectRecord {
        key,
        birth_date: v[1].to_string(),
        gender: v[2].to_string(),
        start_date: v[3].to_string(),
        end_date: v[4].to_string(),
        extras: desc.extra_values(fields),
    })
}

/// Parse a split line of a dependent-record file, typed by the descriptor.
///
/// # Errors
///
/// Returns a [`LineError`] if mandatory fields are missing, the identifier is empty, or the
/// descriptor is not a dependent type.
pub fn parse_dependent(
    desc: &FileDescriptor,
    fields: &[String],
) -> Result<DependentRecord, LineError> {
    let ty = desc.record_type().ok_or(LineError::WrongDescriptor)?;
    let (key, v) = checked_values(desc, fields, ty)?;
    let extras = desc.extra_values(fields);
    let record = match ty {
        RecordType::Subject => return Err(LineError::WrongDescriptor),
        RecordType::Event => DependentRecord::Event(EventRecord {
            key,
            event_type: v[1].to_string(),
            date: parse_date(v[2]),
            raw_date: v[2].to_string(),
            extras,
        }),
        RecordType::Dispensing => DependentRecord::Dispensing(DispensingRecord {
            key,
            date: parse_date(v[1]),
            raw_date: v[1].to_string(),
            atc: v[2].to_string(),
            duration: v[3].to_string(),
            extras,
        }),
        RecordType::Measurement => DependentRecord::Measurement(MeasurementRecord {
            key,
            date: parse_date(v[1]),
            raw_date: v[1].to_string(),
            measurement_type: v[2].to_string(),
            value: v[3].to_string(),
            extras,
        }),
    };
    Ok(record)
}
