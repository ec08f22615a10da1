//! Synthetic cohorts with known shape.
//!
//! [`CohortFixture::generate`] builds subject and dependent tables whose expected outcome is
//! known up front: identifiers divisible by [`GAP_EVERY`] have dependent records but no
//! subject line (they end up unassigned), and identifiers divisible by
//! [`OUT_OF_WINDOW_EVERY`] carry one event dated after their window.

use crate::ident::{SubjectKey, rotating_hash};
use crate::schema::RecordType;

/// Identifiers divisible by this have no subject line.
pub const GAP_EVERY: usize = 7;
/// Identifiers divisible by this get one event after the window end.
pub const OUT_OF_WINDOW_EVERY: usize = 5;

const WINDOW_START: &str = "20100101";
const WINDOW_END: &str = "20201231";
const LATE_DATE: &str = "20210601";

/// Row order written to disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowOrder {
    /// Ascending by `(subset, identifier)`.
    Sorted,
    /// A deterministic permutation that is not sorted.
    Shuffled,
}

/// One table of a fixture: a header and keyed rows.
#[derive(Clone, Debug, Default)]
pub struct FixtureTable {
    pub header: Vec<String>,
    pub rows: Vec<(SubjectKey, Vec<String>)>,
}

impl FixtureTable {
    fn new(with_subset: bool, columns: &[&str]) -> Self {
        let mut header = Vec::new();
        if with_subset {
            header.push("SubsetID".to_string());
        }
        header.extend(columns.iter().map(ToString::to_string));
        Self {
            header,
            rows: Vec::new(),
        }
    }

    fn push(&mut self, key: &SubjectKey, values: &[&str]) {
        let mut row = Vec::with_capacity(values.len() + 1);
        if let Some(subset) = &key.subset {
            row.push(subset.clone());
        }
        row.extend(values.iter().map(ToString::to_string));
        self.rows.push((key.clone(), row));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render the table with `delimiter`, rows in `order`.
    #[must_use]
    pub fn render(&self, delimiter: &str, order: RowOrder) -> String {
        let mut rows: Vec<&(SubjectKey, Vec<String>)> = self.rows.iter().collect();
        match order {
            RowOrder::Sorted => rows.sort_by(|a, b| a.0.cmp(&b.0)),
            RowOrder::Shuffled => rows.sort_by_key(|(key, row)| {
                rotating_hash(&format!("{}#{}", key.composite(), row.join(",")))
            }),
        }
        let mut out = self.header.join(delimiter);
        out.push('\n');
        for (_, row) in rows {
            out.push_str(&row.join(delimiter));
            out.push('\n');
        }
        out
    }
}

/// Four tables forming one cohort.
#[derive(Clone, Debug)]
pub struct CohortFixture {
    pub subjects: FixtureTable,
    pub events: FixtureTable,
    pub dispensings: FixtureTable,
    pub measurements: FixtureTable,
    /// Dependent records whose identifier has no subject line.
    pub orphans: usize,
    /// Events dated outside their subject's window.
    pub out_of_window: usize,
}

impl CohortFixture {
    /// Cohort of identifiers `1..=per_subset` in every subset of `subsets`. An empty
    /// `subsets` writes no subset column at all.
    #[must_use]
    pub fn generate(per_subset: usize, subsets: &[&str]) -> Self {
        let with_subset = !subsets.is_empty();
        let mut fixture = Self {
            subjects: FixtureTable::new(
                with_subset,
                &["SubjectID", "Birthdate", "Gender", "StartDate", "EndDate"],
            ),
            events: FixtureTable::new(with_subset, &["SubjectID", "EventType", "Date", "Origin"]),
            dispensings: FixtureTable::new(with_subset, &["SubjectID", "Date", "ATC", "Duration"]),
            measurements: FixtureTable::new(
                with_subset,
                &["SubjectID", "Date", "MeasurementType", "Value"],
            ),
            orphans: 0,
            out_of_window: 0,
        };

        let tags: Vec<Option<&str>> = if with_subset {
            subsets.iter().map(|s| Some(*s)).collect()
        } else {
            vec![None]
        };
        for tag in tags {
            for n in 1..=per_subset {
                fixture.add_subject(SubjectKey::new(tag.map(str::to_string), n.to_string()), n);
            }
        }
        fixture
    }

    fn add_subject(&mut self, key: SubjectKey, n: usize) {
        let id = key.id.as_str();
        let gap = n % GAP_EVERY == 0;
        if !gap {
            let gender = if n % 2 == 0 { "F" } else { "M" };
            self.subjects
                .push(&key, &[id, "19600101", gender, WINDOW_START, WINDOW_END]);
        }

        let mut dependents = 0;
        for k in 0..=(n % 3) {
            let date = format!("2012{:02}{:02}", k + 1, (n % 28) + 1);
            self.events.push(&key, &[id, "VISIT", date.as_str(), "GP"]);
            dependents += 1;
        }
        if n % OUT_OF_WINDOW_EVERY == 0 {
            self.events.push(&key, &[id, "LATE", LATE_DATE, "GP"]);
            dependents += 1;
            if !gap {
                self.out_of_window += 1;
            }
        }
        if n % 2 == 0 {
            self.dispensings
                .push(&key, &[id, "20150310", "N02BE01", "30"]);
            dependents += 1;
        }
        let weight = (60 + n % 40).to_string();
        self.measurements
            .push(&key, &[id, "20140704", "WEIGHT", weight.as_str()]);
        dependents += 1;

        if gap {
            self.orphans += dependents;
        }
    }

    #[must_use]
    pub fn table(&self, ty: RecordType) -> &FixtureTable {
        match ty {
            RecordType::Subject => &self.subjects,
            RecordType::Event => &self.events,
            RecordType::Dispensing => &self.dispensings,
            RecordType::Measurement => &self.measurements,
        }
    }

    /// Dependent rows of every type.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.events.len() + self.dispensings.len() + self.measurements.len()
    }

    /// Subjects with a subject line.
    #[must_use]
    pub fn subject_count(&self) -> usize {
        self.subjects.len()
    }
}
