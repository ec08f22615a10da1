//! Inspection of raw input files.
//!
//! A [`FileDescriptor`] is built once from the first non-blank line of a file. It records
//! the sniffed field delimiter, the record type implied by the header, and the column maps
//! that later stages use to pull identifiers, dates and payload fields out of data lines.
//!
//! Delimiter sniffing is a heuristic: quote characters are stripped from the header and
//! comma, tab, semicolon and the configured multi-character token are tried in that order.
//! The first candidate that splits the header into more than one field is adopted. A header
//! that no candidate splits leaves the descriptor without a delimiter and the file unusable.
//!
//! ```no_run
//! use cohortbeam::descriptor::FileDescriptor;
//! use cohortbeam::schema::RecordType;
//!
//! let desc = FileDescriptor::inspect("population.csv", "|~|");
//! if desc.record_type() == Some(RecordType::Subject) {
//!     println!("{} columns", desc.header().len());
//! }
//! ```

use crate::ident::SubjectKey;
use crate::io::{LineEnding, LineReader};
use crate::schema::{ID_COLUMN, RecordType, SUBSET_COLUMN};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Field separator of a delimited file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
    Semicolon,
    /// A configured multi-character separator.
    Token(String),
}

impl Delimiter {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Comma => ",",
            Self::Tab => "\t",
            Self::Semicolon => ";",
            Self::Token(token) => token,
        }
    }

    /// Pick the first candidate (comma, tab, semicolon, `token`) that splits `line` into
    /// more than one field.
    #[must_use]
    pub fn sniff(line: &str, token: &str) -> Option<Self> {
        let candidates = [
            Self::Comma,
            Self::Tab,
            Self::Semicolon,
            Self::Token(token.to_string()),
        ];
        candidates.into_iter().find(|d| {
            let sep = d.as_str();
            !sep.is_empty() && line.split(sep).nth(1).is_some()
        })
    }

    /// Split `line` into trimmed fields with quote characters removed.
    #[must_use]
    pub fn split(&self, line: &str) -> Vec<String> {
        line.split(self.as_str())
            .map(|field| field.replace('"', "").trim().to_string())
            .collect()
    }
}

/// Everything learned about one input file from its header.
#[derive(Clone, Debug)]
pub struct FileDescriptor {
    path: PathBuf,
    delimiter: Option<Delimiter>,
    record_type: Option<RecordType>,
    header: Vec<String>,
    columns: HashMap<String, usize>,
    mandatory: Option<Vec<usize>>,
    extras: BTreeMap<usize, String>,
    id_index: Option<usize>,
    subset_index: Option<usize>,
    line_ending: LineEnding,
    size_bytes: u64,
    header_only: bool,
}

impl FileDescriptor {
    /// Inspect the file at `path`.
    ///
    /// Never fails: an unreadable file is logged and yields a descriptor with no header,
    /// which [`FileDescriptor::is_valid`] reports as unusable.
    pub fn inspect(path: impl AsRef<Path>, string_delimiter: &str) -> Self {
        let path = path.as_ref().to_path_buf();
        let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        let mut desc = Self {
            path,
            delimiter: None,
            record_type: None,
            header: Vec::new(),
            columns: HashMap::new(),
            mandatory: None,
            extras: BTreeMap::new(),
            id_index: None,
            subset_index: None,
            line_ending: LineEnding::default(),
            size_bytes,
            header_only: false,
        };
        match desc.read_header(string_delimiter) {
            Ok(()) => tracing::debug!(
                path = %desc.path.display(),
                record_type = ?desc.record_type,
                delimiter = ?desc.delimiter,
                columns = desc.header.len(),
                "inspected input file"
            ),
            Err(err) => tracing::error!(
                path = %desc.path.display(),
                error = %err,
                "cannot inspect input file"
            ),
        }
        desc
    }

    fn read_header(&mut self, string_delimiter: &str) -> Result<()> {
        let mut reader = LineReader::open(&self.path)?;
        let Some(first) = reader.next_line()? else {
            self.header_only = true;
            return Ok(());
        };
        let line = first.replace('"', "");
        self.line_ending = reader.last_ending().unwrap_or_default();

        let Some(delimiter) = Delimiter::sniff(&line, string_delimiter) else {
            tracing::warn!(path = %self.path.display(), "no delimiter splits the header");
            return Ok(());
        };
        let header = delimiter.split(&line);
        self.header_only = reader.at_end()?;
        self.delimiter = Some(delimiter);
        self.apply_header(header);
        Ok(())
    }

    fn apply_header(&mut self, header: Vec<String>) {
        for (idx, name) in header.iter().enumerate() {
            self.columns.entry(name.to_lowercase()).or_insert(idx);
        }
        let names: HashSet<String> = self.columns.keys().cloned().collect();

        self.id_index = self.columns.get(ID_COLUMN).copied();
        self.subset_index = self.columns.get(SUBSET_COLUMN).copied();
        self.record_type = RecordType::classify(&names);
        self.mandatory = self.record_type.and_then(|ty| {
            ty.mandatory_columns()
                .iter()
                .map(|col| self.columns.get(*col).copied())
                .collect::<Option<Vec<_>>>()
        });

        if let Some(mandatory) = &self.mandatory {
            self.extras = header
                .iter()
                .enumerate()
                .filter(|(idx, _)| !mandatory.contains(idx) && Some(*idx) != self.subset_index)
                .map(|(idx, name)| (idx, name.clone()))
                .collect();
        }
        self.header = header;
    }

    /// Usable as input: delimiter found, type recognized, all mandatory columns present.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.delimiter.is_some() && self.record_type.is_some() && self.mandatory.is_some()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn delimiter(&self) -> Option<&Delimiter> {
        self.delimiter.as_ref()
    }

    /// Inferred type; `None` means unknown.
    #[must_use]
    pub fn record_type(&self) -> Option<RecordType> {
        self.record_type
    }

    /// Header field names as written (quotes stripped, trimmed).
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Index of a column by case-insensitive name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.get(&name.trim().to_lowercase()).copied()
    }

    /// Field indices of the mandatory columns, in schema order.
    #[must_use]
    pub fn mandatory_indices(&self) -> Option<&[usize]> {
        self.mandatory.as_deref()
    }

    /// Non-mandatory columns (excluding the subset column), by field index.
    #[must_use]
    pub fn extra_columns(&self) -> &BTreeMap<usize, String> {
        &self.extras
    }

    #[must_use]
    pub fn id_index(&self) -> Option<usize> {
        self.id_index
    }

    #[must_use]
    pub fn subset_index(&self) -> Option<usize> {
        self.subset_index
    }

    #[must_use]
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// On-disk size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// True when the file has a header and no data lines (or is entirely blank).
    #[must_use]
    pub fn is_header_only(&self) -> bool {
        self.header_only
    }

    /// Split a data line with this file's delimiter.
    #[must_use]
    pub fn split(&self, line: &str) -> Vec<String> {
        match &self.delimiter {
            Some(d) => d.split(line),
            None => vec![line.trim().to_string()],
        }
    }

    /// Subject key of a split data line, or `None` if the identifier field is absent.
    #[must_use]
    pub fn key_of(&self, fields: &[String]) -> Option<SubjectKey> {
        let id = fields.get(self.id_index?)?;
        let subset = self
            .subset_index
            .and_then(|idx| fields.get(idx))
            .cloned();
        Some(SubjectKey::new(subset, id.clone()))
    }

    /// Mandatory field values of a split line in schema order, or `None` if any is missing.
    #[must_use]
    pub fn mandatory_values<'a>(&self, fields: &'a [String]) -> Option<Vec<&'a str>> {
        self.mandatory
            .as_ref()?
            .iter()
            .map(|&idx| fields.get(idx).map(String::as_str))
            .collect()
    }

    /// `(column name, value)` pairs of the extra columns present on a split line.
    #[must_use]
    pub fn extra_values(&self, fields: &[String]) -> Vec<(String, String)> {
        self.extras
            .iter()
            .map(|(&idx, name)| (name.clone(), fields.get(idx).cloned().unwrap_or_default()))
            .collect()
    }

    /// Reader positioned after the header line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn data_lines(&self) -> Result<LineReader> {
        LineReader::open_skipping_header(&self.path)
    }

    /// Whether every data line is ordered non-decreasingly by `(subset, identifier)`.
    ///
    /// Lines without an identifier field are ignored. Streams the whole file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn probe_sorted(&self) -> Result<bool> {
        if self.id_index.is_none() {
            return Ok(false);
        }
        let mut lines = self.data_lines()?;
        let mut previous: Option<SubjectKey> = None;
        while let Some(line) = lines.next_line()? {
            let fields = self.split(line);
            let Some(key) = self.key_of(&fields) else {
                continue;
            };
            if previous.as_ref().is_some_and(|prev| key < *prev) {
                tracing::debug!(
                    path = %self.path.display(),
                    line = lines.line_number(),
                    "input file is not sorted"
                );
                return Ok(false);
            }
            previous = Some(key);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_prefers_comma_over_later_candidates() {
        assert_eq!(Delimiter::sniff("a,b;c", "|~|"), Some(Delimiter::Comma));
        assert_eq!(Delimiter::sniff("a;b\tc", "|~|"), Some(Delimiter::Tab));
        assert_eq!(Delimiter::sniff("a;b", "|~|"), Some(Delimiter::Semicolon));
        assert_eq!(
            Delimiter::sniff("a|~|b", "|~|"),
            Some(Delimiter::Token("|~|".into()))
        );
        assert_eq!(Delimiter::sniff("abc", "|~|"), None);
    }

    #[test]
    fn split_strips_quotes_and_whitespace() {
        let fields = Delimiter::Comma.split(r#""1", "A" ,x"#);
        assert_eq!(fields, vec!["1", "A", "x"]);
    }
}
