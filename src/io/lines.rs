//! Line-oriented reading of delimited text files.

use crate::io::compression::open_reader;
use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// End-of-line marker detected on a file's header line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// Streams the lines of one file, reusing a single buffer.
///
/// Returned lines have their `\n` / `\r\n` terminator removed. Blank lines are skipped.
/// Bytes that are not valid UTF-8 are replaced with `U+FFFD` instead of failing the read.
pub struct LineReader {
    path: PathBuf,
    inner: Box<dyn BufRead>,
    raw: Vec<u8>,
    buf: String,
    line_no: u64,
    last_ending: Option<LineEnding>,
}

impl LineReader {
    /// Open `path` (decompressing if needed).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = open_reader(&path)?;
        Ok(Self {
            path,
            inner,
            raw: Vec::new(),
            buf: String::new(),
            line_no: 0,
            last_ending: None,
        })
    }

    /// Open `path` and consume its first non-blank line as the header.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn open_skipping_header(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = Self::open(path)?;
        reader.next_line()?;
        Ok(reader)
    }

    /// Next non-blank line, or `None` at end of file.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn next_line(&mut self) -> Result<Option<&str>> {
        loop {
            self.raw.clear();
            let n = self
                .inner
                .read_until(b'\n', &mut self.raw)
                .with_context(|| format!("read line {} of {}", self.line_no + 1, self.path.display()))?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let mut end = self.raw.len();
            let mut ending = None;
            if self.raw.ends_with(b"\n") {
                end -= 1;
                ending = Some(LineEnding::Lf);
                if self.raw[..end].ends_with(b"\r") {
                    end -= 1;
                    ending = Some(LineEnding::CrLf);
                }
            }
            self.last_ending = ending;
            self.buf.clear();
            self.buf.push_str(&String::from_utf8_lossy(&self.raw[..end]));

            if !self.buf.trim().is_empty() {
                return Ok(Some(self.buf.as_str()));
            }
        }
    }

    /// Whether another non-blank line follows, consuming nothing observable except blanks.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn at_end(&mut self) -> Result<bool> {
        loop {
            let buf = self
                .inner
                .fill_buf()
                .with_context(|| format!("read {}", self.path.display()))?;
            if buf.is_empty() {
                return Ok(true);
            }
            let blank = buf
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            if blank < buf.len() {
                return Ok(false);
            }
            self.inner.consume(blank);
        }
    }

    /// Terminator of the most recently returned line, if it had one.
    #[must_use]
    pub fn last_ending(&self) -> Option<LineEnding> {
        self.last_ending
    }

    /// 1-based number of the most recently returned physical line.
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.line_no
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
