//! Discovery of candidate input files in a working directory.

use anyhow::{Context, Result};
use glob::{Pattern, glob};
use std::path::{Path, PathBuf};

/// List the regular files directly inside `dir`, sorted for deterministic processing.
///
/// Subdirectories (including the engine's own scratch and output areas) are skipped.
///
/// # Errors
///
/// Returns an error if the directory path cannot be turned into a pattern or an entry
/// cannot be read.
pub fn list_input_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    list_matching(dir, "*")
}

/// List the regular files directly inside `dir` whose names match `file_pattern`, sorted.
///
/// `dir` is escaped; `file_pattern` is used as given.
///
/// # Errors
///
/// Returns an error if the pattern is invalid or an entry cannot be read.
pub fn list_matching(dir: impl AsRef<Path>, file_pattern: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let escaped = Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{escaped}/{file_pattern}");
    let entries = glob(&pattern).with_context(|| format!("invalid glob pattern: {pattern}"))?;

    let mut files = Vec::new();
    for entry in entries {
        let path =
            entry.with_context(|| format!("error reading glob entry for pattern: {pattern}"))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_top_level_files_sorted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("b.csv"), "x")?;
        std::fs::write(dir.path().join("a.csv"), "x")?;
        std::fs::create_dir(dir.path().join("split"))?;
        std::fs::write(dir.path().join("split").join("c.csv"), "x")?;

        let files = list_input_files(dir.path())?;
        let names: Vec<_> = files
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
        Ok(())
    }

    #[test]
    fn matching_filters_by_name() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("A_subjectObjects_1.txt"), "x")?;
        std::fs::write(dir.path().join("A_subjectObjects_2.csv"), "x")?;
        std::fs::write(dir.path().join("notes.txt"), "x")?;

        let files = list_matching(dir.path(), "*_subjectObjects_*.txt")?;
        assert_eq!(files, vec![dir.path().join("A_subjectObjects_1.txt")]);
        Ok(())
    }
}
