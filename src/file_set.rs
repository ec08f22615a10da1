//! Selection of at most one input file per record type.

use crate::config::EngineConfig;
use crate::descriptor::FileDescriptor;
use crate::error::EngineError;
use crate::io::glob::list_input_files;
use crate::schema::RecordType;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// The selected input files of one run, indexed by [`RecordType`].
#[derive(Clone, Debug, Default)]
pub struct FileSet {
    files: [Option<FileDescriptor>; 4],
}

impl FileSet {
    /// Inspect every regular file directly inside `dir` and select the usable ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed, or
    /// [`EngineError::MultipleFilesForType`] if two usable files share a type.
    pub fn from_directory(dir: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        let paths = list_input_files(dir)?;
        Self::from_files(paths, config)
    }

    /// Inspect an explicit list of files and select the usable ones.
    ///
    /// Unknown, invalid and header-only files are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MultipleFilesForType`] if two usable files share a type.
    pub fn from_files<I, P>(paths: I, config: &EngineConfig) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut set = Self::default();
        for path in paths {
            let desc = FileDescriptor::inspect(path.into(), &config.string_delimiter);
            set.select(desc)?;
        }
        Ok(set)
    }

    fn select(&mut self, desc: FileDescriptor) -> Result<()> {
        let Some(ty) = desc.record_type().filter(|_| desc.is_valid()) else {
            tracing::warn!(path = %desc.path().display(), "skipping file of unknown type");
            return Ok(());
        };
        if desc.is_header_only() {
            tracing::warn!(path = %desc.path().display(), record_type = %ty, "skipping header-only file");
            return Ok(());
        }
        if let Some(existing) = &self.files[ty.index()] {
            return Err(EngineError::MultipleFilesForType(
                ty,
                existing.path().display().to_string(),
                desc.path().display().to_string(),
            )
            .into());
        }
        tracing::info!(path = %desc.path().display(), record_type = %ty, bytes = desc.size_bytes(), "selected input file");
        self.files[ty.index()] = Some(desc);
        Ok(())
    }

    /// Substitute the file selected for the descriptor's type.
    ///
    /// Returns the descriptor previously selected for that type. Descriptors that are not
    /// valid are rejected and handed back unchanged.
    ///
    /// # Errors
    ///
    /// Returns the rejected descriptor if it is not usable.
    pub fn replace(&mut self, desc: FileDescriptor) -> Result<Option<FileDescriptor>, FileDescriptor> {
        match desc.record_type().filter(|_| desc.is_valid()) {
            Some(ty) => Ok(self.files[ty.index()].replace(desc)),
            None => Err(desc),
        }
    }

    #[must_use]
    pub fn get(&self, ty: RecordType) -> Option<&FileDescriptor> {
        self.files[ty.index()].as_ref()
    }

    /// The descriptor for `ty`, or [`EngineError::MissingRequiredFile`].
    ///
    /// # Errors
    ///
    /// Returns an error if no file of that type is selected.
    pub fn require(&self, ty: RecordType) -> Result<&FileDescriptor> {
        self.get(ty)
            .ok_or_else(|| EngineError::MissingRequiredFile(ty).into())
    }

    #[must_use]
    pub fn has(&self, ty: RecordType) -> bool {
        self.files[ty.index()].is_some()
    }

    /// Presence bits, see [`RecordType::bit`].
    #[must_use]
    pub fn presence_mask(&self) -> u8 {
        self.iter().fold(0, |mask, d| {
            mask | d.record_type().map_or(0, RecordType::bit)
        })
    }

    /// Total on-disk size of the selected files.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.iter().map(FileDescriptor::size_bytes).sum()
    }

    /// Selected descriptors in [`RecordType::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.files.iter().flatten()
    }

    /// Selected dependent-record descriptors in join order.
    pub fn dependents(&self) -> impl Iterator<Item = &FileDescriptor> {
        RecordType::DEPENDENT.into_iter().filter_map(|ty| self.get(ty))
    }
}
