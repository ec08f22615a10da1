//! Transparent decompression of input files.
//!
//! Input files are opened through [`open_reader`], which picks a codec by file extension
//! first and falls back to magic bytes. Files without a recognized codec are read as-is.
//!
//! ## Built-in Codecs
//!
//! - **Gzip** (`.gz`) - via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` (feature: `compression-zstd`)
//!
//! Further codecs can be added at runtime with [`register_codec`]:
//!
//! ```
//! use cohortbeam::io::compression::{register_codec, CompressionCodec};
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! struct Passthrough;
//!
//! impl CompressionCodec for Passthrough {
//!     fn name(&self) -> &str { "passthrough" }
//!     fn extensions(&self) -> &[&str] { &[".raw"] }
//!     fn magic_bytes(&self) -> Option<&[u8]> { None }
//!     fn wrap_reader_dyn(&self, r: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
//!         Ok(r)
//!     }
//! }
//!
//! register_codec(Arc::new(Passthrough));
//! ```

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Read buffer used for every input file.
const READ_BUFFER: usize = 1 << 16;

static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
    ]
}

fn registry() -> Vec<Arc<dyn CompressionCodec>> {
    if let Ok(lock) = CODEC_REGISTRY.read()
        && let Some(codecs) = lock.as_ref()
    {
        return codecs.clone();
    }
    match CODEC_REGISTRY.write() {
        Ok(mut lock) => lock.get_or_insert_with(init_registry).clone(),
        Err(_) => init_registry(),
    }
}

/// Register an additional decompression codec for every subsequent [`open_reader`] call.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    if let Ok(mut lock) = CODEC_REGISTRY.write() {
        lock.get_or_insert_with(init_registry).push(codec);
    }
}

/// Pluggable decompression codec.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &str;

    /// Lower-case file extensions including the leading dot.
    fn extensions(&self) -> &[&str];

    /// Signature at the start of a compressed stream, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;
}

fn detect_from_extension(path: &Path) -> Option<Arc<dyn CompressionCodec>> {
    let name = path.to_string_lossy().to_lowercase();
    registry()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| name.ends_with(ext)))
}

fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    registry().into_iter().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| buf.len() >= magic.len() && buf.starts_with(magic))
    })
}

/// Open `path` for buffered reading, decompressing when a codec matches.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the codec fails to initialize.
pub fn open_reader(path: impl AsRef<Path>) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;

    if let Some(codec) = detect_from_extension(path) {
        let inner = codec
            .wrap_reader_dyn(Box::new(file))
            .with_context(|| format!("wrap {} with {} codec", path.display(), codec.name()))?;
        return Ok(Box::new(BufReader::with_capacity(READ_BUFFER, inner)));
    }

    let mut buffered = BufReader::with_capacity(READ_BUFFER, file);
    if let Some(codec) = detect_from_magic(&mut buffered) {
        let inner = codec
            .wrap_reader_dyn(Box::new(buffered))
            .with_context(|| format!("wrap {} with {} codec", path.display(), codec.name()))?;
        return Ok(Box::new(BufReader::with_capacity(READ_BUFFER, inner)));
    }

    Ok(Box::new(buffered))
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        // Multi-member streams are common for concatenated exports.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        Ok(Box::new(zstd::stream::read::Decoder::new(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_file_passes_through() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("plain.csv");
        std::fs::write(&path, "a,b\n1,2\n")?;
        let mut s = String::new();
        open_reader(&path)?.read_to_string(&mut s)?;
        assert_eq!(s, "a,b\n1,2\n");
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_detected_by_magic_without_extension() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("events.data");
        let mut enc = flate2::write::GzEncoder::new(
            File::create(&path)?,
            flate2::Compression::default(),
        );
        enc.write_all(b"subjectid,eventtype,date\n1,X,20200101\n")?;
        enc.finish()?;

        let mut s = String::new();
        open_reader(&path)?.read_to_string(&mut s)?;
        assert!(s.starts_with("subjectid,eventtype,date"));
        Ok(())
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn zstd_detected_by_extension() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("events.csv.zst");
        let bytes = zstd::encode_all(&b"h1,h2\nv1,v2\n"[..], 3)?;
        std::fs::write(&path, bytes)?;

        let mut s = String::new();
        open_reader(&path)?.read_to_string(&mut s)?;
        assert_eq!(s, "h1,h2\nv1,v2\n");
        Ok(())
    }
}
