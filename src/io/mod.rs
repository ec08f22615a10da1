//! Input plumbing: codec detection, line reading and file discovery.

pub mod compression;
pub mod glob;
pub mod lines;

pub use lines::{LineEnding, LineReader};
