//! Durable block allocation over the output file.
//!
//! This module owns the hard half of a segmented download: handing out
//! disjoint byte ranges to workers, landing their bytes at the right
//! offsets, and persisting enough state that an interrupted download picks
//! up where it left off.
//!
//! - [`file`] - the [`RangedFile`] coordinator and its lock discipline
//! - [`meta`] - the on-disk checkpoint format

pub mod file;
pub mod meta;

pub use file::{RangedFile, DEFAULT_BLOCK_HINT};
pub use meta::RangedFileMeta;
