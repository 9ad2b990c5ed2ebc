//! On-disk checkpoint format for a ranged file.
//!
//! The checkpoint is a bincode payload carrying a magic number and a format
//! version ahead of the partition state. Decoding is strict: junk bytes, a
//! foreign magic, or a version from another build all yield `None` and the
//! caller falls back to a fresh download. There is no best-effort migration
//! between versions; re-fetching a partial file is cheaper than trusting a
//! half-understood archive.

use crate::range::Block;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub(crate) const META_MAGIC: u32 = 0x4252_4431;
pub(crate) const META_VERSION: u32 = 1;

/// Serializable snapshot of a ranged file's partition state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangedFileMeta {
    magic: u32,
    version: u32,
    pub block_hint: i64,
    pub bytes_total: i64,
    pub bytes_processed: i64,
    pub available: Vec<Block>,
    pub pending: Vec<Block>,
    pub finished: Vec<Block>,
}

impl RangedFileMeta {
    pub fn new(
        block_hint: i64,
        bytes_total: i64,
        bytes_processed: i64,
        available: Vec<Block>,
        pending: Vec<Block>,
        finished: Vec<Block>,
    ) -> Self {
        Self {
            magic: META_MAGIC,
            version: META_VERSION,
            block_hint,
            bytes_total,
            bytes_processed,
            available,
            pending,
            finished,
        }
    }

    pub fn encode(&self) -> Option<Vec<u8>> {
        bincode::serialize(self).ok()
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let meta: Self = bincode::deserialize(bytes).ok()?;
        if meta.magic != META_MAGIC || meta.version != META_VERSION {
            debug!(
                magic = meta.magic,
                version = meta.version,
                "discarding checkpoint from an incompatible build"
            );
            return None;
        }
        Some(meta)
    }
}

/// `<target>.temp` — the sparse data file written during the download.
pub(crate) fn data_path(target: &Path) -> PathBuf {
    append_suffix(target, ".temp")
}

/// `<target>.meta` — the checkpoint archive.
pub(crate) fn meta_path(target: &Path) -> PathBuf {
    append_suffix(target, ".meta")
}

/// `<target>.meta.temp` — staging file for atomic checkpoint replacement.
pub(crate) fn meta_temp_path(target: &Path) -> PathBuf {
    append_suffix(target, ".meta.temp")
}

fn append_suffix(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Reads and decodes a checkpoint, `None` when missing or unreadable.
pub(crate) async fn load(path: &Path) -> Option<RangedFileMeta> {
    let bytes = tokio::fs::read(path).await.ok()?;
    RangedFileMeta::decode(&bytes)
}
