//! Durable, concurrency-safe block allocator over an output file.
//!
//! [`RangedFile`] owns the destination file while a download runs. It
//! partitions the byte space into blocks, hands them out to workers,
//! writes received bytes at their block offsets, and checkpoints its own
//! state so an interrupted download resumes instead of starting over.
//!
//! Three locks keep the pieces independent: a meta lock guards the block
//! sets and counters (short, synchronous critical sections), a file lock
//! serializes positioned writes, and a dedicated lock serializes
//! checkpoint writes so serialization never blocks workers on the file
//! lock.
//!
//! On disk the download occupies `<target>.temp` (the data file, sized up
//! front) and `<target>.meta` (the checkpoint). Completing the download
//! renames the data file onto the target and deletes the checkpoint;
//! stopping early leaves both in place for a later resume.

use crate::error::{Error, Result};
use crate::range::{Block, BlockState, Range};
use crate::ranged_file::meta::{self, RangedFileMeta};
use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Default nominal block size, 1 MiB.
pub const DEFAULT_BLOCK_HINT: i64 = 0x0010_0000;

#[derive(Debug)]
struct MetaState {
    block_hint: i64,
    bytes_total: i64,
    bytes_processed: i64,
    available: BTreeMap<i64, Block>,
    pending: BTreeMap<i64, Block>,
    finished: BTreeMap<i64, Block>,
    path: Option<PathBuf>,
}

impl Default for MetaState {
    fn default() -> Self {
        Self {
            block_hint: DEFAULT_BLOCK_HINT,
            bytes_total: -1,
            bytes_processed: 0,
            available: BTreeMap::new(),
            pending: BTreeMap::new(),
            finished: BTreeMap::new(),
            path: None,
        }
    }
}

impl MetaState {
    fn has_blocks(&self) -> bool {
        !self.available.is_empty() || !self.pending.is_empty() || !self.finished.is_empty()
    }

    fn snapshot(&self) -> RangedFileMeta {
        RangedFileMeta::new(
            self.block_hint,
            self.bytes_total,
            self.bytes_processed,
            self.available.values().copied().collect(),
            self.pending.values().copied().collect(),
            self.finished.values().copied().collect(),
        )
    }

    /// Coalesces adjacent finished blocks. A fully downloaded file ends up
    /// with a single entry covering `[0, bytes_total - 1]`.
    fn merge_finished(&mut self) {
        let mut merged: BTreeMap<i64, Block> = BTreeMap::new();
        let mut acc: Option<Block> = None;
        for block in self.finished.values() {
            match acc {
                None => acc = Some(*block),
                Some(prev) if prev.range.mergeable(&block.range) => {
                    acc = Some(Block {
                        range: prev.range + block.range,
                        position: prev.position.max(block.position),
                        state: BlockState::Filled,
                    });
                }
                Some(prev) => {
                    merged.insert(prev.start(), prev);
                    acc = Some(*block);
                }
            }
        }
        if let Some(prev) = acc {
            merged.insert(prev.start(), prev);
        }
        if merged.len() != self.finished.len() {
            self.finished = merged;
        }
    }

    fn is_full(&self) -> bool {
        if self.finished.len() != 1 || self.bytes_total <= 0 {
            return false;
        }
        let block = self.finished.values().next().expect("len checked");
        block.start() == 0 && block.end() == self.bytes_total - 1
    }

    /// Completion check used by `close`. Partitioned downloads must have
    /// merged down to a single finished block; streaming downloads (no
    /// blocks ever created) must have written exactly the reserved length,
    /// or anything at all when the length was unknown.
    fn is_complete(&self) -> bool {
        if self.has_blocks() {
            return self.is_full();
        }
        self.bytes_total <= 0 || self.bytes_processed == self.bytes_total
    }
}

/// The durable output file of one download.
///
/// Lifecycle: [`reserve`](RangedFile::reserve) →
/// [`open`](RangedFile::open) → any number of concurrent
/// [`allocate`](RangedFile::allocate) / [`fill`](RangedFile::fill) /
/// [`deallocate`](RangedFile::deallocate) cycles with periodic
/// [`dump`](RangedFile::dump)s → [`close`](RangedFile::close).
#[derive(Debug)]
pub struct RangedFile {
    meta: Mutex<MetaState>,
    file: tokio::sync::Mutex<Option<File>>,
    meta_io: tokio::sync::Mutex<()>,
}

impl Default for RangedFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RangedFile {
    pub fn new() -> Self {
        Self {
            meta: Mutex::new(MetaState::default()),
            file: tokio::sync::Mutex::new(None),
            meta_io: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets the resource length and the nominal block size (1 MiB when
    /// `hint` is `None`). Must be called before [`open`](RangedFile::open);
    /// fails once the file is open or any block has been created.
    pub fn reserve(&self, total: i64, hint: Option<i64>) -> Result<()> {
        let hint = hint.unwrap_or(DEFAULT_BLOCK_HINT);
        if hint <= 0 {
            return Err(Error::InvalidParam);
        }

        let mut state = self.meta.lock().unwrap();
        if state.path.is_some() || state.has_blocks() || state.bytes_processed > 0 {
            return Err(Error::Runtime);
        }
        state.bytes_total = total;
        state.block_hint = hint;
        Ok(())
    }

    pub fn opened(&self) -> bool {
        self.meta.lock().unwrap().path.is_some()
    }

    /// Opens (creating if needed) `<target>.temp` and sizes it to the
    /// reserved length.
    ///
    /// When the data file already matches the reserved length and a
    /// checkpoint decodes with the same length and block size, the
    /// finished and available sets are restored from it. Blocks that were
    /// in flight when the checkpoint was written are re-queued whole —
    /// their bytes may or may not have reached disk, so they are fetched
    /// again. A checkpoint that fails to cover the file exactly is
    /// discarded and the download starts over.
    pub async fn open(&self, target: &Path) -> Result<()> {
        let (total, hint) = {
            let state = self.meta.lock().unwrap();
            if state.path.is_some() {
                return Err(Error::Runtime);
            }
            (state.bytes_total, state.block_hint)
        };

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::from_io(&e, Some(target)))?;
            }
        }

        let data = meta::data_path(target);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&data)
            .await
            .map_err(|e| Error::from_io(&e, Some(&data)))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| Error::from_io(&e, Some(&data)))?
            .len() as i64;

        let mut restored = None;
        if size != total {
            file.set_len(total.max(0) as u64)
                .await
                .map_err(|e| Error::from_io(&e, Some(&data)))?;
            // whatever the old checkpoint described, it is not this file
            let _ = fs::remove_file(meta::meta_path(target)).await;
        } else if let Some(archive) = meta::load(&meta::meta_path(target)).await {
            if archive.block_hint == hint && archive.bytes_total == total {
                restored = Some(archive);
            }
        }

        {
            let mut state = self.meta.lock().unwrap();
            if let Some(archive) = restored {
                Self::restore(&mut state, archive, total);
            }
            state.path = Some(target.to_path_buf());
        }
        *self.file.lock().await = Some(file);
        Ok(())
    }

    /// Installs a decoded checkpoint into `state`, abandoning in-flight
    /// blocks. No-op when the restored partition fails validation.
    fn restore(state: &mut MetaState, archive: RangedFileMeta, total: i64) {
        let mut processed = archive.bytes_processed;
        let mut available: BTreeMap<i64, Block> = archive
            .available
            .iter()
            .map(|b| (b.start(), Block::new(b.range)))
            .collect();
        let finished: BTreeMap<i64, Block> =
            archive.finished.iter().map(|b| (b.start(), *b)).collect();

        // bytes written into an interrupted block may not have hit the disk;
        // re-fetching the whole block is the only safe policy
        for block in &archive.pending {
            processed -= block.position - block.start();
            available.insert(block.start(), Block::new(block.range));
        }

        let mut ranges: Vec<Range> = available
            .values()
            .chain(finished.values())
            .map(|b| b.range)
            .collect();
        ranges.sort();
        let contiguous = !ranges.is_empty()
            && ranges[0].start == 0
            && ranges.windows(2).all(|w| w[1].start == w[0].end + 1)
            && ranges.last().expect("non-empty").end == total - 1;
        let coherent = finished.values().all(|b| b.is_filled()) && processed >= 0;

        if contiguous && coherent {
            debug!(
                finished = finished.len(),
                available = available.len(),
                processed,
                "resuming from checkpoint"
            );
            state.available = available;
            state.finished = finished;
            state.bytes_processed = processed;
        } else {
            warn!("checkpoint does not cover the file, starting over");
        }
    }

    /// Takes one block from the available set, or `None` when every block
    /// is checked out or finished. The first call builds the partition:
    /// contiguous blocks of the nominal size covering the whole file, the
    /// last one possibly shorter.
    pub fn allocate(&self) -> Option<Block> {
        let mut state = self.meta.lock().unwrap();
        if state.bytes_total <= 0 {
            return None;
        }

        if !state.has_blocks() {
            let mut start = 0;
            while start < state.bytes_total {
                let end = (start + state.block_hint - 1).min(state.bytes_total - 1);
                state.available.insert(start, Block::new(Range::new(start, end)));
                start = end + 1;
            }
        }

        let (_, mut block) = state.available.pop_first()?;
        block.state = BlockState::Pending;
        block.position = block.start();
        state.pending.insert(block.start(), block);
        Some(block)
    }

    /// Returns a block checked out by [`allocate`](RangedFile::allocate).
    ///
    /// An untouched block goes back to the available set whole; a filled
    /// block joins the finished set; a partially filled block is split at
    /// its cursor, the written prefix finished and the rest re-queued.
    /// The finished set is re-coalesced after every insertion.
    pub fn deallocate(&self, block: &Block) -> Result<()> {
        let mut state = self.meta.lock().unwrap();
        let entry = state
            .pending
            .remove(&block.start())
            .ok_or(Error::Runtime)?;

        match block.state {
            BlockState::Unfilled => {
                // not a legal hand-back; restore the entry so the
                // partition stays intact
                state.pending.insert(entry.start(), entry);
                Err(Error::Runtime)
            }
            BlockState::Pending => {
                state
                    .available
                    .insert(block.start(), Block::new(block.range));
                Ok(())
            }
            BlockState::Filled => {
                debug_assert_eq!(block.position, block.end() + 1);
                state.finished.insert(block.start(), *block);
                state.merge_finished();
                Ok(())
            }
            BlockState::Partial => {
                debug_assert!(block.start() < block.position && block.position <= block.end());
                let done = Range::new(block.start(), block.position - 1);
                let rest = Range::new(block.position, block.end());
                state.finished.insert(
                    done.start,
                    Block {
                        range: done,
                        position: block.position,
                        state: BlockState::Filled,
                    },
                );
                state.available.insert(rest.start, Block::new(rest));
                state.merge_finished();
                Ok(())
            }
        }
    }

    /// Writes `bytes` at the block's cursor and advances it.
    ///
    /// The write must stay inside the block. Writing less than the block's
    /// remainder is fine — a worker interrupted mid-body hands back a
    /// partial block and the remainder is re-queued on deallocation.
    pub async fn fill(&self, block: &mut Block, bytes: &[u8]) -> Result<()> {
        if !block.range.valid()
            || matches!(block.state, BlockState::Unfilled | BlockState::Filled)
        {
            return Err(Error::Runtime);
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let n = bytes.len() as i64;
        if block.position + n > block.end() + 1 {
            return Err(Error::InvalidParam);
        }

        {
            let mut guard = self.file.lock().await;
            let file = guard.as_mut().ok_or(Error::Runtime)?;
            if let Err(e) = file.seek(SeekFrom::Start(block.position as u64)).await {
                return Err(self.io_error(&e));
            }
            if let Err(e) = file.write_all(bytes).await {
                return Err(self.io_error(&e));
            }
        }

        block.advance(n);
        let mut state = self.meta.lock().unwrap();
        if let Some(entry) = state.pending.get_mut(&block.start()) {
            entry.position = block.position;
            entry.state = block.state;
        }
        state.bytes_processed += n;
        Ok(())
    }

    /// Appends `bytes` at the current file position. Used by the
    /// single-stream path; no block bookkeeping.
    pub async fn fill_streaming(&self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }

        {
            let mut guard = self.file.lock().await;
            let file = guard.as_mut().ok_or(Error::Runtime)?;
            if let Err(e) = file.write_all(bytes).await {
                return Err(self.io_error(&e));
            }
        }

        self.meta.lock().unwrap().bytes_processed += bytes.len() as i64;
        Ok(())
    }

    /// Rewinds the streaming path to a clean slate so an aborted transfer
    /// can be re-issued from the first byte.
    pub(crate) async fn rewind(&self) -> Result<()> {
        let total = {
            let state = self.meta.lock().unwrap();
            state.bytes_total
        };

        {
            let mut guard = self.file.lock().await;
            let file = guard.as_mut().ok_or(Error::Runtime)?;
            if let Err(e) = file.set_len(total.max(0) as u64).await {
                return Err(self.io_error(&e));
            }
            if let Err(e) = file.seek(SeekFrom::Start(0)).await {
                return Err(self.io_error(&e));
            }
        }

        self.meta.lock().unwrap().bytes_processed = 0;
        Ok(())
    }

    /// Checkpoints the partition state to `<target>.meta`.
    ///
    /// The snapshot is taken under the meta lock and serialized after
    /// releasing it, so a dump never stalls workers. The file replacement
    /// goes through `<target>.meta.temp` and a rename; a crash leaves at
    /// most a stray staging file, which later opens ignore.
    pub async fn dump(&self) -> Result<()> {
        let (snapshot, target) = {
            let state = self.meta.lock().unwrap();
            let Some(path) = state.path.clone() else {
                return Err(Error::Runtime);
            };
            (state.snapshot(), path)
        };
        let bytes = snapshot.encode().ok_or(Error::Runtime)?;

        let _io = self.meta_io.lock().await;
        let staging = meta::meta_temp_path(&target);
        let dst = meta::meta_path(&target);
        fs::write(&staging, &bytes)
            .await
            .map_err(|e| Error::from_io(&e, Some(&staging)))?;
        if let Err(e) = fs::remove_file(&dst).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(Error::from_io(&e, Some(&dst)));
            }
        }
        fs::rename(&staging, &dst)
            .await
            .map_err(|e| Error::from_io(&e, Some(&dst)))?;
        Ok(())
    }

    /// True when the finished set has collapsed to the single range
    /// covering the whole file.
    pub fn is_full(&self) -> bool {
        self.meta.lock().unwrap().is_full()
    }

    /// Bytes written so far. Monotone within a run; a progress figure,
    /// not an exact accounting (re-queued partial blocks are not
    /// subtracted until the next restore).
    pub fn processed(&self) -> i64 {
        self.meta.lock().unwrap().bytes_processed
    }

    /// The reserved resource length, `-1` when unknown.
    pub fn total(&self) -> i64 {
        self.meta.lock().unwrap().bytes_total
    }

    /// Closes the output file.
    ///
    /// With `finished` set the download must be complete; the data file is
    /// renamed onto the target and the checkpoint deleted. Otherwise a
    /// final checkpoint is written and both sidecar files stay on disk for
    /// a future resume. In-memory state is cleared either way.
    pub async fn close(&self, finished: bool) -> Result<()> {
        let (target, complete, has_blocks) = {
            let state = self.meta.lock().unwrap();
            (state.path.clone(), state.is_complete(), state.has_blocks())
        };

        if !finished && has_blocks && target.is_some() {
            if let Err(e) = self.dump().await {
                warn!(error = %e, "final checkpoint failed, resume may refetch more");
            }
        }

        let file = self.file.lock().await.take();
        if finished {
            if let Some(file) = &file {
                let _ = file.sync_all().await;
            }
        }
        drop(file);

        let result = if finished {
            match &target {
                Some(target) if complete => {
                    let outcome = fs::rename(meta::data_path(target), target)
                        .await
                        .map_err(|e| Error::from_io(&e, Some(target)));
                    if outcome.is_ok() {
                        if let Err(e) = fs::remove_file(meta::meta_path(target)).await {
                            if e.kind() != std::io::ErrorKind::NotFound {
                                warn!(error = %e, "leaving stale checkpoint behind");
                            }
                        }
                    }
                    outcome
                }
                _ => Err(Error::Runtime),
            }
        } else {
            Ok(())
        };

        *self.meta.lock().unwrap() = MetaState::default();
        result
    }

    fn io_error(&self, err: &std::io::Error) -> Error {
        let state = self.meta.lock().unwrap();
        Error::from_io(err, state.path.as_deref())
    }

    #[cfg(test)]
    pub(crate) fn block_counts(&self) -> (usize, usize, usize) {
        let state = self.meta.lock().unwrap();
        (
            state.available.len(),
            state.pending.len(),
            state.finished.len(),
        )
    }

    #[cfg(test)]
    pub(crate) fn partition_bytes(&self) -> i64 {
        let state = self.meta.lock().unwrap();
        state
            .available
            .values()
            .chain(state.pending.values())
            .chain(state.finished.values())
            .map(|b| b.range.size())
            .sum()
    }

    #[cfg(test)]
    pub(crate) fn finished_ranges(&self) -> Vec<Range> {
        let state = self.meta.lock().unwrap();
        state.finished.values().map(|b| b.range).collect()
    }
}
