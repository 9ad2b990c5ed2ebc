//! Download orchestration.
//!
//! [`Downloader::download`] composes the whole engine: probe the URL,
//! choose between a single streamed connection and parallel ranged
//! connections, run the workers, and finalize the output file. The
//! ranged path is a small supervisor/worker system: each worker pulls
//! blocks from the shared [`RangedFile`] until the partition runs dry,
//! while the supervisor reports progress, checkpoints state and decides
//! when a pile of failed workers means the download itself has failed.
//!
//! Cancellation is cooperative. A shared three-state flag starts at
//! `Running`; the progress callback returning `false` moves it to
//! `Cancelled`, the supervisor's failure aggregation moves it to
//! `Failed`, and nothing ever moves it back. Workers poll the flag
//! between chunks and between blocks.

use super::config::{DownloaderConfig, ProgressCallback};
use crate::error::{classify, middleware_transport, Error, Result};
use crate::http::client::{create_http_client, HttpClientConfig};
use crate::http::probe::{probe, DEFAULT_PROBE_TIMEOUT};
use crate::range::Block;
use crate::ranged_file::RangedFile;

use futures::StreamExt;
use reqwest::header::RANGE;
use reqwest::Url;
use reqwest_middleware::ClientWithMiddleware;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Minimum gap between two checkpoints.
const DUMP_PERIOD: std::time::Duration = std::time::Duration::from_secs(5);

/// Pause before re-attempting after a transient failure.
const RETRY_PAUSE: std::time::Duration = std::time::Duration::from_millis(500);

/// Shared run state. Only ever leaves `Running` once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelState {
    Running = 0,
    Failed = 1,
    Cancelled = 2,
}

#[derive(Debug)]
pub(crate) struct CancelFlag(AtomicU8);

impl CancelFlag {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(CancelState::Running as u8))
    }

    pub(crate) fn get(&self) -> CancelState {
        match self.0.load(Ordering::SeqCst) {
            0 => CancelState::Running,
            1 => CancelState::Failed,
            _ => CancelState::Cancelled,
        }
    }

    pub(crate) fn running(&self) -> bool {
        self.get() == CancelState::Running
    }

    /// `Running -> Cancelled`; a no-op in any other state.
    pub(crate) fn cancel(&self) {
        let _ = self.0.compare_exchange(
            CancelState::Running as u8,
            CancelState::Cancelled as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// `Running -> Failed`; a no-op in any other state.
    pub(crate) fn fail(&self) {
        let _ = self.0.compare_exchange(
            CancelState::Running as u8,
            CancelState::Failed as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerStatus {
    Running,
    Finished,
    Interrupted,
}

#[derive(Debug)]
struct WorkerState {
    status: WorkerStatus,
    error: Option<Error>,
}

type WorkerStates = Arc<Vec<Mutex<WorkerState>>>;

/// True when the resource should be streamed on one connection: length
/// unknown, no range support, or too small to be worth splitting.
pub(crate) fn use_direct_mode(
    length: i64,
    supports_ranges: bool,
    block_size: i64,
    small_file_cutoff: i64,
) -> bool {
    length < 0 || length <= block_size || !supports_ranges || length < small_file_cutoff
}

/// Picks the most frequent error; ties resolve to the highest code.
/// `None` when the iterator is empty.
fn modal_error(errors: impl IntoIterator<Item = Error>) -> Option<Error> {
    let mut counts: BTreeMap<u32, (Error, usize)> = BTreeMap::new();
    for error in errors {
        counts.entry(error.code()).or_insert((error, 0)).1 += 1;
    }
    counts
        .into_values()
        .max_by_key(|(_, count)| *count)
        .map(|(error, _)| error)
}

/// The download controller.
///
/// Created through [`DownloaderBuilder`](super::DownloaderBuilder):
///
/// ```rust
/// use braid::DownloaderBuilder;
///
/// let downloader = DownloaderBuilder::new().connections(8).build();
/// ```
#[derive(Debug, Clone)]
pub struct Downloader {
    config: DownloaderConfig,
}

impl Downloader {
    pub(crate) fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn connections(&self) -> usize {
        self.config.connections
    }

    pub fn block_size(&self) -> i64 {
        self.config.block_size
    }

    /// Downloads `url` to `path`.
    ///
    /// While the download runs, `path.temp` holds the data and `path.meta`
    /// the resume checkpoint. On success only `path` remains; on failure
    /// both sidecars stay behind and a later call picks up from them.
    ///
    /// The progress callback is invoked with `(total, processed)` byte
    /// counts; returning `false` cancels the download with
    /// [`Error::OperationInterrupted`].
    pub async fn download(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let path = path.as_ref();
        let url = Url::parse(url).map_err(|_| Error::InvalidParam)?;
        if self.config.connections == 0 || self.config.block_size <= 0 {
            return Err(Error::InvalidParam);
        }

        let started = Instant::now();
        let flag = Arc::new(CancelFlag::new());

        let attribute = if self.config.connections > 1 {
            let client = self.build_client().map_err(|_| Error::Runtime)?;
            Some(self.probe_with_retry(&client, &url, started).await?)
        } else {
            None
        };

        // a finished file from an earlier run is stale, not resumable
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(?path, "removed existing destination"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::from_io(&e, Some(path))),
        }

        let file = Arc::new(RangedFile::new());
        let result = self
            .run(&url, path, &file, &flag, progress, attribute, started)
            .await;

        // the file is finalized on every exit path; a close failure only
        // surfaces when the download itself had none
        match file.close(result.is_ok()).await {
            Err(close_error) if result.is_ok() => Err(close_error),
            _ => result,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        url: &Url,
        path: &Path,
        file: &Arc<RangedFile>,
        flag: &Arc<CancelFlag>,
        progress: Option<ProgressCallback>,
        attribute: Option<crate::http::FileAttribute>,
        started: Instant,
    ) -> Result<()> {
        let (length, supports_ranges) = match &attribute {
            Some(a) => (a.content_length, a.supports_ranges()),
            None => (-1, false),
        };

        if use_direct_mode(
            length,
            supports_ranges,
            self.config.block_size,
            self.config.small_file_cutoff,
        ) {
            debug!(length, supports_ranges, "using direct mode");
            self.download_direct(url, path, file, flag, progress, length, started)
                .await
        } else {
            debug!(
                length,
                connections = self.config.connections,
                block_size = self.config.block_size,
                "using ranged mode"
            );
            self.download_ranged(url, path, file, flag, progress, length, started)
                .await
        }
    }

    fn build_client(&self) -> std::result::Result<ClientWithMiddleware, reqwest::Error> {
        create_http_client(HttpClientConfig {
            headers: self.config.headers.clone(),
            accept_invalid_certs: self.config.accept_invalid_certs,
            ..Default::default()
        })
    }

    async fn probe_with_retry(
        &self,
        client: &ClientWithMiddleware,
        url: &Url,
        started: Instant,
    ) -> Result<crate::http::FileAttribute> {
        loop {
            match probe(client, url, DEFAULT_PROBE_TIMEOUT).await {
                Ok(attribute) => return Ok(attribute),
                Err(Error::Network) if started.elapsed() < self.config.timeout => {
                    debug!(%url, "probe hit a network error, retrying");
                    sleep(RETRY_PAUSE).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Single-connection streaming download.
    #[allow(clippy::too_many_arguments)]
    async fn download_direct(
        &self,
        url: &Url,
        path: &Path,
        file: &Arc<RangedFile>,
        flag: &Arc<CancelFlag>,
        progress: Option<ProgressCallback>,
        length: i64,
        started: Instant,
    ) -> Result<()> {
        file.reserve(length, None)?;
        file.open(path).await?;

        let client = self.build_client().map_err(|_| Error::Runtime)?;
        let mut first_attempt = true;
        loop {
            if !first_attempt {
                // an aborted stream cannot be spliced; start the body over
                file.rewind().await?;
            }
            first_attempt = false;

            match self
                .stream_once(&client, url, file, flag, progress.as_ref(), length)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && started.elapsed() < self.config.timeout => {
                    debug!(error = %e, "transfer failed, retrying");
                    sleep(RETRY_PAUSE).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn stream_once(
        &self,
        client: &ClientWithMiddleware,
        url: &Url,
        file: &Arc<RangedFile>,
        flag: &Arc<CancelFlag>,
        progress: Option<&ProgressCallback>,
        length: i64,
    ) -> Result<()> {
        let cancelled = || flag.get() == CancelState::Cancelled;

        let response = match client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                return Err(classify(None, middleware_transport(&e), None, cancelled())
                    .unwrap_or(Error::Network))
            }
        };
        if let Some(err) = classify(Some(response.status()), None, None, cancelled()) {
            return Err(err);
        }

        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            // cancellation outranks a transport failure on the same chunk
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Err(
                        classify(None, Some(&e), None, cancelled()).unwrap_or(Error::Network)
                    )
                }
            };
            if let Some(err) = classify(None, None, None, cancelled()) {
                return Err(err);
            }
            file.fill_streaming(&chunk).await?;
            if let Some(callback) = progress {
                if !callback(length.max(0), file.processed()) {
                    flag.cancel();
                    return Err(Error::OperationInterrupted);
                }
            }
        }

        // a short body is a broken connection the transport did not report
        if length > 0 && file.processed() != length {
            return Err(Error::Network);
        }
        Ok(())
    }

    /// Parallel ranged download: `connections` workers over a shared
    /// block partition, one supervisor.
    #[allow(clippy::too_many_arguments)]
    async fn download_ranged(
        &self,
        url: &Url,
        path: &Path,
        file: &Arc<RangedFile>,
        flag: &Arc<CancelFlag>,
        progress: Option<ProgressCallback>,
        length: i64,
        started: Instant,
    ) -> Result<()> {
        file.reserve(length, Some(self.config.block_size))?;
        file.open(path).await?;

        let connections = self.config.connections;
        // every worker gets an independent session; build them up front so
        // a client error fails the download before anything is spawned
        let mut clients = Vec::with_capacity(connections);
        for _ in 0..connections {
            clients.push(self.build_client().map_err(|_| Error::Runtime)?);
        }

        let states: WorkerStates = Arc::new(
            (0..connections)
                .map(|_| {
                    Mutex::new(WorkerState {
                        status: WorkerStatus::Running,
                        error: None,
                    })
                })
                .collect(),
        );

        let mut handles = Vec::with_capacity(connections);
        for (id, client) in clients.into_iter().enumerate() {
            let worker = Worker {
                id,
                url: url.clone(),
                client,
                file: Arc::clone(file),
                flag: Arc::clone(flag),
                states: Arc::clone(&states),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        let error = self
            .supervise(file, flag, progress.as_ref(), &states, length, started)
            .await;

        for handle in handles {
            let _ = handle.await;
        }

        match error {
            Some(e) => Err(e),
            None if file.is_full() => Ok(()),
            None => {
                // the partition drained but gaps remain (workers bailed
                // while re-queued remainders were still in flight)
                let snapshot = snapshot_states(&states);
                Err(modal_error(snapshot.iter().filter_map(|(_, e)| *e))
                    .unwrap_or(Error::Runtime))
            }
        }
    }

    async fn supervise(
        &self,
        file: &Arc<RangedFile>,
        flag: &Arc<CancelFlag>,
        progress: Option<&ProgressCallback>,
        states: &WorkerStates,
        length: i64,
        started: Instant,
    ) -> Option<Error> {
        let mut last_dump = Instant::now();

        while flag.running() && !file.is_full() {
            let snapshot = snapshot_states(states);
            let all_exited = snapshot
                .iter()
                .all(|(status, _)| *status != WorkerStatus::Running);

            if all_exited {
                let clean = snapshot.iter().all(|(_, error)| error.is_none());
                if clean {
                    // partition drained; completeness is checked by the caller
                    break;
                }
                // failed workers only fail the download once the retry
                // budget is spent and nobody is making progress
                if started.elapsed() > self.config.timeout {
                    let errors: Vec<Error> =
                        snapshot.iter().filter_map(|(_, error)| *error).collect();
                    let error = if errors.len() == snapshot.len() {
                        modal_error(errors).unwrap_or(Error::Runtime)
                    } else {
                        errors.first().copied().unwrap_or(Error::Runtime)
                    };
                    warn!(error = %error, "all workers stopped, failing the download");
                    flag.fail();
                    return Some(error);
                }
            }

            if let Some(callback) = progress {
                if !callback(length.max(0), file.processed()) {
                    flag.cancel();
                    return Some(Error::OperationInterrupted);
                }
            }

            if last_dump.elapsed() >= DUMP_PERIOD {
                match file.dump().await {
                    Ok(()) => last_dump = Instant::now(),
                    Err(e) => warn!(error = %e, "checkpoint failed"),
                }
            }

            sleep(self.config.interval).await;
        }

        // one final report so observers see the finished figure
        if flag.running() && file.is_full() {
            if let Some(callback) = progress {
                let _ = callback(length.max(0), file.processed());
            }
        }
        None
    }
}

fn snapshot_states(states: &WorkerStates) -> Vec<(WorkerStatus, Option<Error>)> {
    states
        .iter()
        .map(|state| {
            let guard = state.lock().unwrap();
            (guard.status, guard.error)
        })
        .collect()
}

/// One download worker: allocate a block, fetch its byte range, land the
/// bytes, hand the block back. Repeats until the partition runs dry or
/// the shared flag leaves `Running`.
struct Worker {
    id: usize,
    url: Url,
    client: ClientWithMiddleware,
    file: Arc<RangedFile>,
    flag: Arc<CancelFlag>,
    states: WorkerStates,
}

impl Worker {
    async fn run(self) {
        let mut fatal: Option<Error> = None;

        while self.flag.running() {
            let Some(mut block) = self.file.allocate() else {
                break;
            };

            let outcome = self.fetch_block(&mut block).await;

            // the block goes back whatever happened; a partial fill is
            // split and its remainder re-queued
            if let Err(e) = self.file.deallocate(&block) {
                warn!(worker = self.id, block = %block, error = %e, "deallocate failed");
                fatal = Some(e);
                break;
            }

            match outcome {
                Ok(()) => {}
                Err(e) if e.is_retryable() => {
                    debug!(worker = self.id, block = %block, error = %e, "block failed, re-queued");
                    sleep(RETRY_PAUSE).await;
                }
                Err(e) => {
                    warn!(worker = self.id, block = %block, error = %e, "worker stopping");
                    fatal = Some(e);
                    break;
                }
            }
        }

        let mut state = self.states[self.id].lock().unwrap();
        match fatal {
            Some(error) => {
                state.status = WorkerStatus::Interrupted;
                state.error = Some(error);
            }
            None => state.status = WorkerStatus::Finished,
        }
    }

    async fn fetch_block(&self, block: &mut Block) -> Result<()> {
        let cancelled = || self.flag.get() == CancelState::Cancelled;

        let range = format!("bytes={}-{}", block.start(), block.end());
        let response = match self
            .client
            .get(self.url.clone())
            .header(RANGE, range)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Err(classify(None, middleware_transport(&e), None, cancelled())
                    .unwrap_or(Error::Network))
            }
        };
        if let Some(err) = classify(Some(response.status()), None, None, cancelled()) {
            return Err(err);
        }

        let mut stream = response.bytes_stream();
        while let Some(item) = stream.next().await {
            // cancellation outranks a transport failure on the same chunk
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    return Err(
                        classify(None, Some(&e), None, cancelled()).unwrap_or(Error::Network)
                    )
                }
            };
            if let Some(err) = classify(None, None, None, cancelled()) {
                return Err(err);
            }
            if self.flag.get() == CancelState::Failed {
                // partial fill is handed back as-is; the run is over
                return Ok(());
            }

            // never write past the block, even if the server over-delivers
            let take = (chunk.len() as i64).min(block.remaining()).max(0) as usize;
            self.file.fill(block, &chunk[..take]).await?;
            if block.is_filled() {
                break;
            }
        }
        Ok(())
    }
}
