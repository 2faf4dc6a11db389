//! Resumable chunked downloads.
//!
//! A transfer fetches `{size, hash}` from the peer, decides whether earlier
//! progress still applies, downloads every chunk not yet recorded under the
//! current hash with a bounded set of concurrent workers, and finally hashes
//! the whole file before marking the message successful.
//!
//! Each finished chunk is written, synced and then recorded as a
//! [`FilePart`]; a recorded part is never fetched again while the remote
//! hash and the chunk size stay the same.

pub mod dest;
pub mod io;
pub mod plan;
pub mod progress;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::try_join_all;
use futures::StreamExt;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use localshare_shared::constants::{PROGRESS_INTERVAL_MS, ROUTE_DOWNLOAD, ROUTE_DOWNLOAD_INFO};
use localshare_shared::hash::hash_file_async;
use localshare_shared::types::DownloadInfo;
use localshare_store::{DeviceMessage, FilePart, Store};

use crate::error::TransferError;
use crate::notifications::{Notifications, TransferEvent};

use self::plan::{plan_chunks, ChunkCursor, ChunkRange};
use self::progress::ProgressTracker;

#[derive(Debug)]
pub enum TransferOutcome {
    /// Downloaded and verified.
    Completed(DeviceMessage),
    /// Another transfer for this message is in flight; nothing was done.
    AlreadyRunning,
}

struct Inner {
    store: Store,
    client: reqwest::Client,
    notifications: Notifications,
    download_dir: PathBuf,
    in_flight: Mutex<HashSet<i64>>,
    progress: ProgressTracker,
}

#[derive(Clone)]
pub struct TransferEngine {
    inner: Arc<Inner>,
}

/// Marks a message id as in flight until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<i64>>,
    message_id: i64,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<i64>>, message_id: i64) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(message_id);
        inserted.then_some(Self { set, message_id })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.message_id);
    }
}

/// Shared state of the workers of one transfer.
struct ChunkJob {
    message_id: i64,
    url: String,
    hash: String,
    total: u64,
    file: Arc<File>,
    cursor: ChunkCursor,
    /// Bytes of recorded chunks, resumed ones included.
    completed: AtomicU64,
}

impl TransferEngine {
    pub fn new(
        store: Store,
        client: reqwest::Client,
        notifications: Notifications,
        download_dir: PathBuf,
    ) -> Self {
        let progress = ProgressTracker::new(
            notifications.progress.clone(),
            Duration::from_millis(PROGRESS_INTERVAL_MS),
        );
        Self {
            inner: Arc::new(Inner {
                store,
                client,
                notifications,
                download_dir,
                in_flight: Mutex::new(HashSet::new()),
                progress,
            }),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.inner.download_dir
    }

    pub fn is_running(&self, message_id: i64) -> bool {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&message_id)
    }

    /// Bytes handled so far for every running transfer.
    pub fn progress_snapshot(&self) -> HashMap<i64, u64> {
        self.inner.progress.snapshot()
    }

    /// Run [`download`](Self::download) in the background. Failures are
    /// logged and published on the progress hub, never returned.
    pub fn spawn_download(&self, message_id: i64) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Ok(TransferOutcome::Completed(message)) = engine.download(message_id).await {
                debug!(message_id, path = ?message.save_path, "Background transfer finished");
            }
        })
    }

    /// Download the file of received message `message_id`, resuming from
    /// recorded parts when the remote content is unchanged.
    pub async fn download(&self, message_id: i64) -> Result<TransferOutcome, TransferError> {
        let Some(_guard) = InFlight::acquire(&self.inner.in_flight, message_id) else {
            debug!(message_id, "Transfer already in flight");
            return Ok(TransferOutcome::AlreadyRunning);
        };

        let result = self.run(message_id).await;
        self.inner.progress.finish(message_id);

        match &result {
            Ok(message) => {
                let save_path = message.save_path.clone().unwrap_or_default();
                info!(message_id, path = %save_path, "Transfer complete");
                self.inner
                    .notifications
                    .progress
                    .publish(&TransferEvent::Completed {
                        message_id,
                        save_path: PathBuf::from(save_path),
                    });
            }
            Err(e) => {
                error!(message_id, error = %e, "Transfer failed");
                self.inner.notifications.progress.publish(&TransferEvent::Failed {
                    message_id,
                    reason: e.to_string(),
                });
            }
        }

        result.map(TransferOutcome::Completed)
    }

    async fn run(&self, message_id: i64) -> Result<DeviceMessage, TransferError> {
        let store = &self.inner.store;

        let mut message = store.message(message_id).await?;
        let filename = message
            .filename
            .clone()
            .ok_or(TransferError::NoFile(message_id))?;
        let remote_id = message.opposite_id.ok_or(TransferError::NoPeer(message_id))?;
        let device_id = message.device_id.ok_or(TransferError::NoPeer(message_id))?;
        let base = store
            .device(device_id)
            .await?
            .base_url()
            .ok_or(TransferError::NoPeer(message_id))?;

        let info = self.fetch_info(&base, remote_id).await?;
        let settings = store.transfer_settings().await?;

        let dest = self.prepare(&mut message, &info, &filename).await?;
        let mut message = store.save_message(message).await?;

        let plan = plan_chunks(info.size, settings.chunk_size);
        let mut recorded: HashSet<(u64, u64)> = store
            .file_parts(message_id, &info.hash)
            .await?
            .into_iter()
            .map(|part| (part.start, part.end))
            .collect();
        let planned: HashSet<(u64, u64)> = plan.iter().map(|c| (c.start, c.end)).collect();
        if !recorded.is_subset(&planned) {
            // Chunk size changed since those parts were recorded.
            info!(
                message_id,
                chunk_size = settings.chunk_size,
                "Chunk layout changed, discarding recorded parts"
            );
            message.download_size = 0;
            message = store
                .transaction(move |store| async move {
                    store.clear_file_parts(message_id).await?;
                    store.save_message(message).await
                })
                .await?;
            recorded.clear();
        }
        let (done, pending): (Vec<ChunkRange>, Vec<ChunkRange>) = plan
            .into_iter()
            .partition(|c| recorded.contains(&(c.start, c.end)));
        let resumed: u64 = done.iter().map(ChunkRange::byte_len).sum();

        info!(
            message_id,
            size = info.size,
            chunks = done.len() + pending.len(),
            pending = pending.len(),
            resumed_bytes = resumed,
            path = %dest.display(),
            "Starting transfer"
        );
        self.inner.progress.start(message_id, resumed, info.size);

        let file = io::open_sized(&dest, info.size).await?;
        if !pending.is_empty() {
            let job = Arc::new(ChunkJob {
                message_id,
                url: format!("{base}{ROUTE_DOWNLOAD}?messageId={remote_id}"),
                hash: info.hash.clone(),
                total: info.size,
                file,
                cursor: ChunkCursor::new(pending),
                completed: AtomicU64::new(resumed),
            });
            let workers = settings.concurrency.clamp(1, job.cursor.len());
            try_join_all((0..workers).map(|_| self.worker(job.clone()))).await?;
        }

        let actual = hash_file_async(&dest).await?;
        if actual != info.hash {
            // Every recorded part is suspect now; the next attempt starts over.
            message.download_size = 0;
            message.download_success = false;
            store
                .transaction(move |store| async move {
                    store.save_message(message).await?;
                    store.clear_file_parts(message_id).await
                })
                .await?;
            return Err(TransferError::Integrity {
                expected: info.hash,
                actual,
            });
        }

        message.download_success = true;
        message.size = Some(info.size);
        message.download_size = info.size;
        let message = store.save_message(message).await?;
        self.inner.notifications.messages.publish(&message);
        Ok(message)
    }

    async fn fetch_info(&self, base: &str, remote_id: i64) -> Result<DownloadInfo, TransferError> {
        let url = format!("{base}{ROUTE_DOWNLOAD_INFO}?messageId={remote_id}");
        let response = self
            .inner
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransferError::Metadata(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Metadata(format!("{url} returned {status}")));
        }
        response
            .json::<DownloadInfo>()
            .await
            .map_err(|e| TransferError::Metadata(e.to_string()))
    }

    /// Decide where the file goes and whether earlier progress still counts,
    /// updating `message` accordingly. Nothing is persisted here except the
    /// removal of parts when the run does not resume.
    async fn prepare(
        &self,
        message: &mut DeviceMessage,
        info: &DownloadInfo,
        filename: &str,
    ) -> Result<PathBuf, TransferError> {
        let message_id = message.id.unwrap_or_default();
        let previous = message.save_path.as_ref().map(PathBuf::from);
        let same_hash = message.file_hash.as_deref() == Some(info.hash.as_str());

        let dest = match previous {
            Some(path) if same_hash && path.is_file() => {
                debug!(message_id, path = %path.display(), "Resuming transfer");
                path
            }
            previous => {
                if same_hash {
                    warn!(message_id, "Partial file is gone, restarting transfer");
                } else if message.file_hash.is_some() {
                    info!(message_id, "Remote content changed, restarting transfer");
                }
                // Parts under any hash describe bytes this run will overwrite.
                self.inner.store.clear_file_parts(message_id).await?;
                message.download_size = 0;
                message.file_hash = Some(info.hash.clone());
                match previous {
                    Some(path) if dest::is_reusable(&path) => path,
                    _ => self.reserve(filename).await?,
                }
            }
        };

        message.size = Some(info.size);
        message.download_success = false;
        message.save_path = Some(dest.to_string_lossy().into_owned());
        Ok(dest)
    }

    async fn reserve(&self, filename: &str) -> Result<PathBuf, TransferError> {
        let dir = self.inner.download_dir.clone();
        let filename = filename.to_string();
        let path = tokio::task::spawn_blocking(move || dest::reserve_destination(&dir, &filename))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
        Ok(path)
    }

    async fn worker(&self, job: Arc<ChunkJob>) -> Result<(), TransferError> {
        while let Some(range) = job.cursor.claim() {
            if let Err(e) = self.fetch_chunk(&job, range).await {
                warn!(
                    message_id = job.message_id,
                    start = range.start,
                    end = range.end,
                    error = %e,
                    "Chunk failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    async fn fetch_chunk(&self, job: &ChunkJob, range: ChunkRange) -> Result<(), TransferError> {
        let response = self
            .inner
            .client
            .get(&job.url)
            .header(RANGE, range.header_value())
            .send()
            .await?;

        let status = response.status();
        let whole_file = range.start == 0 && range.end + 1 == job.total;
        if status != StatusCode::PARTIAL_CONTENT && !(status == StatusCode::OK && whole_file) {
            return Err(TransferError::UnexpectedStatus {
                status: status.as_u16(),
                start: range.start,
                end: range.end,
            });
        }

        let expected = range.byte_len();
        let mut received = 0u64;
        let mut body = response.bytes_stream();
        while let Some(bytes) = body.next().await {
            let bytes = bytes?;
            let n = bytes.len() as u64;
            if received + n > expected {
                return Err(TransferError::Overrun {
                    start: range.start,
                    end: range.end,
                    expected,
                });
            }
            io::write_at(job.file.clone(), bytes, range.start + received).await?;
            received += n;
            self.inner.progress.advance(job.message_id, n);
        }

        if received != expected {
            return Err(TransferError::ShortRead {
                start: range.start,
                end: range.end,
                expected,
                received,
            });
        }

        io::sync(job.file.clone()).await?;
        let completed = job.completed.fetch_add(expected, Ordering::SeqCst) + expected;
        self.inner
            .store
            .record_file_part(
                FilePart::new(job.message_id, job.hash.clone(), range.start, range.end),
                completed,
            )
            .await?;

        debug!(
            message_id = job.message_id,
            start = range.start,
            end = range.end,
            "Chunk recorded"
        );
        Ok(())
    }
}
