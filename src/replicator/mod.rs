//! An async streaming file writer that downloads a single remote object into
//! a local log file, opportunistically mirroring the trailing "last page"
//! bytes into an in-memory buffer as they fly past.

mod chunk_source;


pub use chunk_source::{ChunkSource, StreamChunkSource};

use std::path::PathBuf;
use std::sync::Mutex;

use bytes::Bytes;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{EngineError, EngineResult};

/// Content-length metadata captured at handshake time, before any bytes
/// arrive.
#[derive(Debug, Clone, Copy)]
pub struct ResponseMeta {
    pub content_length: u64,
}

/// The outcome of a completed (or failed) download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    pub bytes_written: u64,
    pub last_page_bytes_captured: usize,
}

/// The lifecycle state of a single download, guarded by the same mutex as
/// the byte counters. Kept as an explicit field rather than inferring state
/// from the semaphore's permit count, which would conflate "not yet started"
/// with "finished."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplicatorState {
    Idle,
    Writing,
    Closing,
    Done,
    Failed,
}

struct LastPage {
    start: u64,
    buf: Vec<u8>,
    written: usize,
}

impl LastPage {
    /// Implements the "last-page capture" arithmetic: copies whatever
    /// portion of a chunk landing at `[chunk_start, chunk_start + chunk.len())`
    /// falls within `[start, start + buf.len())`.
    fn capture(&mut self, chunk: &[u8], chunk_start: u64) -> EngineResult<()> {
        let w = chunk.len() as u64;
        let end = chunk_start + w;
        if end < self.start {
            return Ok(());
        }

        let dst_offset = chunk_start.saturating_sub(self.start) as usize;
        if dst_offset >= self.buf.len() {
            return Ok(());
        }
        let src_offset = self.start.saturating_sub(chunk_start) as usize;

        let remaining_dst = self.buf.len() - dst_offset;
        let remaining_src = chunk.len().saturating_sub(src_offset);
        let length = remaining_dst.min(remaining_src);
        if length == 0 {
            return Ok(());
        }
        if src_offset + length > chunk.len() {
            return Err(EngineError::invariant(
                "last-page capture would read past the chunk's end",
            ));
        }

        self.buf[dst_offset..dst_offset + length]
            .copy_from_slice(&chunk[src_offset..src_offset + length]);
        self.written += length;
        Ok(())
    }
}

struct Inner {
    state: ReplicatorState,
    position: u64,
    content_length: Option<u64>,
    last_page: Option<LastPage>,
}

/// Streams one remote object into `path`, created with create-exclusive
/// semantics (refuses to overwrite an existing file).
pub struct PageReplicator {
    path: PathBuf,
    semaphore: Semaphore,
    inner: Mutex<Inner>,
    task: Mutex<Option<JoinHandle<EngineResult<WriteResult>>>>,
}

impl PageReplicator {
    pub fn new(path: PathBuf, last_page_start: Option<u64>, last_page_len: usize) -> Self {
        let last_page = last_page_start.map(|start| LastPage {
            start,
            buf: vec![0u8; last_page_len],
            written: 0,
        });
        Self {
            path,
            semaphore: Semaphore::new(1),
            inner: Mutex::new(Inner {
                state: ReplicatorState::Idle,
                position: 0,
                content_length: None,
                last_page,
            }),
            task: Mutex::new(None),
        }
    }

    /// Captures the content length reported at handshake.
    pub fn on_response(&self, meta: ResponseMeta) {
        self.inner.lock().unwrap().content_length = Some(meta.content_length);
    }

    pub fn content_length(&self) -> Option<u64> {
        self.inner.lock().unwrap().content_length
    }

    /// A snapshot of the in-memory last-page buffer as captured so far.
    pub fn last_page_snapshot(&self) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .last_page
            .as_ref()
            .map(|p| p.buf.clone())
    }

    /// Opens the file and begins pulling chunks from `source` on a
    /// background task. Returns immediately; call [`PageReplicator::complete`]
    /// to block until the download settles.
    pub fn on_stream<S>(replicator: &std::sync::Arc<Self>, mut source: S)
    where
        S: ChunkSource + 'static,
    {
        let this = std::sync::Arc::clone(replicator);
        let handle = tokio::spawn(async move { this.run(&mut source).await });
        *replicator.task.lock().unwrap() = Some(handle);
    }

    /// Blocks until the pending write settles (successfully or not), then
    /// reports how much was written. Consumes the in-flight task; calling
    /// this twice without an intervening `on_stream` is a logic error in the
    /// caller, not something this type guards against.
    pub async fn complete(&self) -> EngineResult<WriteResult> {
        let handle = self
            .task
            .lock()
            .unwrap()
            .take()
            .expect("complete() called before on_stream()");
        let result = handle
            .await
            .map_err(|e| EngineError::invariant(format!("replicator task panicked: {}", e)))?;

        // The token is only released after the write loop's final action
        // (the close, on success, or the delete, on failure); acquiring it
        // here guarantees that action has already happened.
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("replicator semaphore is never closed");
        result
    }

    async fn run(&self, source: &mut dyn ChunkSource) -> EngineResult<WriteResult> {
        self.set_state(ReplicatorState::Writing);

        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                self.set_state(ReplicatorState::Failed);
                return Err(EngineError::from(e));
            }
        };

        match self.write_all_chunks(file, source).await {
            Ok(result) => {
                self.set_state(ReplicatorState::Done);
                Ok(result)
            }
            Err(e) => {
                self.on_exception().await;
                Err(e)
            }
        }
    }

    async fn write_all_chunks(
        &self,
        mut file: File,
        source: &mut dyn ChunkSource,
    ) -> EngineResult<WriteResult> {
        loop {
            let chunk = source.next_chunk().await;
            let permit = self
                .semaphore
                .acquire()
                .await
                .expect("replicator semaphore is never closed");
            match chunk {
                None => {
                    self.set_state(ReplicatorState::Closing);
                    file.sync_all().await?;
                    drop(permit);
                    break;
                }
                Some(Err(e)) => {
                    drop(permit);
                    return Err(e);
                }
                Some(Ok(bytes)) => {
                    let chunk_start = self.write_chunk(&mut file, &bytes).await?;
                    self.capture_last_page(&bytes, chunk_start)?;
                    drop(permit);
                }
            }
        }

        let inner = self.inner.lock().unwrap();
        let last_page_bytes_captured = inner
            .last_page
            .as_ref()
            .map(|p| p.written)
            .unwrap_or(0);
        Ok(WriteResult {
            bytes_written: inner.position,
            last_page_bytes_captured,
        })
    }

    async fn write_chunk(&self, file: &mut File, chunk: &Bytes) -> EngineResult<u64> {
        file.write_all(chunk).await?;
        let mut inner = self.inner.lock().unwrap();
        let chunk_start = inner.position;
        inner.position += chunk.len() as u64;
        Ok(chunk_start)
    }

    fn capture_last_page(&self, chunk: &Bytes, chunk_start: u64) -> EngineResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(last_page) = inner.last_page.as_mut() {
            last_page.capture(chunk, chunk_start)?;
        }
        Ok(())
    }

    /// Closes (force-syncing if the file was opened) and deletes the
    /// partial file. Safe to call even if the file was never opened.
    async fn on_exception(&self) {
        self.set_state(ReplicatorState::Failed);
        let _ = fs::remove_file(&self.path).await;
    }

    fn set_state(&self, state: ReplicatorState) {
        self.inner.lock().unwrap().state = state;
    }
}
