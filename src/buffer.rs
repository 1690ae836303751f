//! # Observation Buffer
//!
//! Ordered, mutex-guarded accumulation of observations from every sampler.
//!
//! When an append leaves the buffer holding more than `max_items`
//! observations, the whole content is taken out, the buffer is reset to
//! empty, and the batch is handed to the uploader on its own task. The lock
//! is released before the upload is dispatched, so a slow endpoint never
//! stalls the samplers.
//!
//! The comparison is strict: with `max_items = 3` the fourth append flushes
//! a batch of four.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, warn};

use crate::error::RelayError;
use crate::sampler::ObservationSink;
use crate::source::Observation;
use crate::upload::BatchUploader;

/// Counters describing buffer activity since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Observations accepted by `append`
    pub appended: u64,
    /// Batches handed to the uploader
    pub flushed_batches: u64,
    /// Observations dropped by `clear`
    pub discarded: u64,
}

/// Shared threshold buffer
pub struct Buffer {
    items: Mutex<Vec<Observation>>,
    max_items: usize,
    uploader: Arc<dyn BatchUploader>,
    appended: AtomicU64,
    flushed_batches: AtomicU64,
    discarded: AtomicU64,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("max_items", &self.max_items)
            .finish_non_exhaustive()
    }
}

impl Buffer {
    /// Create an empty buffer flushing to `uploader`
    pub fn new(max_items: usize, uploader: Arc<dyn BatchUploader>) -> Self {
        Self {
            items: Mutex::new(Vec::with_capacity(max_items.saturating_add(1))),
            max_items,
            uploader,
            appended: AtomicU64::new(0),
            flushed_batches: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Observation>> {
        // Appends are push-and-maybe-take; a panic mid-append cannot leave
        // the vector torn, so a poisoned lock is still usable.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one observation, flushing if the threshold is exceeded
    ///
    /// Never blocks on network I/O. Must be called from within a Tokio
    /// runtime for a flush to be dispatched.
    pub fn append(&self, observation: Observation) {
        debug!(kind = %observation.kind, "{}", observation.text);

        let batch = {
            let mut items = self.lock();
            items.push(observation);
            if items.len() > self.max_items {
                Some(std::mem::replace(
                    &mut *items,
                    Vec::with_capacity(self.max_items.saturating_add(1)),
                ))
            } else {
                None
            }
        };
        self.appended.fetch_add(1, Ordering::Relaxed);

        if let Some(batch) = batch {
            self.dispatch(batch);
        }
    }

    /// Hand a batch to the uploader on a separate task
    fn dispatch(&self, batch: Vec<Observation>) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(items = batch.len(), "Dropping batch, no async runtime: {}", e);
                return;
            }
        };

        self.flushed_batches.fetch_add(1, Ordering::Relaxed);
        debug!(items = batch.len(), "Flushing batch");

        let uploader = Arc::clone(&self.uploader);
        handle.spawn(async move {
            let items = batch.len();
            match uploader.send(batch).await {
                Ok(report) => {
                    debug!(items, status = report.status, attempts = report.attempts, "Batch delivered");
                }
                Err(e @ RelayError::Serialization(_)) => {
                    error!(items, "Dropping batch that cannot be encoded: {}", e);
                }
                Err(e) => {
                    warn!(items, "Dropping batch after failed upload: {}", e);
                }
            }
        });
    }

    /// Drop everything currently buffered without uploading it
    ///
    /// Returns the number of observations discarded.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut items = self.lock();
            let dropped = items.len();
            items.clear();
            dropped
        };
        self.discarded.fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Flush threshold
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Copy of the buffered texts, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().map(|obs| obs.text.clone()).collect()
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            appended: self.appended.load(Ordering::Relaxed),
            flushed_batches: self.flushed_batches.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

impl ObservationSink for Buffer {
    fn append(&self, observation: Observation) {
        Buffer::append(self, observation);
    }
}
