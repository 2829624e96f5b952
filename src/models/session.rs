//! Represents a chunked upload in flight.

use chrono::{DateTime, Utc};
use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// In-memory state of one chunked upload, owned by the session registry
/// and shared with request handlers behind an `Arc`.
///
/// The seal gate orders chunk writes against finalize: chunk writers hold
/// the read side while writing their blob, finalize takes the write side
/// and flips the flag. Once sealed, a session accepts no further chunks
/// and cannot be finalized a second time.
#[derive(Debug)]
pub struct UploadSession {
    /// Opaque token issued at init, never reused.
    pub upload_id: Uuid,

    /// Filename as the client sent it.
    pub original_filename: String,

    /// Collision-resistant name the final file will be stored under.
    pub stored_filename: String,

    /// Total size declared by the client at init. Not enforced.
    pub declared_total_size: i64,

    /// Scratch directory holding chunk blobs until finalize.
    pub staging_dir: PathBuf,

    pub client_id: String,
    pub created_at: DateTime<Utc>,

    chunks_received: AtomicU64,
    gate: RwLock<bool>,
}

impl UploadSession {
    pub fn new(
        upload_id: Uuid,
        original_filename: String,
        stored_filename: String,
        declared_total_size: i64,
        client_id: String,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            upload_id,
            original_filename,
            stored_filename,
            declared_total_size,
            staging_dir,
            client_id,
            created_at: Utc::now(),
            chunks_received: AtomicU64::new(0),
            gate: RwLock::new(false),
        }
    }

    /// Increment the received-chunk counter.
    ///
    /// Counts calls, not distinct chunk numbers: re-sending a chunk bumps
    /// the counter again even though the blob is overwritten.
    pub fn record_chunk(&self) -> u64 {
        self.chunks_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks_received.load(Ordering::Relaxed)
    }

    /// Acquire a shared guard for writing one chunk.
    ///
    /// Returns `None` if the session has been sealed by finalize or the
    /// reaper. The guard must be held for the duration of the blob write.
    pub async fn begin_chunk(&self) -> Option<RwLockReadGuard<'_, bool>> {
        let gate = self.gate.read().await;
        if *gate { None } else { Some(gate) }
    }

    /// Seal the session, waiting out any in-flight chunk writes.
    ///
    /// Returns `None` if already sealed. Holding the returned guard keeps
    /// new chunk writers excluded while finalize reads the staging dir.
    pub async fn seal(&self) -> Option<RwLockWriteGuard<'_, bool>> {
        let mut gate = self.gate.write().await;
        if *gate {
            None
        } else {
            *gate = true;
            Some(gate)
        }
    }
}
