//! In-memory registry of chunked uploads in flight.
//!
//! The registry owns every `UploadSession` exclusively and hands out `Arc`
//! clones to request handlers. Insert/remove go through a single mutex;
//! per-session synchronization (the seal gate, the chunk counter) lives on
//! the session itself so concurrent chunk requests for one upload never
//! contend on the registry lock.

use crate::models::session::UploadSession;
use crate::services::upload_service::{UploadError, UploadResult};
use chrono::{Duration, Utc};
use std::{collections::HashMap, path::Path, sync::Arc};
use tokio::{fs, sync::Mutex};
use uuid::Uuid;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, Arc<UploadSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh upload id, create its staging directory under
    /// `staging_root`, and register the session.
    pub async fn open(
        &self,
        staging_root: &Path,
        original_filename: &str,
        stored_filename: &str,
        declared_total_size: i64,
        client_id: &str,
    ) -> UploadResult<Arc<UploadSession>> {
        let upload_id = Uuid::new_v4();
        let staging_dir = staging_root.join(upload_id.to_string());
        fs::create_dir_all(&staging_dir).await?;

        let session = Arc::new(UploadSession::new(
            upload_id,
            original_filename.to_string(),
            stored_filename.to_string(),
            declared_total_size,
            client_id.to_string(),
            staging_dir,
        ));
        self.sessions.lock().await.insert(upload_id, session.clone());
        Ok(session)
    }

    /// Look up a session; unknown ids (never issued, or already closed)
    /// fail with `UploadNotFound`.
    pub async fn get(&self, upload_id: Uuid) -> UploadResult<Arc<UploadSession>> {
        self.sessions
            .lock()
            .await
            .get(&upload_id)
            .cloned()
            .ok_or(UploadError::UploadNotFound(upload_id))
    }

    /// Remove a session. Called once per upload, at finalize or by the
    /// reaper, after its staging directory has been dealt with.
    pub async fn close(&self, upload_id: Uuid) -> Option<Arc<UploadSession>> {
        self.sessions.lock().await.remove(&upload_id)
    }

    /// Snapshot of sessions created more than `ttl` ago.
    pub async fn expired(&self, ttl: Duration) -> Vec<Arc<UploadSession>> {
        let cutoff = Utc::now() - ttl;
        self.sessions
            .lock()
            .await
            .values()
            .filter(|session| session.created_at < cutoff)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_session(registry: &SessionRegistry, root: &Path) -> Arc<UploadSession> {
        registry
            .open(root, "a.txt", "20250101_000000_a.txt", 20, "c1")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn open_creates_staging_dir_and_registers() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new();

        let session = open_session(&registry, dir.path()).await;
        assert!(session.staging_dir.is_dir());

        let fetched = registry.get(session.upload_id).await.unwrap();
        assert!(Arc::ptr_eq(&session, &fetched));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let registry = SessionRegistry::new();
        let err = registry.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, UploadError::UploadNotFound(_)));
    }

    #[tokio::test]
    async fn close_removes_session() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new();
        let session = open_session(&registry, dir.path()).await;

        assert!(registry.close(session.upload_id).await.is_some());
        assert!(registry.get(session.upload_id).await.is_err());
        assert!(registry.close(session.upload_id).await.is_none());
    }

    #[tokio::test]
    async fn chunk_counter_double_counts_resends() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new();
        let session = open_session(&registry, dir.path()).await;

        assert_eq!(session.record_chunk(), 1);
        assert_eq!(session.record_chunk(), 2);
        assert_eq!(session.chunks_received(), 2);
    }

    #[tokio::test]
    async fn sealed_session_rejects_chunks_and_second_seal() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new();
        let session = open_session(&registry, dir.path()).await;

        let guard = session.seal().await;
        assert!(guard.is_some());
        drop(guard);

        assert!(session.begin_chunk().await.is_none());
        assert!(session.seal().await.is_none());
    }

    #[tokio::test]
    async fn expiry_respects_ttl() {
        let dir = tempdir().unwrap();
        let registry = SessionRegistry::new();
        let session = open_session(&registry, dir.path()).await;

        assert!(registry.expired(Duration::hours(1)).await.is_empty());

        let expired = registry.expired(Duration::zero()).await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].upload_id, session.upload_id);
    }
}
