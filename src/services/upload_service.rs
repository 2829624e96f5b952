//! UploadService — the upload protocol state machine backed by local disk
//! for payloads and the append-only index for metadata.
//!
//! Two upload paths share this service:
//! - the chunked protocol (init → N× chunk → finalize), which stages blobs
//!   per session and reassembles them at finalize;
//! - the single-shot path, which streams a whole multipart body straight
//!   to its final location with no session at all.
//!
//! Final files are written via a temp file and renamed into place, with an
//! MD5 digest computed while streaming.

use crate::models::{
    protocol::InitRequest,
    record::{FileRecord, UploadStatus},
    session::UploadSession,
};
use crate::services::{metadata_store::MetadataStore, session_registry::SessionRegistry, staging};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt, BufWriter},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file type not allowed: `{0}`")]
    ExtensionNotAllowed(String),
    #[error("filename `{0}` is empty after sanitizing")]
    InvalidFilename(String),
    #[error("upload `{0}` not found")]
    UploadNotFound(Uuid),
    #[error("upload `{upload_id}` is missing chunk {chunk_number}")]
    MissingChunk { upload_id: Uuid, chunk_number: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Metadata(#[from] serde_json::Error),
}

pub type UploadResult<T> = Result<T, UploadError>;

const ALLOWED_EXTENSIONS: [&str; 8] = ["txt", "pdf", "doc", "docx", "csv", "dat", "mp4", "wav"];

const STAGING_DIR_NAME: &str = ".staging";

const MIN_WRITE_BUF: usize = 5 * 1024 * 1024;
const MAX_WRITE_BUF: usize = 20 * 1024 * 1024;
const DEFAULT_WRITE_BUF: usize = 8 * 1024 * 1024;

const COPY_BUF_LEN: usize = 64 * 1024;

/// UploadService orchestrates the session registry, the chunk staging
/// area, and the metadata index:
/// - init opens a session and records a pending entry
/// - chunk stages one blob and bumps the session counter
/// - finalize reassembles blobs in order into the final file and records a
///   completed entry
/// - the single-shot path streams a body directly to its final file
///
/// Every path that wrote metadata flushes the index before returning, so a
/// successful response implies a durable record.
#[derive(Clone)]
pub struct UploadService {
    registry: Arc<SessionRegistry>,

    /// Shared append-only metadata index.
    pub metadata: Arc<MetadataStore>,

    /// Base directory where final files land; staging lives beneath it.
    pub base_path: PathBuf,
}

impl UploadService {
    pub fn new(metadata: Arc<MetadataStore>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            metadata,
            base_path: base_path.into(),
        }
    }

    /// Root directory for per-session staging directories.
    pub fn staging_root(&self) -> PathBuf {
        self.base_path.join(STAGING_DIR_NAME)
    }

    /// Start a chunked upload: validate, open a session, record a pending
    /// entry, and hand the session (with its fresh upload id) back.
    pub async fn init_upload(&self, req: &InitRequest) -> UploadResult<Arc<UploadSession>> {
        ensure_extension_allowed(&req.filename)?;
        let stored = stored_filename(&req.filename)?;

        let session = self
            .registry
            .open(
                &self.staging_root(),
                &req.filename,
                &stored,
                req.total_size,
                &req.client_id,
            )
            .await?;

        let record = FileRecord {
            filename: session.stored_filename.clone(),
            size: req.total_size,
            storage_location: self
                .base_path
                .join(&session.stored_filename)
                .display()
                .to_string(),
            etag: None,
            upload_date: Utc::now(),
            upload_duration: None,
            status: UploadStatus::Pending,
            client_id: Some(req.client_id.clone()),
        };
        self.metadata.append(&record).await?;
        self.metadata.flush().await?;

        info!(
            "Initialized upload {} for `{}` ({} bytes declared) from client {}",
            session.upload_id, req.filename, session.declared_total_size, req.client_id
        );
        debug!(
            "client-reported provenance for {}: timestamp={:?} file_creation_time={:?} creation_duration={:?}",
            session.upload_id, req.timestamp, req.file_creation_time, req.creation_duration
        );
        Ok(session)
    }

    /// Stage one chunk blob for an in-flight upload.
    ///
    /// Chunk numbers are caller-assigned with no contiguity requirement;
    /// re-sending a number overwrites its blob. Chunks for distinct
    /// numbers may be written concurrently. A session sealed by finalize
    /// (or reaped) is indistinguishable from an unknown one.
    pub async fn write_chunk(
        &self,
        upload_id: Uuid,
        chunk_number: u64,
        bytes: &[u8],
    ) -> UploadResult<u64> {
        let session = self.registry.get(upload_id).await?;
        let Some(_writing) = session.begin_chunk().await else {
            return Err(UploadError::UploadNotFound(upload_id));
        };

        staging::write_chunk(&session.staging_dir, chunk_number, bytes).await?;
        let received = session.record_chunk();
        debug!(
            "Staged chunk {} ({} bytes) for upload {}, {} received so far",
            chunk_number,
            bytes.len(),
            upload_id,
            received
        );
        Ok(received)
    }

    /// Reassemble staged chunks into the final file and complete the
    /// upload.
    ///
    /// Seals the session first, waiting out in-flight chunk writes, so the
    /// staging directory is quiescent while it is read. Fails if the
    /// staged chunk numbers do not form the contiguous range `0..n`; in
    /// that case (and on I/O failure) the seal is lifted again so the
    /// client can repair and retry.
    pub async fn finalize_upload(
        &self,
        upload_id: Uuid,
        upload_duration: Option<f64>,
    ) -> UploadResult<FileRecord> {
        let session = self.registry.get(upload_id).await?;
        let mut sealed = session
            .seal()
            .await
            .ok_or(UploadError::UploadNotFound(upload_id))?;

        match self.assemble(&session, upload_duration).await {
            Ok(record) => {
                self.registry.close(upload_id).await;
                info!(
                    "Finalized upload {} into `{}` ({} bytes, {} chunks received)",
                    upload_id,
                    record.filename,
                    record.size,
                    session.chunks_received()
                );
                Ok(record)
            }
            Err(err) => {
                *sealed = false;
                Err(err)
            }
        }
    }

    async fn assemble(
        &self,
        session: &UploadSession,
        upload_duration: Option<f64>,
    ) -> UploadResult<FileRecord> {
        let chunks = staging::list_chunks_in_order(&session.staging_dir).await?;
        for (expected, (number, _)) in chunks.iter().enumerate() {
            if *number != expected as u64 {
                return Err(UploadError::MissingChunk {
                    upload_id: session.upload_id,
                    chunk_number: expected as u64,
                });
            }
        }

        let final_path = self.base_path.join(&session.stored_filename);
        let tmp_path = self.base_path.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut out = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        for (_, chunk_path) in &chunks {
            if let Err(err) = copy_into(chunk_path, &mut out, &mut digest, &mut size_bytes).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }
        if let Err(err) = out.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        rename_into_place(&tmp_path, &final_path).await?;

        let record = FileRecord {
            filename: session.stored_filename.clone(),
            size: size_bytes,
            storage_location: final_path.display().to_string(),
            etag: Some(format!("{:x}", digest.compute())),
            upload_date: Utc::now(),
            upload_duration,
            status: UploadStatus::Completed,
            client_id: Some(session.client_id.clone()),
        };
        self.metadata.append(&record).await?;
        self.metadata.flush().await?;

        if let Err(err) = staging::purge(&session.staging_dir).await {
            warn!(
                "failed to purge staging dir {}: {}",
                session.staging_dir.display(),
                err
            );
        }
        Ok(record)
    }

    /// Single-shot upload: stream the whole body to its final location in
    /// one pass and record a completed entry. No session is involved.
    ///
    /// `declared_size` only tunes the write-buffer capacity; it is not
    /// enforced against the bytes actually received.
    pub async fn upload_stream<S>(
        &self,
        filename: &str,
        declared_size: Option<u64>,
        client_id: Option<String>,
        stream: S,
    ) -> UploadResult<FileRecord>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        ensure_extension_allowed(filename)?;
        let stored = stored_filename(filename)?;
        let started = Instant::now();

        let final_path = self.base_path.join(&stored);
        let tmp_path = self.base_path.join(format!(".tmp-{}", Uuid::new_v4()));
        let file = File::create(&tmp_path).await?;
        let mut out = BufWriter::with_capacity(optimal_write_buffer(declared_size), file);

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(err.into());
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = out.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }
        if let Err(err) = out.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        let file = out.into_inner();
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        rename_into_place(&tmp_path, &final_path).await?;

        let upload_duration = (started.elapsed().as_secs_f64() * 100.0).round() / 100.0;
        let record = FileRecord {
            filename: stored,
            size: size_bytes,
            storage_location: final_path.display().to_string(),
            etag: Some(format!("{:x}", digest.compute())),
            upload_date: Utc::now(),
            upload_duration: Some(upload_duration),
            status: UploadStatus::Completed,
            client_id,
        };
        self.metadata.append(&record).await?;
        self.metadata.flush().await?;

        info!(
            "Uploaded `{}` ({} bytes) in {}s",
            record.filename, record.size, upload_duration
        );
        Ok(record)
    }

    /// Deduplicated view of the metadata index.
    pub async fn list_files(&self) -> UploadResult<Vec<FileRecord>> {
        self.metadata.list_all().await
    }

    /// Sweep sessions idle longer than `ttl`: seal each one, purge its
    /// staging directory, and drop it from the registry. The pending
    /// record stays in the index. Returns how many sessions were reaped.
    pub async fn reap_expired(&self, ttl: Duration) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let mut reaped = 0;
        for session in self.registry.expired(ttl).await {
            let Some(_sealed) = session.seal().await else {
                continue; // finalize got there first
            };
            if let Err(err) = staging::purge(&session.staging_dir).await {
                warn!(
                    "failed to purge staging dir {}: {}",
                    session.staging_dir.display(),
                    err
                );
            }
            self.registry.close(session.upload_id).await;
            warn!(
                "Reaped idle upload {} (`{}`, {} chunks received)",
                session.upload_id,
                session.original_filename,
                session.chunks_received()
            );
            reaped += 1;
        }
        reaped
    }
}

fn ensure_extension_allowed(filename: &str) -> UploadResult<()> {
    let allowed = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        });
    if allowed {
        Ok(())
    } else {
        Err(UploadError::ExtensionNotAllowed(filename.to_string()))
    }
}

/// Strip everything but alphanumerics, dots, underscores, hyphens, and
/// spaces, mirroring what upload clients already expect to survive.
fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect()
}

/// Collision-resistant stored name: timestamp prefix + sanitized original.
fn stored_filename(filename: &str) -> UploadResult<String> {
    let safe = sanitize_filename(filename);
    if safe.is_empty() || safe.chars().all(|c| c == '.') {
        return Err(UploadError::InvalidFilename(filename.to_string()));
    }
    Ok(format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), safe))
}

/// Pick a write-buffer capacity scaled to the declared file size: small
/// files get the floor, multi-gigabyte files the cap, anything between
/// roughly one five-hundredth of the size.
fn optimal_write_buffer(declared_size: Option<u64>) -> usize {
    const TWO_GIB: u64 = 2 * 1024 * 1024 * 1024;
    const EIGHT_GIB: u64 = 8 * 1024 * 1024 * 1024;

    match declared_size {
        None | Some(0) => DEFAULT_WRITE_BUF,
        Some(size) if size <= TWO_GIB => MIN_WRITE_BUF,
        Some(size) if size >= EIGHT_GIB => MAX_WRITE_BUF,
        Some(size) => ((size / 500) as usize).clamp(MIN_WRITE_BUF, MAX_WRITE_BUF),
    }
}

/// Append one chunk file to `out`, feeding the digest and size as it goes.
async fn copy_into(
    src: &Path,
    out: &mut File,
    digest: &mut Context,
    size_bytes: &mut i64,
) -> io::Result<()> {
    let mut reader = File::open(src).await?;
    let mut buf = vec![0u8; COPY_BUF_LEN];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digest.consume(&buf[..n]);
        out.write_all(&buf[..n]).await?;
        *size_bytes += n as i64;
    }
    Ok(())
}

/// Rename the temp file into its final location, replacing an existing
/// file if the platform reports the rename as a conflict. The temp file
/// is removed on every error path so a failed rename never leaks it.
async fn rename_into_place(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    if let Err(err) = fs::rename(tmp_path, final_path).await {
        if err.kind() != io::ErrorKind::AlreadyExists {
            let _ = fs::remove_file(tmp_path).await;
            return Err(err);
        }
        if let Err(err) = fs::remove_file(final_path).await {
            let _ = fs::remove_file(tmp_path).await;
            return Err(err);
        }
        if let Err(err) = fs::rename(tmp_path, final_path).await {
            let _ = fs::remove_file(tmp_path).await;
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metadata_store::INDEX_FILE_NAME;
    use futures::stream;
    use tempfile::{TempDir, tempdir};

    fn service(dir: &TempDir) -> UploadService {
        let metadata = Arc::new(MetadataStore::new(dir.path().join(INDEX_FILE_NAME)));
        UploadService::new(metadata, dir.path())
    }

    fn init_request(filename: &str, total_size: i64) -> InitRequest {
        InitRequest {
            filename: filename.to_string(),
            total_size,
            client_id: "c1".to_string(),
            timestamp: None,
            file_creation_time: None,
            creation_duration: None,
        }
    }

    async fn final_content(svc: &UploadService, record: &FileRecord) -> Vec<u8> {
        fs::read(svc.base_path.join(&record.filename)).await.unwrap()
    }

    #[tokio::test]
    async fn every_allowed_extension_passes_init() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        for ext in ALLOWED_EXTENSIONS {
            svc.init_upload(&init_request(&format!("f.{ext}"), 1))
                .await
                .unwrap();
        }
        // case-insensitive suffix match
        svc.init_upload(&init_request("REPORT.PDF", 1)).await.unwrap();
    }

    #[tokio::test]
    async fn disallowed_or_missing_extension_fails_init() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);
        for filename in ["f.exe", "f.tar.gz", "noext", "f."] {
            let err = svc.init_upload(&init_request(filename, 1)).await.unwrap_err();
            assert!(matches!(err, UploadError::ExtensionNotAllowed(_)), "{filename}");
        }
    }

    #[tokio::test]
    async fn round_trip_produces_file_and_completed_record() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let session = svc.init_upload(&init_request("a.txt", 20)).await.unwrap();
        let id = session.upload_id;
        svc.write_chunk(id, 0, b"0123456789").await.unwrap();
        svc.write_chunk(id, 1, b"ABCDEFGHIJ").await.unwrap();
        let record = svc.finalize_upload(id, Some(1.5)).await.unwrap();

        assert_eq!(final_content(&svc, &record).await, b"0123456789ABCDEFGHIJ");
        assert_eq!(record.size, 20);
        assert_eq!(record.status, UploadStatus::Completed);
        assert_eq!(record.upload_duration, Some(1.5));
        assert!(record.etag.is_some());
        assert!(!session.staging_dir.exists());
    }

    #[tokio::test]
    async fn chunk_order_does_not_matter() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let session = svc.init_upload(&init_request("a.dat", 6)).await.unwrap();
        let id = session.upload_id;
        svc.write_chunk(id, 2, b"cc").await.unwrap();
        svc.write_chunk(id, 0, b"aa").await.unwrap();
        svc.write_chunk(id, 1, b"bb").await.unwrap();
        let record = svc.finalize_upload(id, None).await.unwrap();

        assert_eq!(final_content(&svc, &record).await, b"aabbcc");
    }

    #[tokio::test]
    async fn chunk_resend_is_last_write_wins() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let session = svc.init_upload(&init_request("a.csv", 8)).await.unwrap();
        let id = session.upload_id;
        svc.write_chunk(id, 0, b"head").await.unwrap();
        svc.write_chunk(id, 1, b"AAAA").await.unwrap();
        svc.write_chunk(id, 1, b"BBBB").await.unwrap();
        let record = svc.finalize_upload(id, None).await.unwrap();

        assert_eq!(final_content(&svc, &record).await, b"headBBBB");
        // the counter double-counts the re-send by design
        assert_eq!(session.chunks_received(), 3);
    }

    #[tokio::test]
    async fn finalize_unknown_id_fails_and_creates_nothing() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let err = svc.finalize_upload(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, UploadError::UploadNotFound(_)));

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            panic!("unexpected file created: {:?}", entry.path());
        }
    }

    #[tokio::test]
    async fn chunk_gap_fails_finalize_until_repaired() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let session = svc.init_upload(&init_request("a.txt", 6)).await.unwrap();
        let id = session.upload_id;
        svc.write_chunk(id, 0, b"aa").await.unwrap();
        svc.write_chunk(id, 2, b"cc").await.unwrap();

        let err = svc.finalize_upload(id, None).await.unwrap_err();
        assert!(matches!(
            err,
            UploadError::MissingChunk { chunk_number: 1, .. }
        ));

        // the failed finalize lifts the seal: repair and retry succeeds
        svc.write_chunk(id, 1, b"bb").await.unwrap();
        let record = svc.finalize_upload(id, None).await.unwrap();
        assert_eq!(final_content(&svc, &record).await, b"aabbcc");
    }

    #[tokio::test]
    async fn finalize_waits_for_in_flight_chunk_write() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let session = svc.init_upload(&init_request("a.txt", 4)).await.unwrap();
        let id = session.upload_id;
        svc.write_chunk(id, 0, b"data").await.unwrap();

        // hold the chunk-write side of the seal gate open
        let writing = session.begin_chunk().await.unwrap();

        let finalize = tokio::spawn({
            let svc = svc.clone();
            async move { svc.finalize_upload(id, None).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            !finalize.is_finished(),
            "finalize must not read staging while a chunk write is in flight"
        );

        drop(writing);
        let record = finalize.await.unwrap().unwrap();
        assert_eq!(record.size, 4);
        assert_eq!(record.status, UploadStatus::Completed);
    }

    #[tokio::test]
    async fn finalized_upload_is_gone() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let session = svc.init_upload(&init_request("a.txt", 2)).await.unwrap();
        let id = session.upload_id;
        svc.write_chunk(id, 0, b"xy").await.unwrap();
        svc.finalize_upload(id, None).await.unwrap();

        let err = svc.write_chunk(id, 1, b"zz").await.unwrap_err();
        assert!(matches!(err, UploadError::UploadNotFound(_)));
        let err = svc.finalize_upload(id, None).await.unwrap_err();
        assert!(matches!(err, UploadError::UploadNotFound(_)));
    }

    #[tokio::test]
    async fn listing_collapses_pending_and_completed() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let session = svc.init_upload(&init_request("a.txt", 4)).await.unwrap();
        let id = session.upload_id;

        let listed = svc.list_files().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, UploadStatus::Pending);

        svc.write_chunk(id, 0, b"data").await.unwrap();
        svc.finalize_upload(id, None).await.unwrap();

        let listed = svc.list_files().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, UploadStatus::Completed);
        assert_eq!(listed[0].size, 4);
    }

    #[tokio::test]
    async fn single_shot_streams_to_final_file() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]);
        let record = svc
            .upload_stream("greeting.txt", Some(11), Some("c9".to_string()), body)
            .await
            .unwrap();

        assert_eq!(final_content(&svc, &record).await, b"hello world");
        assert_eq!(record.size, 11);
        assert_eq!(record.status, UploadStatus::Completed);
        assert_eq!(record.client_id.as_deref(), Some("c9"));
        assert_eq!(svc.list_files().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn single_shot_rejects_bad_extension() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let body = stream::iter(vec![Ok(Bytes::from_static(b"x"))]);
        let err = svc
            .upload_stream("evil.sh", None, None, body)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::ExtensionNotAllowed(_)));
    }

    #[tokio::test]
    async fn reaper_sweeps_idle_sessions() {
        let dir = tempdir().unwrap();
        let svc = service(&dir);

        let session = svc.init_upload(&init_request("a.txt", 4)).await.unwrap();
        let id = session.upload_id;
        svc.write_chunk(id, 0, b"data").await.unwrap();

        assert_eq!(svc.reap_expired(Duration::from_secs(3600)).await, 0);
        assert_eq!(svc.reap_expired(Duration::ZERO).await, 1);

        assert!(!session.staging_dir.exists());
        let err = svc.write_chunk(id, 1, b"more").await.unwrap_err();
        assert!(matches!(err, UploadError::UploadNotFound(_)));

        // the pending record stays behind in the index
        let listed = svc.list_files().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, UploadStatus::Pending);
    }

    #[tokio::test]
    async fn failed_rename_removes_temp_file() {
        let dir = tempdir().unwrap();
        let tmp_path = dir.path().join(".tmp-test");
        fs::write(&tmp_path, b"data").await.unwrap();

        // final path in a directory that does not exist forces the rename to fail
        let final_path = dir.path().join("missing").join("final.txt");
        assert!(rename_into_place(&tmp_path, &final_path).await.is_err());
        assert!(!tmp_path.exists());
    }

    #[test]
    fn write_buffer_scales_with_declared_size() {
        assert_eq!(optimal_write_buffer(None), DEFAULT_WRITE_BUF);
        assert_eq!(optimal_write_buffer(Some(0)), DEFAULT_WRITE_BUF);
        assert_eq!(optimal_write_buffer(Some(1024)), MIN_WRITE_BUF);
        let mid = optimal_write_buffer(Some(4 * 1024 * 1024 * 1024));
        assert!(mid > MIN_WRITE_BUF && mid < MAX_WRITE_BUF);
        assert_eq!(optimal_write_buffer(Some(16 * 1024 * 1024 * 1024)), MAX_WRITE_BUF);
    }

    #[test]
    fn stored_filenames_keep_extension_and_reject_empty() {
        let name = stored_filename("my report.pdf").unwrap();
        assert!(name.ends_with("_my report.pdf"));
        assert!(stored_filename("§±§±").is_err());
    }
}
