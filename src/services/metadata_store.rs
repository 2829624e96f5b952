//! Durable append-only metadata index.
//!
//! Records are serialized as one JSON line each and appended to a single
//! log file. Writes go through an in-memory buffer that flushes once it
//! reaches a batch threshold; every request path that appended a record
//! also flushes explicitly before responding, so nothing buffered is lost
//! if the threshold is never reached. The buffer mutex doubles as the
//! single-writer discipline, and whole-line writes keep readers that scan
//! the log concurrently from ever seeing a torn record.

use crate::models::record::FileRecord;
use crate::services::upload_service::UploadResult;
use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::warn;

pub const INDEX_FILE_NAME: &str = "file_index.jsonl";

const FLUSH_THRESHOLD: usize = 100;

pub struct MetadataStore {
    path: PathBuf,
    buffer: Mutex<Vec<String>>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Location of the index file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer one record, flushing if the batch threshold is reached.
    pub async fn append(&self, record: &FileRecord) -> UploadResult<()> {
        let line = serde_json::to_string(record)?;
        let mut buffer = self.buffer.lock().await;
        buffer.push(line);
        if buffer.len() >= FLUSH_THRESHOLD {
            self.flush_locked(&mut buffer).await?;
        }
        Ok(())
    }

    /// Write out everything buffered and fsync the log.
    ///
    /// Called at the end of every request that appended, and once more on
    /// shutdown.
    pub async fn flush(&self) -> UploadResult<()> {
        let mut buffer = self.buffer.lock().await;
        self.flush_locked(&mut buffer).await
    }

    async fn flush_locked(&self, buffer: &mut Vec<String>) -> UploadResult<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let mut payload = buffer.join("\n");
        payload.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(payload.as_bytes()).await?;
        file.sync_all().await?;
        buffer.clear();
        Ok(())
    }

    /// Read the full log, deduplicated by filename.
    ///
    /// The log is append-only, so a completed record supersedes the
    /// pending one for the same filename; the record with the latest
    /// `upload_date` wins, with later lines breaking ties. Malformed lines
    /// are skipped with a warning. Returns records ordered by upload date
    /// ascending.
    pub async fn list_all(&self) -> UploadResult<Vec<FileRecord>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut latest: HashMap<String, FileRecord> = HashMap::new();
        for line in contents.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<FileRecord>(line) {
                Ok(record) => match latest.get(&record.filename) {
                    Some(existing) if existing.upload_date > record.upload_date => {}
                    _ => {
                        latest.insert(record.filename.clone(), record);
                    }
                },
                Err(err) => warn!("skipping malformed index line: {}", err),
            }
        }

        let mut records: Vec<FileRecord> = latest.into_values().collect();
        records.sort_by_key(|record| record.upload_date);
        Ok(records)
    }
}
