//! Chunk staging area — per-upload scratch directories holding raw chunk
//! blobs until finalize reassembles them.
//!
//! Each `(upload_id, chunk_number)` pair maps to exactly one file named
//! `chunk_{number:06}` inside the session's staging directory. Re-sending
//! a chunk number silently overwrites the previous blob, which makes chunk
//! re-send idempotent at the storage layer.

use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

const CHUNK_PREFIX: &str = "chunk_";

/// Deterministic blob path for a chunk number.
pub fn chunk_path(staging_dir: &Path, chunk_number: u64) -> PathBuf {
    staging_dir.join(format!("{CHUNK_PREFIX}{chunk_number:06}"))
}

/// Write one chunk blob, overwriting any previous blob for the same number.
pub async fn write_chunk(staging_dir: &Path, chunk_number: u64, bytes: &[u8]) -> io::Result<()> {
    fs::write(chunk_path(staging_dir, chunk_number), bytes).await
}

/// List staged chunks sorted by numeric chunk number ascending.
///
/// The numeric suffix is parsed rather than relying on lexical order, so
/// chunk 10 sorts after chunk 9 even if the padding width were exceeded.
/// Files that do not match the chunk naming scheme are ignored.
pub async fn list_chunks_in_order(staging_dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    let mut chunks = Vec::new();
    let mut entries = fs::read_dir(staging_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(number) = name.strip_prefix(CHUNK_PREFIX) else {
            continue;
        };
        if let Ok(number) = number.parse::<u64>() {
            chunks.push((number, entry.path()));
        }
    }
    chunks.sort_unstable_by_key(|(number, _)| *number);
    Ok(chunks)
}

/// Delete all chunk blobs and the staging directory itself.
///
/// Callers treat failure as a storage leak, not a fatal error: they log it
/// and carry on.
pub async fn purge(staging_dir: &Path) -> io::Result<()> {
    fs::remove_dir_all(staging_dir).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn chunks_listed_in_numeric_order() {
        let dir = tempdir().unwrap();
        for number in [2u64, 0, 10, 1] {
            write_chunk(dir.path(), number, b"x").await.unwrap();
        }

        let chunks = list_chunks_in_order(dir.path()).await.unwrap();
        let numbers: Vec<u64> = chunks.iter().map(|(n, _)| *n).collect();
        assert_eq!(numbers, vec![0, 1, 2, 10]);
    }

    #[tokio::test]
    async fn resend_overwrites_previous_blob() {
        let dir = tempdir().unwrap();
        write_chunk(dir.path(), 2, b"first").await.unwrap();
        write_chunk(dir.path(), 2, b"second").await.unwrap();

        let chunks = list_chunks_in_order(dir.path()).await.unwrap();
        assert_eq!(chunks.len(), 1);
        let bytes = fs::read(&chunks[0].1).await.unwrap();
        assert_eq!(bytes, b"second");
    }

    #[tokio::test]
    async fn unrelated_files_are_ignored() {
        let dir = tempdir().unwrap();
        write_chunk(dir.path(), 0, b"x").await.unwrap();
        fs::write(dir.path().join("notes.txt"), b"y").await.unwrap();
        fs::write(dir.path().join("chunk_abc"), b"z").await.unwrap();

        let chunks = list_chunks_in_order(dir.path()).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, 0);
    }

    #[tokio::test]
    async fn purge_removes_directory() {
        let dir = tempdir().unwrap();
        let staging = dir.path().join("session");
        fs::create_dir(&staging).await.unwrap();
        write_chunk(&staging, 0, b"x").await.unwrap();

        purge(&staging).await.unwrap();
        assert!(!staging.exists());
    }
}
