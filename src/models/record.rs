//! Represents one entry in the durable metadata index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an upload record.
///
/// An `init` call appends a `Pending` record; a successful finalize (or a
/// single-shot upload) appends a `Completed` one with the same filename.
/// The index is append-only, so both lines coexist and listing keeps the
/// latest per filename.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Completed,
}

/// Metadata for a single upload, serialized as one JSON line of the index.
///
/// Records are never rewritten in place. A pending record is superseded by
/// appending a completed record with the same `filename` and a later
/// `upload_date`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FileRecord {
    /// Stored filename, collision-resistant via a timestamp prefix.
    pub filename: String,

    /// Size in bytes. For pending records this is the client-declared
    /// total; for completed records it is the byte count actually written.
    pub size: i64,

    /// Path of the final file on disk.
    pub storage_location: String,

    /// Hex MD5 of the final content, present on completed records.
    pub etag: Option<String>,

    /// When this record was appended.
    pub upload_date: DateTime<Utc>,

    /// Wall-clock upload time in seconds, reported at finalize.
    pub upload_duration: Option<f64>,

    pub status: UploadStatus,

    /// Identifier of the uploading client, when it supplied one.
    pub client_id: Option<String>,
}
