//! Typed request/response bodies for the upload protocol.
//!
//! Every endpoint speaks an explicit structure validated at the boundary
//! before anything reaches the core state machine.

use crate::models::record::FileRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /api/uploads/init`.
#[derive(Debug, Clone, Deserialize)]
pub struct InitRequest {
    pub filename: String,
    pub total_size: i64,
    pub client_id: String,

    /// Client-side clock reading when the upload was started.
    pub timestamp: Option<String>,

    /// When the client finished generating the file.
    pub file_creation_time: Option<String>,

    /// Seconds the client spent generating the file.
    pub creation_duration: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub upload_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    pub status: &'static str,
}

/// Body of `POST /api/uploads/finalize`.
#[derive(Debug, Clone, Deserialize)]
pub struct FinalizeRequest {
    pub upload_id: Uuid,

    /// Wall-clock seconds the whole upload took, as measured by the client.
    /// Unknown extra fields (clients also send `creation_duration`) are
    /// ignored.
    pub upload_duration: Option<f64>,
}

/// Returned by finalize and by the single-shot upload, both with HTTP 201.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub file_info: FileRecord,
}

#[derive(Debug, Serialize)]
pub struct FilesListResponse {
    pub files: Vec<FileRecord>,
}
