//! Defines routes for the upload protocol and its supporting endpoints.
//!
//! ## Structure
//! - **Chunked protocol**
//!   - `POST /api/uploads/init`     — open a session, get an upload id
//!   - `POST /api/uploads/chunk`    — stage one chunk (multipart)
//!   - `POST /api/uploads/finalize` — reassemble and complete
//!
//! - **Single-shot path**
//!   - `POST /api/uploads` — whole file in one multipart request
//!
//! - **Read-only endpoints**
//!   - `GET /api/data` — deduplicated metadata listing
//!   - `GET /health`   — liveness
//!   - `GET /readyz`   — readiness (disk + metadata log)

use crate::{
    handlers::{
        health_handlers::{health, readyz},
        upload_handlers::{finalize_upload, init_upload, list_files, upload_chunk, upload_file},
    },
    services::upload_service::UploadService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Clients send 8 MiB chunks; axum's default 2 MiB body cap would reject
/// them, so the limit is raised with headroom. The single-shot route is
/// exempt: it streams multi-gigabyte bodies to disk and sizes its write
/// buffer from the declared total, so no request-body cap applies there.
const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// Build and return the router for all upload-service routes.
///
/// The router carries shared state (`UploadService`) to all handlers.
pub fn routes() -> Router<UploadService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        // upload protocol
        .route(
            "/api/uploads",
            post(upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/uploads/init", post(init_upload))
        .route("/api/uploads/chunk", post(upload_chunk))
        .route("/api/uploads/finalize", post(finalize_upload))
        // metadata listing
        .route("/api/data", get(list_files))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{metadata_store, metadata_store::MetadataStore, upload_service};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn multipart_file_body(boundary: &str, filename: &str, payload_len: usize) -> Vec<u8> {
        let mut body = Vec::with_capacity(payload_len + 256);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\r\n"
            )
            .as_bytes(),
        );
        body.resize(body.len() + payload_len, b'a');
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn single_shot_route_accepts_bodies_over_the_chunk_cap() {
        let dir = tempdir().unwrap();
        let metadata = Arc::new(MetadataStore::new(
            dir.path().join(metadata_store::INDEX_FILE_NAME),
        ));
        let service = upload_service::UploadService::new(metadata, dir.path());
        let app = routes().with_state(service);

        let boundary = "upload-route-test-boundary";
        let body = multipart_file_body(boundary, "big.dat", MAX_REQUEST_BODY + 1024 * 1024);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/uploads")
                    .header(
                        "content-type",
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
