//! Health & readiness handlers.
//!
//! - GET /health  -> simple liveness ("healthy")
//! - GET /readyz  -> readiness that checks disk I/O and the metadata log

use crate::services::upload_service::UploadService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /health`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON
/// body. This endpoint should be cheap and never perform I/O.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Performs a best-effort write/read/delete against the storage dir.
/// 2. Verifies the metadata log can be opened for appending.
///
/// Returns JSON describing each check. HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
pub async fn readyz(State(service): State<UploadService>) -> impl IntoResponse {
    // 1) Disk write/read/delete check (use a temp file under base_path)
    let tmp_path = service
        .base_path
        .join(format!(".readyz-{}", Uuid::new_v4()));
    let disk_check = match fs::write(&tmp_path, b"readyz").await {
        Ok(_) => match fs::read(&tmp_path).await {
            Ok(bytes) => {
                if bytes == b"readyz" {
                    // try to remove the temp file; ignore removal error but report if it happens
                    match fs::remove_file(&tmp_path).await {
                        Ok(_) => (true, None::<String>),
                        Err(e) => (true, Some(format!("could not remove tmp file: {}", e))),
                    }
                } else {
                    // content mismatch
                    let _ = fs::remove_file(&tmp_path).await; // best-effort cleanup
                    (false, Some("file content mismatch".to_string()))
                }
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await; // best-effort cleanup
                (false, Some(format!("could not read tmp file: {}", e)))
            }
        },
        Err(e) => (false, Some(format!("could not write tmp file: {}", e))),
    };

    // 2) Metadata log check — open the index for appending.
    let index_check = match fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(service.metadata.path())
        .await
    {
        Ok(_) => (true, None::<String>),
        Err(e) => (false, Some(format!("could not open metadata log: {}", e))),
    };

    let disk_ok = disk_check.0;
    let index_ok = index_check.0;
    let overall_ok = disk_ok && index_ok;

    let mut checks = HashMap::new();
    checks.insert(
        "disk",
        CheckStatus {
            ok: disk_ok,
            error: disk_check.1,
        },
    );
    checks.insert(
        "metadata_log",
        CheckStatus {
            ok: index_ok,
            error: index_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
