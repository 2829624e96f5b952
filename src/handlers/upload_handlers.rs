//! HTTP handlers for the upload protocol.
//! Streams single-shot bodies to avoid buffering whole files in memory and
//! delegates all storage concerns to `UploadService`.

use crate::{
    errors::AppError,
    models::protocol::{
        ChunkResponse, FilesListResponse, FinalizeRequest, InitRequest, InitResponse,
        UploadResponse,
    },
    services::upload_service::UploadService,
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use futures::StreamExt;
use std::io;
use uuid::Uuid;

/// `POST /api/uploads/init` — start a chunked upload, returning its id.
pub async fn init_upload(
    State(service): State<UploadService>,
    Json(req): Json<InitRequest>,
) -> Result<Json<InitResponse>, AppError> {
    let session = service.init_upload(&req).await?;
    Ok(Json(InitResponse {
        upload_id: session.upload_id,
    }))
}

/// `POST /api/uploads/chunk` — multipart body carrying one chunk blob plus
/// `chunk_number` and `upload_id` form fields, in any order.
pub async fn upload_chunk(
    State(service): State<UploadService>,
    mut multipart: Multipart,
) -> Result<Json<ChunkResponse>, AppError> {
    let mut upload_id: Option<Uuid> = None;
    let mut chunk_number: Option<u64> = None;
    let mut chunk: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        match field.name() {
            Some("upload_id") => {
                let text = field.text().await.map_err(bad_multipart)?;
                upload_id = Some(
                    text.parse()
                        .map_err(|_| AppError::bad_request("invalid upload_id"))?,
                );
            }
            Some("chunk_number") => {
                let text = field.text().await.map_err(bad_multipart)?;
                chunk_number = Some(text.parse().map_err(|_| {
                    AppError::bad_request("chunk_number must be a non-negative integer")
                })?);
            }
            Some("chunk") => chunk = Some(field.bytes().await.map_err(bad_multipart)?),
            _ => {}
        }
    }

    let upload_id = upload_id.ok_or_else(|| AppError::bad_request("missing upload_id field"))?;
    let chunk_number =
        chunk_number.ok_or_else(|| AppError::bad_request("missing chunk_number field"))?;
    let chunk = chunk.ok_or_else(|| AppError::bad_request("missing chunk field"))?;

    service.write_chunk(upload_id, chunk_number, &chunk).await?;
    Ok(Json(ChunkResponse { status: "success" }))
}

/// `POST /api/uploads/finalize` — reassemble and complete an upload.
pub async fn finalize_upload(
    State(service): State<UploadService>,
    Json(req): Json<FinalizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let record = service
        .finalize_upload(req.upload_id, req.upload_duration)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "File uploaded successfully",
            file_info: record,
        }),
    ))
}

/// `POST /api/uploads` — single-shot upload of a whole file.
///
/// Optional `total_size` and `client_id` form fields tune buffering and
/// provenance; they must precede the `file` part, since the body is
/// consumed in arrival order and the file part is streamed to disk the
/// moment it appears.
pub async fn upload_file(
    State(service): State<UploadService>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut declared_size: Option<u64> = None;
    let mut client_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        match field.name() {
            Some("total_size") => {
                declared_size = field.text().await.map_err(bad_multipart)?.parse().ok();
            }
            Some("client_id") => {
                client_id = Some(field.text().await.map_err(bad_multipart)?);
            }
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| AppError::bad_request("no file selected"))?;

                let stream = field.map(|chunk| chunk.map_err(io::Error::other));
                let record = service
                    .upload_stream(&filename, declared_size, client_id.take(), stream)
                    .await?;

                return Ok((
                    StatusCode::CREATED,
                    Json(UploadResponse {
                        message: "File uploaded successfully",
                        file_info: record,
                    }),
                ));
            }
            _ => {}
        }
    }

    Err(AppError::bad_request("missing file field"))
}

/// `GET /api/data` — deduplicated metadata listing.
pub async fn list_files(
    State(service): State<UploadService>,
) -> Result<Json<FilesListResponse>, AppError> {
    Ok(Json(FilesListResponse {
        files: service.list_files().await?,
    }))
}

fn bad_multipart(err: MultipartError) -> AppError {
    AppError::bad_request(format!("malformed multipart body: {err}"))
}
