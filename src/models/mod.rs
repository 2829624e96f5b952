//! Core data models for the file upload service.
//!
//! `FileRecord` entries map one-to-one onto lines of the append-only
//! metadata index and serialize naturally as JSON via `serde`.
//! `UploadSession` is the in-memory state of a chunked upload in flight,
//! and `protocol` holds the typed request/response bodies for every
//! endpoint.

pub mod protocol;
pub mod record;
pub mod session;
