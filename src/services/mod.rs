pub mod metadata_store;
pub mod session_registry;
pub mod staging;
pub mod upload_service;
