//! S3-compatible object storage.
//!
//! This crate provides:
//! - The [`ObjectStore`] seam used by the worker for fetches and uploads
//! - [`S3Client`], an `aws-sdk-s3` implementation that works against AWS S3,
//!   Cloudflare R2, GCS interoperability endpoints and MinIO

pub mod client;
pub mod error;
pub mod store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use store::{content_type_for, ObjectStore};
