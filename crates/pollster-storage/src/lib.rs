//! Object storage access for Pollster
//!
//! `ObjectStore` is the slice of the S3 API the poll loop uses.
//! `S3ObjectStore` talks to any S3-compatible service; `MemoryObjectStore`
//! keeps everything in-process.

pub mod engine;

pub use engine::{build_s3_client, list_snapshot, MemoryObjectStore, ObjectStore, S3ObjectStore, StoreOp};
