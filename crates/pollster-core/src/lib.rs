//! Pollster Core Library
//!
//! Configuration, errors, and the data model shared by the bucket poller:
//! object keys and snapshots, capability URLs, and the webhook payload.

pub mod config;
pub mod error;
pub mod types;

pub use config::PollsterConfig;
pub use error::{Error, Result};

/// Pollster version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default S3 region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Largest `max-keys` value S3 accepts for one listing page
pub const MAX_PAGE_SIZE: i32 = 1000;
