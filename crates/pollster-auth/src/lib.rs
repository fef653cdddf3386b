//! Capability URLs for Pollster
//!
//! Issues per-object GET, PUT and DELETE URLs presigned by the S3 client,
//! so receivers can act on one object without holding storage credentials.

pub mod issuer;

pub use issuer::{CapabilityIssuer, NONCE_PARAM};
