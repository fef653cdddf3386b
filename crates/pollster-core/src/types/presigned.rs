//! Capability URL types
//!
//! A capability URL authorizes exactly one operation on one object for a
//! bounded window, without handing out storage credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Validity bounds S3 accepts for `X-Amz-Expires`, in seconds
pub const MIN_PRESIGN_EXPIRES: u64 = 1;
pub const MAX_PRESIGN_EXPIRES: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_PRESIGN_EXPIRES: u64 = 3600;

pub fn check_presign_expiry(seconds: u64) -> Result<u64> {
    if (MIN_PRESIGN_EXPIRES..=MAX_PRESIGN_EXPIRES).contains(&seconds) {
        Ok(seconds)
    } else {
        Err(Error::InvalidConfig(format!(
            "presign expiry must be between {} and {} seconds, got {}",
            MIN_PRESIGN_EXPIRES, MAX_PRESIGN_EXPIRES, seconds
        )))
    }
}

/// HTTP methods a capability can grant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresignedMethod {
    Get,
    Put,
    Delete,
}

impl PresignedMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for PresignedMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signed URL and the single method it authorizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedUrl {
    pub url: String,
    pub method: PresignedMethod,
    pub expires_at: DateTime<Utc>,
}

/// The GET/PUT/DELETE capabilities issued for one object in one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedCapabilitySet {
    pub bucket: String,
    pub key: String,
    pub get: PresignedUrl,
    pub put: PresignedUrl,
    pub delete: PresignedUrl,
}

impl PresignedCapabilitySet {
    /// Earliest expiry among the three capabilities
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.get
            .expires_at
            .min(self.put.expires_at)
            .min(self.delete.expires_at)
    }
}
