//! Webhook notification payload
//!
//! The JSON body posted to the webhook for every newly observed object.

use serde::{Deserialize, Serialize};

use super::PresignedCapabilitySet;

/// Content type of every webhook request
pub const WEBHOOK_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,
    pub bucket: String,
    pub object: String,
    pub presigned_urls: PresignedUrls,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedUrls {
    pub get_url: String,
    pub put_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_url: Option<String>,
}

impl NotificationPayload {
    /// Build the wire body from a freshly issued capability set.
    pub fn from_capabilities(
        capabilities: &PresignedCapabilitySet,
        s3_endpoint: Option<&str>,
        include_delete_url: bool,
    ) -> Self {
        Self {
            s3_endpoint: s3_endpoint.map(str::to_string),
            bucket: capabilities.bucket.clone(),
            object: capabilities.key.clone(),
            presigned_urls: PresignedUrls {
                get_url: capabilities.get.url.clone(),
                put_url: capabilities.put.url.clone(),
                delete_url: include_delete_url.then(|| capabilities.delete.url.clone()),
            },
        }
    }

    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
