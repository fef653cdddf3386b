//! Error types for Pollster

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration Errors
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // Capability Errors
    #[error("Failed to sign request: {0}")]
    Signing(String),

    // Storage Errors
    #[error("The specified bucket does not exist: {0}")]
    NoSuchBucket(String),

    #[error("Failed to list objects in {bucket}: {message}")]
    ListFailed { bucket: String, message: String },

    #[error("Failed to delete {bucket}/{key}: {message}")]
    DeleteFailed {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Failed to create bucket {bucket}: {message}")]
    CreateBucketFailed { bucket: String, message: String },

    // Delivery Errors
    #[error("Webhook request failed: {0}")]
    WebhookTransport(String),

    #[error("Webhook returned error status: {0}")]
    WebhookStatus(u16),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::DeleteFailed {
            bucket: "inbox".into(),
            key: "a.txt".into(),
            message: "denied".into(),
        };
        assert_eq!(err.to_string(), "Failed to delete inbox/a.txt: denied");
        assert_eq!(
            Error::WebhookStatus(503).to_string(),
            "Webhook returned error status: 503"
        );
    }
}
