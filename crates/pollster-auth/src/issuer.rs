//! Capability issuance
//!
//! Turns a (bucket, key) pair into three URLs presigned by the S3 client,
//! one per operation the webhook receiver may perform on that object.
//! Every issuance signs a fresh nonce into its URLs, so issuing twice for
//! the same object never hands out the same URL.

use aws_sdk_s3::config::http::HttpRequest;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;
use chrono::{TimeDelta, Utc};
use pollster_core::types::{
    check_presign_expiry, PresignedCapabilitySet, PresignedMethod, PresignedUrl,
};
use pollster_core::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Query parameter carrying the per-issuance nonce
pub const NONCE_PARAM: &str = "x-pollster-nonce";

#[derive(Debug, Clone)]
pub struct CapabilityIssuer {
    client: Client,
    expires_in: Duration,
}

impl CapabilityIssuer {
    pub fn new(client: Client, expires_in: Duration) -> Result<Self> {
        check_presign_expiry(expires_in.as_secs())?;
        Ok(Self { client, expires_in })
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    /// Issue GET, PUT and DELETE capabilities for one object, valid from now.
    pub async fn issue(&self, bucket: &str, key: &str) -> Result<PresignedCapabilitySet> {
        check_object_path(bucket, key)?;

        let nonce = Uuid::new_v4().simple().to_string();
        let set = PresignedCapabilitySet {
            bucket: bucket.to_string(),
            key: key.to_string(),
            get: self.presign(PresignedMethod::Get, bucket, key, &nonce).await?,
            put: self.presign(PresignedMethod::Put, bucket, key, &nonce).await?,
            delete: self.presign(PresignedMethod::Delete, bucket, key, &nonce).await?,
        };

        debug!(bucket, key, nonce = %nonce, "Issued capabilities");
        Ok(set)
    }

    async fn presign(
        &self,
        method: PresignedMethod,
        bucket: &str,
        key: &str,
        nonce: &str,
    ) -> Result<PresignedUrl> {
        let failed = |message: String| {
            Error::Signing(format!("{} {}/{}: {}", method, bucket, key, message))
        };

        let presign_config =
            PresigningConfig::expires_in(self.expires_in).map_err(|e| failed(e.to_string()))?;
        let issued_at = Utc::now();

        let uri = match method {
            PresignedMethod::Get => self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .customize()
                .mutate_request(append_nonce(nonce))
                .presigned(presign_config)
                .await
                .map_err(|e| failed(DisplayErrorContext(&e).to_string()))?
                .uri()
                .to_string(),
            PresignedMethod::Put => self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .customize()
                .mutate_request(append_nonce(nonce))
                .presigned(presign_config)
                .await
                .map_err(|e| failed(DisplayErrorContext(&e).to_string()))?
                .uri()
                .to_string(),
            PresignedMethod::Delete => self
                .client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .customize()
                .mutate_request(append_nonce(nonce))
                .presigned(presign_config)
                .await
                .map_err(|e| failed(DisplayErrorContext(&e).to_string()))?
                .uri()
                .to_string(),
        };

        if !uri.contains(NONCE_PARAM) {
            return Err(failed("nonce was not signed into the URL".into()));
        }

        Ok(PresignedUrl {
            url: uri,
            method,
            expires_at: issued_at + TimeDelta::seconds(self.expires_in.as_secs() as i64),
        })
    }
}

/// Add the nonce to the request before it is signed.
fn append_nonce(nonce: &str) -> impl Fn(&mut HttpRequest) + Send + Sync + 'static {
    let nonce = nonce.to_string();
    move |req: &mut HttpRequest| {
        let separator = if req.uri().contains('?') { '&' } else { '?' };
        let uri = format!("{}{}{}={}", req.uri(), separator, NONCE_PARAM, nonce);
        if let Err(e) = req.set_uri(uri.as_str()) {
            warn!(error = %e, "Failed to attach capability nonce");
        }
    }
}

/// HTTP clients collapse `.` and `..` path segments, so a URL signed for
/// such a key would be replayed against a different object.
fn check_object_path(bucket: &str, key: &str) -> Result<()> {
    if bucket.is_empty() {
        return Err(Error::Signing("bucket name is empty".into()));
    }
    if key.is_empty() {
        return Err(Error::Signing(format!("{}: object key is empty", bucket)));
    }
    if key.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(Error::Signing(format!(
            "{}/{}: key contains a dot path segment",
            bucket, key
        )));
    }
    Ok(())
}
