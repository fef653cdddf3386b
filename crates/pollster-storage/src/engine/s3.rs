//! S3-compatible object store backed by the AWS SDK

use async_trait::async_trait;
use aws_config::Region;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Builder as S3ConfigBuilder};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use pollster_core::config::StorageConfig;
use pollster_core::types::{ListPage, ObjectKey};
use pollster_core::{Error, Result};
use tracing::{debug, info};

pub struct S3ObjectStore {
    client: Client,
    region: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
        }
    }

    /// Build a store from the storage section of the configuration.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(build_s3_client(config), &config.region)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Build a client with static credentials against a custom endpoint.
///
/// The same client lists, deletes and presigns, so capability URLs carry
/// the endpoint, region and addressing style the store itself uses.
pub fn build_s3_client(config: &StorageConfig) -> Client {
    let credentials = Credentials::new(
        &config.access_key,
        &config.secret_key,
        config.session_token.clone(),
        None,
        "pollster",
    );

    let s3_config = S3ConfigBuilder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials)
        .endpoint_url(&config.endpoint)
        .force_path_style(config.path_style)
        .build();

    Client::from_conf(s3_config)
}

#[async_trait]
impl super::ObjectStore for S3ObjectStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        max_keys: i32,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(max_keys)
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(|e| Error::ListFailed {
                bucket: bucket.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        let keys = resp
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .map(ObjectKey::from)
            .collect();

        let next_continuation_token = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            keys,
            next_continuation_token,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &ObjectKey) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key.as_str())
            .send()
            .await
            .map_err(|e| Error::DeleteFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(bucket, key = %key, "Deleted object");
        Ok(())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let mut req = self.client.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint
        if self.region != pollster_core::DEFAULT_REGION {
            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            req = req.create_bucket_configuration(config);
        }

        match req.send().await {
            Ok(_) => {
                info!(bucket, "Created bucket");
                Ok(())
            }
            Err(e) => match e.as_service_error() {
                Some(err) if err.is_bucket_already_owned_by_you() || err.is_bucket_already_exists() => {
                    debug!(bucket, "Bucket already exists");
                    Ok(())
                }
                _ => Err(Error::CreateBucketFailed {
                    bucket: bucket.to_string(),
                    message: DisplayErrorContext(&e).to_string(),
                }),
            },
        }
    }
}
