//! Webhook delivery

use async_trait::async_trait;
use pollster_core::config::WebhookConfig;
use pollster_core::types::{NotificationPayload, WEBHOOK_CONTENT_TYPE};
use pollster_core::{Error, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Delivers one notification; called concurrently from dispatch tasks
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &NotificationPayload) -> Result<()>;
}

/// POSTs the payload as JSON to a fixed webhook URL
#[derive(Clone)]
pub struct WebhookNotifier {
    http_client: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pollster/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::WebhookTransport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client, url })
    }

    pub fn from_config(config: &WebhookConfig) -> Result<Self> {
        Self::new(config.parsed_url()?, config.timeout())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, payload: &NotificationPayload) -> Result<()> {
        // Each call serializes into its own buffer.
        let body = payload.to_json()?;

        let response = self
            .http_client
            .post(self.url.clone())
            .header(CONTENT_TYPE, WEBHOOK_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::WebhookTransport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(
                bucket = %payload.bucket,
                key = %payload.object,
                status = status.as_u16(),
                "Webhook accepted notification"
            );
            Ok(())
        } else {
            Err(Error::WebhookStatus(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollster_core::types::PresignedUrls;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(key: &str) -> NotificationPayload {
        NotificationPayload {
            s3_endpoint: Some("http://minio:9000".into()),
            bucket: "inbox".into(),
            object: key.into(),
            presigned_urls: PresignedUrls {
                get_url: format!("http://minio:9000/inbox/{}?get", key),
                put_url: format!("http://minio:9000/inbox/{}?put", key),
                delete_url: None,
            },
        }
    }

    fn notifier(server: &MockServer) -> WebhookNotifier {
        let url = Url::parse(&format!("{}/hook", server.uri())).unwrap();
        WebhookNotifier::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_posts_json_payload() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json; charset=utf-8"))
            .and(body_json(json!({
                "s3_endpoint": "http://minio:9000",
                "bucket": "inbox",
                "object": "a.txt",
                "presigned_urls": {
                    "get_url": "http://minio:9000/inbox/a.txt?get",
                    "put_url": "http://minio:9000/inbox/a.txt?put"
                }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        notifier(&server).notify(&payload("a.txt")).await.unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let result = notifier(&server).notify(&payload("a.txt")).await;
        assert!(matches!(result, Err(Error::WebhookStatus(500))));
    }

    #[tokio::test]
    async fn test_transport_error_is_reported() {
        let server = MockServer::start().await;
        let notifier = notifier(&server);
        drop(server);

        let result = notifier.notify(&payload("a.txt")).await;
        assert!(matches!(result, Err(Error::WebhookTransport(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/hook", server.uri())).unwrap();
        let notifier = WebhookNotifier::new(url, Duration::from_millis(200)).unwrap();
        let result = notifier.notify(&payload("slow.txt")).await;
        assert!(matches!(result, Err(Error::WebhookTransport(_))));
    }

    #[test]
    fn test_from_config_requires_url() {
        let config = WebhookConfig::default();
        assert!(matches!(
            WebhookNotifier::from_config(&config),
            Err(Error::MissingConfig(_))
        ));
    }
}
