//! Configuration for Pollster

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::types::{check_presign_expiry, DEFAULT_PRESIGN_EXPIRES};
use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollsterConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub presign: PresignConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl PollsterConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("Failed to read config {}: {}", path, e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overlay values from an environment lookup.
    ///
    /// Both the `POLLSTER_*` names and the bare names used by older
    /// deployments (`BUCKET`, `STORAGE_URL`, `WEBHOOK_ENDPOINT`, ...) are
    /// honoured; the `POLLSTER_*` name wins when both are set. A numeric
    /// variable that does not parse is an error naming that variable.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |names: &[&str]| names.iter().find_map(|name| lookup(name));
        let number = |name: &str| -> Result<Option<u64>> { parse_var(name, lookup(name)) };

        if let Some(endpoint) = get(&["POLLSTER_STORAGE_URL", "STORAGE_URL"]) {
            self.storage.endpoint = endpoint;
        }
        if let Some(endpoint) = get(&["POLLSTER_PUBLIC_STORAGE_URL", "RAW_ENDPOINT"]) {
            self.storage.public_endpoint = Some(endpoint);
        }
        if let Some(region) = get(&["POLLSTER_REGION", "REGION"]) {
            self.storage.region = region;
        }
        if let Some(bucket) = get(&["POLLSTER_BUCKET", "BUCKET"]) {
            self.storage.bucket = bucket;
        }
        if let Some(key) = get(&["POLLSTER_ACCESS_KEY_ID", "ACCESS_KEY_ID"]) {
            self.storage.access_key = key;
        }
        if let Some(secret) = get(&["POLLSTER_SECRET_ACCESS_KEY", "SECRET_ACCESS_KEY"]) {
            self.storage.secret_key = secret;
        }
        if let Some(token) = get(&["POLLSTER_SESSION_TOKEN", "SESSION_TOKEN"]) {
            self.storage.session_token = Some(token);
        }
        if let Some(prefix) = get(&["POLLSTER_PREFIX"]) {
            self.storage.prefix = Some(prefix);
        }

        if let Some(url) = get(&["POLLSTER_WEBHOOK_ENDPOINT", "WEBHOOK_ENDPOINT"]) {
            self.webhook.url = Some(url);
        }
        if let Some(secs) = number("POLLSTER_WEBHOOK_TIMEOUT")? {
            self.webhook.timeout_secs = secs;
        }
        if let Some(n) = number("POLLSTER_MAX_CONCURRENT")? {
            self.webhook.max_concurrent = n as usize;
        }

        if let Some(secs) = number("POLLSTER_BACKOFF")? {
            self.poll.backoff_secs = secs;
        }
        if let Some(size) = number("POLLSTER_PAGE_SIZE")? {
            self.poll.page_size = i32::try_from(size).map_err(|_| {
                Error::InvalidConfig(format!("POLLSTER_PAGE_SIZE is out of range: {}", size))
            })?;
        }
        if let Some(pages) = number("POLLSTER_MAX_PAGES")? {
            self.poll.max_pages = pages as usize;
        }

        if let Some(secs) = number("POLLSTER_PRESIGN_EXPIRES")? {
            self.presign.expires_secs = secs;
        }

        if let Some(level) = get(&["POLLSTER_LOG_LEVEL"]) {
            self.logging.level = level;
        }
        if let Some(format) = get(&["POLLSTER_LOG_FORMAT"]) {
            self.logging.format = format;
        }
        if let Some(addr) = get(&["POLLSTER_METRICS_ADDRESS"]) {
            self.metrics.listen_address = Some(addr);
        }
        Ok(())
    }

    /// Check everything the poll loop depends on before any network I/O.
    pub fn validate(&self) -> Result<()> {
        self.webhook.parsed_url()?;
        self.storage.validate()?;
        self.poll.validate()?;

        check_presign_expiry(self.presign.expires_secs)?;

        if self.webhook.max_concurrent == 0 {
            return Err(Error::InvalidConfig(
                "webhook.max_concurrent must be at least 1".into(),
            ));
        }
        if self.webhook.timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "webhook.timeout_secs must be at least 1".into(),
            ));
        }
        if let Some(addr) = &self.metrics.listen_address {
            addr.parse::<std::net::SocketAddr>().map_err(|e| {
                Error::InvalidConfig(format!("Invalid metrics.listen_address {}: {}", addr, e))
            })?;
        }
        Ok(())
    }
}

fn parse_var(name: &str, value: Option<String>) -> Result<Option<u64>> {
    value
        .map(|raw| {
            raw.trim().parse::<u64>().map_err(|_| {
                Error::InvalidConfig(format!("{} must be a non-negative integer, got {:?}", name, raw))
            })
        })
        .transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3 endpoint used for API calls and for signing capability URLs
    pub endpoint: String,
    /// Endpoint advertised to webhook receivers as `s3_endpoint`
    pub public_endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Temporary-credential token, signed into every request and capability URL
    pub session_token: Option<String>,
    /// Restrict listing to keys under this prefix
    pub prefix: Option<String>,
    pub path_style: bool,
    /// Create the bucket at startup when it does not exist
    pub create_bucket: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            public_endpoint: None,
            region: crate::DEFAULT_REGION.to_string(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            session_token: None,
            prefix: None,
            path_style: true,
            create_bucket: true,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(Error::MissingConfig(
                "storage.bucket (BUCKET) is not set".into(),
            ));
        }
        let endpoint = Url::parse(&self.endpoint).map_err(|e| {
            Error::InvalidUrl(format!("storage endpoint {}: {}", self.endpoint, e))
        })?;
        if endpoint.host_str().is_none() {
            return Err(Error::InvalidUrl(format!(
                "storage endpoint {} has no host",
                self.endpoint
            )));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(Error::MissingConfig(
                "storage credentials (ACCESS_KEY_ID / SECRET_ACCESS_KEY) are not set".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Notification target; required
    pub url: Option<String>,
    pub timeout_secs: u64,
    /// Upper bound on in-flight deliveries per round
    pub max_concurrent: usize,
    /// Include the signed DELETE URL in the payload
    pub include_delete_url: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
            max_concurrent: 16,
            include_delete_url: true,
        }
    }
}

impl WebhookConfig {
    /// The webhook URL, parsed and checked to be an absolute http(s) URL.
    pub fn parsed_url(&self) -> Result<Url> {
        let raw = match self.url.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => {
                return Err(Error::MissingConfig(
                    "webhook.url (WEBHOOK_ENDPOINT) is not set".into(),
                ))
            }
        };

        let url = Url::parse(raw)
            .map_err(|e| Error::InvalidUrl(format!("invalid webhook URL {}: {}", raw, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::InvalidUrl(format!(
                    "webhook URL {} must use http or https, not {}",
                    raw, other
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(Error::InvalidUrl(format!("webhook URL {} has no host", raw)));
        }
        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Sleep between rounds, in seconds
    pub backoff_secs: u64,
    /// `max-keys` for each listing page
    pub page_size: i32,
    /// Pages fetched per round; 0 follows continuation markers to the end
    pub max_pages: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            backoff_secs: 5,
            page_size: crate::MAX_PAGE_SIZE,
            max_pages: 1,
        }
    }
}

impl PollConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backoff_secs == 0 {
            return Err(Error::InvalidConfig(
                "poll.backoff_secs must be at least 1".into(),
            ));
        }
        if !(1..=crate::MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(Error::InvalidConfig(format!(
                "poll.page_size must be between 1 and {}",
                crate::MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresignConfig {
    /// Validity window of every capability URL, in seconds
    pub expires_secs: u64,
}

impl Default for PresignConfig {
    fn default() -> Self {
        Self {
            expires_secs: DEFAULT_PRESIGN_EXPIRES,
        }
    }
}

impl PresignConfig {
    pub fn expires_in(&self) -> Duration {
        Duration::from_secs(self.expires_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Address for the Prometheus scrape endpoint; disabled when unset
    pub listen_address: Option<String>,
}
