use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the client.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Account credentials and device emulation settings
    pub account: AccountConfig,
    /// Device API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// AWS settings (only needed for upload)
    #[serde(default)]
    pub aws: AwsConfig,
    /// Retry policy settings
    #[serde(default)]
    pub retry: RetryConfig,
    /// Export settings
    #[serde(default)]
    pub export: ExportConfig,
    /// Caption service settings
    #[serde(default)]
    pub caption: CaptionConfig,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Account credentials and the device identity presented to the vendor.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Registered account email
    pub email: String,
    /// Registered account password
    pub password: String,
    /// Locale sent with login and listing calls
    #[serde(default = "default_locale")]
    pub locale: String,
    /// App identifier the vendor expects
    #[serde(default = "default_app_identifier")]
    pub app_identifier: String,
    /// Emulated client device identifier
    #[serde(default = "default_device_identifier")]
    pub device_identifier: String,
}

/// Device API transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the versioned device API
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Image proxy base URL for exports
    #[serde(default = "default_image_proxy_base_url")]
    pub image_proxy_base_url: String,
    /// Default per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Page size for asset listings
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// Delay between page fetches in milliseconds
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

/// AWS settings for the vendor's upload bucket and frame queues.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AwsConfig {
    /// Cognito identity pool exchanged for S3 upload credentials
    pub upload_identity_pool_id: Option<String>,
    /// Cognito identity pool exchanged for SQS credentials
    pub sqs_identity_pool_id: Option<String>,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
}

/// Retry policy settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per retryable operation (first try included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff multiplier applied per attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Backoff delay cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Export orchestration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Concurrent downloads against the image proxy
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
    /// Geocode cache capacity
    #[serde(default = "default_geocode_cache_size")]
    pub geocode_cache_size: usize,
    /// Re-download files that already exist on disk
    #[serde(default)]
    pub force: bool,
}

/// Caption service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptionConfig {
    /// Concurrent caption replacements
    #[serde(default = "default_caption_concurrency")]
    pub concurrency: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_app_identifier() -> String {
    "com.pushd.client".to_string()
}

fn default_device_identifier() -> String {
    "0000000000000000".to_string()
}

fn default_api_base_url() -> String {
    "https://api.pushd.com/v5".to_string()
}

fn default_image_proxy_base_url() -> String {
    "https://imgproxy.pushd.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_page_limit() -> u32 {
    1000
}

fn default_page_delay_ms() -> u64 {
    500
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_max_delay_ms() -> u64 {
    15_000
}

fn default_download_concurrency() -> usize {
    5
}

fn default_geocode_cache_size() -> usize {
    1000
}

fn default_caption_concurrency() -> usize {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            image_proxy_base_url: default_image_proxy_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            page_limit: default_page_limit(),
            page_delay_ms: default_page_delay_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            download_concurrency: default_download_concurrency(),
            geocode_cache_size: default_geocode_cache_size(),
            force: false,
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_caption_concurrency(),
        }
    }
}

impl Config {
    /// Load configuration from config files and environment variables.
    ///
    /// Environment variables use the `AURA` prefix with `__` separators,
    /// e.g. `AURA__ACCOUNT__EMAIL` -> `account.email`.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/aura").required(false))
            .add_source(
                config::Environment::with_prefix("AURA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Default per-request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Delay inserted between page fetches.
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.api.page_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_page_limit(), 1000);
        assert_eq!(default_max_attempts(), 4);
        assert_eq!(default_download_concurrency(), 5);
        assert_eq!(default_api_base_url(), "https://api.pushd.com/v5");
    }

    #[test]
    fn test_caption_concurrency_is_independent_of_export() {
        let caption = CaptionConfig::default();
        let export = ExportConfig::default();
        assert_eq!(caption.concurrency, 10);
        assert_ne!(caption.concurrency, export.download_concurrency);
    }

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.base_delay_ms, 500);
        assert!(retry.multiplier > 1.0);
        assert!(retry.max_delay_ms > retry.base_delay_ms);
    }
}
