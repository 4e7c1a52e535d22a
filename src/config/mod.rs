pub mod args;

use args::Command;

use crate::types::{ClientConfigLocation, S3Credentials};
use aws_sdk_s3::types::RequestPayer;
use aws_smithy_types::checksum_config::RequestChecksumCalculation;

/// Smallest part size S3 accepts for every part but the last.
pub const MIN_MULTIPART_CHUNKSIZE: u64 = 5 * 1024 * 1024;

/// Main configuration for s3browse-rs.
///
/// Holds everything the lister, folder tree, upload coordinator and deleter
/// need: the bucket, AWS client settings, listing page size, timeouts,
/// multipart tuning and deletion batch size.
///
/// # Quick Start
///
/// ```
/// use s3browse_rs::Config;
///
/// let config = Config::for_bucket("my-bucket", "eu-north-1");
/// assert_eq!(config.delimiter, "/");
/// assert_eq!(config.batch_size, 1000);
/// ```
///
/// Then customize fields as needed:
///
/// ```
/// use s3browse_rs::Config;
///
/// let mut config = Config::for_bucket("my-bucket", "eu-north-1");
/// config.max_concurrent_parts = 8;
/// config.multipart_chunksize = 16 * 1024 * 1024;
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: String,
    /// Region used for canonical object URLs. The client region in
    /// `client_config` takes precedence when set.
    pub region: String,
    pub show_no_progress: bool,
    pub client_config: Option<ClientConfig>,
    pub force_retry_config: ForceRetryConfig,
    pub tracing_config: Option<TracingConfig>,
    pub delimiter: String,
    pub max_keys: i32,
    pub listing_timeout_milliseconds: Option<u64>,
    pub part_timeout_milliseconds: Option<u64>,
    pub multipart_chunksize: u64,
    pub max_concurrent_parts: u16,
    pub batch_size: u16,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
    /// Subcommand the CLI was invoked with. Unused by the library.
    pub command: Option<Command>,
}

impl Config {
    /// Create a `Config` with library defaults for the given bucket and region.
    ///
    /// ```
    /// use s3browse_rs::Config;
    ///
    /// let config = Config::for_bucket("media", "eu-north-1");
    /// assert_eq!(config.bucket, "media");
    /// assert_eq!(config.listing_timeout_milliseconds, Some(30_000));
    /// ```
    pub fn for_bucket(bucket: &str, region: &str) -> Self {
        Config {
            bucket: bucket.to_string(),
            region: region.to_string(),
            ..Config::default()
        }
    }

    /// Region that canonical URLs are built with.
    pub fn effective_region(&self) -> &str {
        self.client_config
            .as_ref()
            .and_then(|c| c.region.as_deref())
            .unwrap_or(&self.region)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            show_no_progress: false,
            client_config: None,
            force_retry_config: ForceRetryConfig::default(),
            tracing_config: None,
            delimiter: "/".to_string(),
            max_keys: 1000,
            listing_timeout_milliseconds: Some(30_000),
            part_timeout_milliseconds: Some(300_000),
            multipart_chunksize: 8 * 1024 * 1024,
            max_concurrent_parts: 4,
            batch_size: 1000,
            auto_complete_shell: None,
            command: None,
        }
    }
}

impl Default for ForceRetryConfig {
    fn default() -> Self {
        ForceRetryConfig {
            force_retry_count: 0,
            force_retry_interval_milliseconds: 1000,
        }
    }
}

/// AWS S3 client configuration.
///
/// Credential loading, region, endpoint, retry and timeout settings used by
/// [`ClientConfig::create_client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub accelerate: bool,
    pub request_payer: Option<RequestPayer>,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
    pub request_checksum_calculation: RequestChecksumCalculation,
}

/// Retry configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

/// Timeout configuration for AWS SDK operations.
#[derive(Debug, Clone)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

/// Application-level retries for upload parts and single-object delete
/// fallbacks, on top of the AWS SDK's own retries.
#[derive(Debug, Clone, Copy)]
pub struct ForceRetryConfig {
    pub force_retry_count: u32,
    pub force_retry_interval_milliseconds: u64,
}
