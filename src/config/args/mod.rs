use crate::config::{
    CLITimeoutConfig, ClientConfig, Config, ForceRetryConfig, MIN_MULTIPART_CHUNKSIZE,
    RetryConfig, TracingConfig,
};
use crate::types::{AccessKeys, ClientConfigLocation, S3Credentials};
use aws_sdk_s3::types::RequestPayer;
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use clap::builder::NonEmptyStringValueParser;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::ffi::OsString;
use std::path::PathBuf;

pub mod value_parser;

use value_parser::human_bytes::{check_human_bytes, parse_human_bytes};
use value_parser::url::check_scheme;


// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_DELIMITER: &str = "/";
const DEFAULT_BATCH_SIZE: u16 = 1000;
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_LISTING_TIMEOUT_MILLISECONDS: u64 = 30_000;
const DEFAULT_PART_TIMEOUT_MILLISECONDS: u64 = 300_000;
const DEFAULT_MULTIPART_CHUNKSIZE: &str = "8MiB";
const DEFAULT_MAX_CONCURRENT_PARTS: u16 = 4;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_FORCE_RETRY_COUNT: u32 = 3;
const DEFAULT_FORCE_RETRY_INTERVAL_MILLISECONDS: u64 = 1000;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;
const DEFAULT_ACCELERATE: bool = false;
const DEFAULT_REQUEST_PAYER: bool = false;
const DEFAULT_SHOW_NO_PROGRESS: bool = false;

/// S3 caps a single part at 5 GiB.
const MAX_MULTIPART_CHUNKSIZE: u64 = 5 * 1024 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_BUCKET_EMPTY: &str = "Bucket name must not be empty.";
const ERROR_MESSAGE_COMMAND_REQUIRED: &str =
    "A subcommand is required (ls, tree, upload, rm, rmdir or url).";
const ERROR_MESSAGE_BATCH_SIZE_ZERO: &str = "Batch size must be at least 1.";
const ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE: &str = "Batch size must be at most 1000 (S3 API limit).";
const ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE: &str = "Max keys must be between 1 and 1000.";
const ERROR_MESSAGE_MAX_CONCURRENT_PARTS_ZERO: &str = "Max concurrent parts must be at least 1.";
const ERROR_MESSAGE_MULTIPART_CHUNKSIZE_TOO_SMALL: &str =
    "Multipart chunksize must be at least 5MiB (S3 API limit).";
const ERROR_MESSAGE_MULTIPART_CHUNKSIZE_TOO_LARGE: &str =
    "Multipart chunksize must be at most 5GiB (S3 API limit).";
const ERROR_MESSAGE_SECRET_KEY_REQUIRED: &str =
    "--secret-access-key is required when --access-key is given.";

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// s3browse - Amazon S3 folder browser and uploader.
///
/// Browse an S3 bucket as a folder tree, upload files with progress, and
/// delete objects or whole folders.
///
/// Example:
///   s3browse --bucket media ls videos/
///   s3browse --bucket media tree
///   s3browse --bucket media upload videos/ ./clip.mp4 ./poster.png
///   s3browse --bucket media rmdir videos/old/
#[derive(Parser, Clone, Debug)]
#[command(name = "s3browse", version, about, long_about = None)]
pub struct CLIArgs {
    /// Bucket to browse.
    #[arg(
        long,
        env,
        value_parser = NonEmptyStringValueParser::new(),
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "ignored"),
        required = false,
        global = true,
    )]
    pub bucket: String,

    #[command(subcommand)]
    pub command: Option<Command>,

    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Don't show upload progress bars.
    #[arg(long, env, default_value_t = DEFAULT_SHOW_NO_PROGRESS, global = true, help_heading = "General")]
    pub show_no_progress: bool,

    // -----------------------------------------------------------------------
    // Listing options
    // -----------------------------------------------------------------------
    /// Folder delimiter. An empty delimiter lists every key as a flat file list.
    #[arg(long, env, default_value = DEFAULT_DELIMITER, global = true, help_heading = "Listing")]
    pub delimiter: String,

    /// Max keys per listing request (1-1000).
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, global = true, help_heading = "Listing")]
    pub max_keys: i32,

    /// Deadline for a single listing call in milliseconds. 0 disables it.
    #[arg(long, env, default_value_t = DEFAULT_LISTING_TIMEOUT_MILLISECONDS, global = true, help_heading = "Listing")]
    pub listing_timeout_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Upload options
    // -----------------------------------------------------------------------
    /// Part size for multipart uploads. Smaller files use a single PutObject.
    #[arg(
        long,
        env,
        default_value = DEFAULT_MULTIPART_CHUNKSIZE,
        value_parser = check_human_bytes,
        global = true,
        help_heading = "Upload",
        long_help = r#"Part size for multipart uploads. Files no larger than this are sent with a single PutObject.
Allow suffixes: KB, KiB, MB, MiB, GB, GiB"#
    )]
    pub multipart_chunksize: String,

    /// Number of parts of one file uploaded concurrently.
    #[arg(long, env, default_value_t = DEFAULT_MAX_CONCURRENT_PARTS, global = true, help_heading = "Upload")]
    pub max_concurrent_parts: u16,

    /// Deadline for a single PutObject or UploadPart round-trip in milliseconds. 0 disables it.
    #[arg(long, env, default_value_t = DEFAULT_PART_TIMEOUT_MILLISECONDS, global = true, help_heading = "Upload")]
    pub part_timeout_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Deletion options
    // -----------------------------------------------------------------------
    /// Number of objects per DeleteObjects request (1-1000).
    /// When set to 1, uses single-object deletion (DeleteObject API).
    #[arg(long, env, default_value_t = DEFAULT_BATCH_SIZE, global = true, help_heading = "Deletion")]
    pub batch_size: u16,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Verbosity level. -q (quiet), default (normal), -v, -vv, -vvv.
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, global = true, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, global = true, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, global = true, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, global = true, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, global = true, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for retries.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, global = true, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    /// Application-level retries for upload parts and delete fallbacks (after SDK retries).
    #[arg(long, env, default_value_t = DEFAULT_FORCE_RETRY_COUNT, global = true, help_heading = "Retry")]
    pub force_retry_count: u32,

    /// Interval in ms between force retries.
    #[arg(long, env, default_value_t = DEFAULT_FORCE_RETRY_INTERVAL_MILLISECONDS, global = true, help_heading = "Retry")]
    pub force_retry_interval_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Overall operation timeout in milliseconds.
    #[arg(long, env, global = true, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, env, global = true, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, global = true, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, global = true, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // AWS configuration
    // -----------------------------------------------------------------------
    /// AWS config file path.
    #[arg(long, env, global = true, help_heading = "AWS")]
    pub aws_config_file: Option<PathBuf>,

    /// AWS shared credentials file path.
    #[arg(long, env, global = true, help_heading = "AWS")]
    pub aws_shared_credentials_file: Option<PathBuf>,

    /// AWS profile. If not set, uses the default credential chain.
    #[arg(long, env = "S3BROWSE_PROFILE", value_parser = NonEmptyStringValueParser::new(), global = true, help_heading = "AWS")]
    pub profile: Option<String>,

    /// AWS access key ID.
    #[arg(long, env = "S3BROWSE_ACCESS_KEY", value_parser = NonEmptyStringValueParser::new(), conflicts_with = "profile", global = true, help_heading = "AWS")]
    pub access_key: Option<String>,

    /// AWS secret access key.
    #[arg(long, env = "S3BROWSE_SECRET_ACCESS_KEY", value_parser = NonEmptyStringValueParser::new(), requires = "access_key", global = true, help_heading = "AWS")]
    pub secret_access_key: Option<String>,

    /// AWS session token.
    #[arg(long, env = "S3BROWSE_SESSION_TOKEN", value_parser = NonEmptyStringValueParser::new(), requires = "access_key", global = true, help_heading = "AWS")]
    pub session_token: Option<String>,

    /// AWS region. Also used to build canonical object URLs.
    #[arg(long, env = "S3BROWSE_REGION", value_parser = NonEmptyStringValueParser::new(), global = true, help_heading = "AWS")]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint URL (e.g. MinIO, Wasabi).
    #[arg(long, env, value_parser = check_scheme, global = true, help_heading = "AWS")]
    pub endpoint_url: Option<String>,

    /// Force path-style access (required for some S3-compatible services).
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, global = true, help_heading = "AWS")]
    pub force_path_style: bool,

    /// Enable S3 Transfer Acceleration.
    #[arg(long, env, default_value_t = DEFAULT_ACCELERATE, global = true, help_heading = "AWS")]
    pub accelerate: bool,

    /// Enable requester-pays for the bucket.
    #[arg(long, env, default_value_t = DEFAULT_REQUEST_PAYER, global = true, help_heading = "AWS")]
    pub request_payer: bool,

    /// Disable stalled stream protection.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, global = true, help_heading = "AWS")]
    pub disable_stalled_stream_protection: bool,

    // -----------------------------------------------------------------------
    // Advanced options
    // -----------------------------------------------------------------------
    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

/// Subcommands of the `s3browse` binary.
#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Command {
    /// List one level of folders and files below PREFIX.
    Ls {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// List every folder and file below PREFIX, depth-first.
    Tree {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Upload files into FOLDER concurrently.
    Upload {
        /// Destination folder key ("" for the bucket root).
        folder: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete one object by URL, s3:// URI or key.
    Rm { reference: String },
    /// Delete every object below PREFIX.
    Rmdir { prefix: String },
    /// Print the canonical URL of KEY.
    Url { key: String },
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use s3browse_rs::config::args::{Command, parse_from_args};
///
/// let args = vec!["s3browse", "--bucket", "media", "ls", "videos/"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert_eq!(cli_args.bucket, "media");
/// assert_eq!(cli_args.command, Some(Command::Ls { prefix: "videos/".to_string() }));
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.auto_complete_shell.is_some() {
            return Ok(());
        }
        if self.bucket.trim().is_empty() {
            return Err(ERROR_MESSAGE_BUCKET_EMPTY.to_string());
        }
        if self.command.is_none() {
            return Err(ERROR_MESSAGE_COMMAND_REQUIRED.to_string());
        }
        if self.batch_size == 0 {
            return Err(ERROR_MESSAGE_BATCH_SIZE_ZERO.to_string());
        }
        if self.batch_size > 1000 {
            return Err(ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE.to_string());
        }
        if !(1..=1000).contains(&self.max_keys) {
            return Err(ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE.to_string());
        }
        if self.max_concurrent_parts == 0 {
            return Err(ERROR_MESSAGE_MAX_CONCURRENT_PARTS_ZERO.to_string());
        }
        let chunksize = parse_human_bytes(&self.multipart_chunksize)?;
        if chunksize < MIN_MULTIPART_CHUNKSIZE {
            return Err(ERROR_MESSAGE_MULTIPART_CHUNKSIZE_TOO_SMALL.to_string());
        }
        if chunksize > MAX_MULTIPART_CHUNKSIZE {
            return Err(ERROR_MESSAGE_MULTIPART_CHUNKSIZE_TOO_LARGE.to_string());
        }
        if self.access_key.is_some() && self.secret_access_key.is_none() {
            return Err(ERROR_MESSAGE_SECRET_KEY_REQUIRED.to_string());
        }
        Ok(())
    }

    fn build_client_config(&self) -> Option<ClientConfig> {
        let credential = if let Some(ref profile) = self.profile {
            S3Credentials::Profile(profile.clone())
        } else if let Some(ref access_key) = self.access_key {
            S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: self.secret_access_key.clone().unwrap_or_default(),
                    session_token: self.session_token.clone(),
                },
            }
        } else {
            S3Credentials::FromEnvironment
        };

        let request_payer = if self.request_payer {
            Some(RequestPayer::Requester)
        } else {
            None
        };

        Some(ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: self.aws_config_file.clone(),
                aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
            },
            credential,
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            force_path_style: self.force_path_style,
            accelerate: self.accelerate,
            request_payer,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        })
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }
}

fn non_zero_milliseconds(value: u64) -> Option<u64> {
    if value == 0 { None } else { Some(value) }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        args.validate()?;

        let client_config = args.build_client_config();
        let tracing_config = args.build_tracing_config();
        let multipart_chunksize = parse_human_bytes(&args.multipart_chunksize)?;

        Ok(Config {
            bucket: args.bucket.trim().to_string(),
            region: args
                .region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            show_no_progress: args.show_no_progress,
            client_config,
            force_retry_config: ForceRetryConfig {
                force_retry_count: args.force_retry_count,
                force_retry_interval_milliseconds: args.force_retry_interval_milliseconds,
            },
            tracing_config,
            delimiter: args.delimiter,
            max_keys: args.max_keys,
            listing_timeout_milliseconds: non_zero_milliseconds(args.listing_timeout_milliseconds),
            part_timeout_milliseconds: non_zero_milliseconds(args.part_timeout_milliseconds),
            multipart_chunksize,
            max_concurrent_parts: args.max_concurrent_parts,
            batch_size: args.batch_size,
            auto_complete_shell: args.auto_complete_shell,
            command: args.command,
        })
    }
}
