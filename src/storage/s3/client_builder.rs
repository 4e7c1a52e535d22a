#![allow(deprecated)]

use std::time::Duration;

use aws_config::meta::region::RegionProviderChain;
use aws_config::profile::ProfileFileRegionProvider;
use aws_config::profile::profile_file::{ProfileFileKind, ProfileFiles};
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, ConfigLoader, SdkConfig};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Builder, Credentials, Region, StalledStreamProtectionConfig};
use aws_smithy_types::timeout::TimeoutConfig;

use crate::config::ClientConfig;
use crate::types::S3Credentials;

const STATIC_CREDENTIALS_PROVIDER_NAME: &str = "s3browse-static-credentials";

impl ClientConfig {
    /// Build the S3 client described by this configuration.
    ///
    /// Credentials, region, endpoint, retry, timeout and stalled stream
    /// settings are resolved through `aws-config`; S3-specific switches
    /// (path style, acceleration, checksum calculation) are applied on top.
    pub async fn create_client(&self) -> Client {
        let sdk_config = self.load_sdk_config().await;

        let config_builder = Builder::from(&sdk_config)
            .force_path_style(self.force_path_style)
            .accelerate(self.accelerate)
            .request_checksum_calculation(self.request_checksum_calculation);

        Client::from_conf(config_builder.build())
    }

    async fn load_sdk_config(&self) -> SdkConfig {
        let mut config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(self.build_region_provider())
            .retry_config(self.build_retry_config());

        config_loader = self.apply_credentials(config_loader);

        if let Some(ref endpoint_url) = self.endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint_url);
        }

        if let Some(timeout_config) = self.build_timeout_config() {
            config_loader = config_loader.timeout_config(timeout_config);
        }

        let stalled_stream_protection = if self.disable_stalled_stream_protection {
            StalledStreamProtectionConfig::disabled()
        } else {
            StalledStreamProtectionConfig::enabled().build()
        };
        config_loader = config_loader.stalled_stream_protection(stalled_stream_protection);

        config_loader.load().await
    }

    fn apply_credentials(&self, config_loader: ConfigLoader) -> ConfigLoader {
        match &self.credential {
            S3Credentials::Credentials { access_keys } => {
                let credentials = Credentials::new(
                    access_keys.access_key.clone(),
                    access_keys.secret_access_key.clone(),
                    access_keys.session_token.clone(),
                    None,
                    STATIC_CREDENTIALS_PROVIDER_NAME,
                );
                config_loader.credentials_provider(credentials)
            }
            S3Credentials::Profile(profile_name) => {
                let config_loader = config_loader.profile_name(profile_name);
                match self.build_profile_files() {
                    Some(profile_files) => config_loader.profile_files(profile_files),
                    None => config_loader,
                }
            }
            S3Credentials::FromEnvironment => config_loader,
        }
    }

    fn build_region_provider(&self) -> RegionProviderChain {
        let explicit_region = self.region.clone().map(Region::new);

        match &self.credential {
            S3Credentials::Profile(profile_name) => {
                let mut profile_region = ProfileFileRegionProvider::builder().profile_name(profile_name);
                if let Some(profile_files) = self.build_profile_files() {
                    profile_region = profile_region.profile_files(profile_files);
                }
                RegionProviderChain::first_try(explicit_region)
                    .or_else(profile_region.build())
                    .or_default_provider()
            }
            _ => RegionProviderChain::first_try(explicit_region).or_default_provider(),
        }
    }

    fn build_profile_files(&self) -> Option<ProfileFiles> {
        let location = &self.client_config_location;
        if location.aws_config_file.is_none() && location.aws_shared_credentials_file.is_none() {
            return None;
        }

        let mut builder = ProfileFiles::builder();
        builder = match location.aws_config_file {
            Some(ref path) => builder.with_file(ProfileFileKind::Config, path),
            None => builder.include_default_config_file(true),
        };
        builder = match location.aws_shared_credentials_file {
            Some(ref path) => builder.with_file(ProfileFileKind::Credentials, path),
            None => builder.include_default_credentials_file(true),
        };
        Some(builder.build())
    }

    fn build_retry_config(&self) -> RetryConfig {
        RetryConfig::standard()
            .with_max_attempts(self.retry_config.aws_max_attempts)
            .with_initial_backoff(Duration::from_millis(
                self.retry_config.initial_backoff_milliseconds,
            ))
    }

    fn build_timeout_config(&self) -> Option<TimeoutConfig> {
        let timeouts = &self.cli_timeout_config;
        if timeouts.operation_timeout_milliseconds.is_none()
            && timeouts.operation_attempt_timeout_milliseconds.is_none()
            && timeouts.connect_timeout_milliseconds.is_none()
            && timeouts.read_timeout_milliseconds.is_none()
        {
            return None;
        }

        let mut builder = TimeoutConfig::builder();
        if let Some(ms) = timeouts.operation_timeout_milliseconds {
            builder = builder.operation_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = timeouts.operation_attempt_timeout_milliseconds {
            builder = builder.operation_attempt_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = timeouts.connect_timeout_milliseconds {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = timeouts.read_timeout_milliseconds {
            builder = builder.read_timeout(Duration::from_millis(ms));
        }
        Some(builder.build())
    }
}
