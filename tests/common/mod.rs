//! Shared E2E test infrastructure for s3browse-rs.
//!
//! Provides `TestHelper` for bucket management and object operations against
//! real AWS S3. All helpers use the `s3browse-e2e-test` AWS profile.

#![allow(dead_code)]

use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
};
use s3browse_rs::config::args::build_config_from_args;
use s3browse_rs::storage::Storage;
use s3browse_rs::{Config, create_storage};
use uuid::Uuid;

/// AWS profile used for all E2E tests.
const AWS_PROFILE: &str = "s3browse-e2e-test";

/// Region used when the profile does not name one.
const DEFAULT_REGION: &str = "us-east-1";

/// RAII guard that deletes all objects and the bucket when dropped.
pub struct BucketGuard {
    helper: Arc<TestHelper>,
    bucket: String,
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        let helper = self.helper.clone();
        let bucket = self.bucket.clone();
        // A panicking test may already be tearing the runtime down.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(async move {
                    helper.delete_bucket_cascade(&bucket).await;
                });
            });
        }));
    }
}

pub struct TestHelper {
    client: Client,
    region: String,
}

impl TestHelper {
    pub async fn new() -> Arc<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(AWS_PROFILE)
            .load()
            .await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let client = Client::new(&sdk_config);

        Arc::new(Self { client, region })
    }

    pub fn bucket_guard(self: &Arc<Self>, bucket: &str) -> BucketGuard {
        BucketGuard {
            helper: Arc::clone(self),
            bucket: bucket.to_string(),
        }
    }

    /// Returns a name like `s3browse-e2e-<uuid>`.
    pub fn generate_bucket_name(&self) -> String {
        format!("s3browse-e2e-{}", Uuid::new_v4())
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn create_bucket(&self, bucket: &str) {
        let mut builder = self.client.create_bucket().bucket(bucket);

        // us-east-1 must NOT specify a location constraint
        if self.region != "us-east-1" {
            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            builder = builder.create_bucket_configuration(config);
        }

        builder
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to create bucket {bucket}: {e}"));
    }

    /// Delete every object and then the bucket itself. Errors are ignored.
    pub async fn delete_bucket_cascade(&self, bucket: &str) {
        let keys = self.try_list_objects(bucket, "").await.unwrap_or_default();
        for chunk in keys.chunks(1000) {
            let objects: Vec<ObjectIdentifier> = chunk
                .iter()
                .filter_map(|key| ObjectIdentifier::builder().key(key).build().ok())
                .collect();
            let Ok(delete) = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
            else {
                continue;
            };
            let _ = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await;
        }

        let _ = self.client.delete_bucket().bucket(bucket).send().await;
    }

    pub async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body.into())
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put object {key}: {e}"));
    }

    pub async fn get_object(&self, bucket: &str, key: &str) -> (Vec<u8>, Option<String>) {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to get object {key}: {e}"));
        let content_type = output.content_type().map(|s| s.to_string());
        let body = output
            .body
            .collect()
            .await
            .unwrap_or_else(|e| panic!("Failed to read object {key}: {e}"))
            .into_bytes()
            .to_vec();
        (body, content_type)
    }

    /// List every object key under the given prefix.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Vec<String> {
        self.try_list_objects(bucket, prefix)
            .await
            .unwrap_or_else(|e| panic!("Failed to list objects in {bucket}/{prefix}: {e}"))
    }

    async fn try_list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, String> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req.send().await.map_err(|e| e.to_string())?;
            keys.extend(resp.contents().iter().filter_map(|o| o.key().map(String::from)));

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(keys)
    }

    pub async fn count_objects(&self, bucket: &str, prefix: &str) -> usize {
        self.list_objects(bucket, prefix).await.len()
    }

    /// Build a Config the way the CLI does.
    ///
    /// Prepends the binary name, the bucket, the region and the e2e profile,
    /// and appends an `ls` subcommand.
    pub fn build_config(&self, bucket: &str, args: Vec<&str>) -> Config {
        let mut full_args: Vec<String> = vec![
            "s3browse".to_string(),
            "--bucket".to_string(),
            bucket.to_string(),
            "--region".to_string(),
            self.region.clone(),
            "--profile".to_string(),
            AWS_PROFILE.to_string(),
        ];
        full_args.extend(args.iter().map(|s| s.to_string()));
        full_args.push("ls".to_string());

        build_config_from_args(full_args)
            .unwrap_or_else(|e| panic!("Failed to build config from args: {e}"))
    }

    pub async fn storage(config: &Config) -> Storage {
        create_storage(config.clone())
            .await
            .unwrap_or_else(|e| panic!("Failed to create storage: {e}"))
    }
}

/// Default timeout for E2E tests (5 minutes).
pub const E2E_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Wraps an async E2E test body with a timeout.
#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}
