pub mod client_builder;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier, RequestPayer,
};
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use bytes::Bytes;
use std::sync::Arc;

use crate::config::Config;
use crate::storage::{ListObjectsPage, Storage, StorageFactory, StorageTrait};
use crate::types::error::S3BrowseError;

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// For service errors (S3 API responses), returns the S3 error code
/// (e.g. "AccessDenied", "NoSuchBucket") and the human-readable error
/// message from the response. For other error types (network, timeout,
/// construction failure), returns "N/A" as the code and the full error
/// description as the message.
fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

/// Factory for creating S3 storage instances.
pub struct S3StorageFactory;

#[async_trait]
impl StorageFactory for S3StorageFactory {
    async fn create(config: Config) -> Result<Storage> {
        if config.bucket.is_empty() {
            return Err(anyhow!(S3BrowseError::InvalidConfig(
                "bucket name must not be empty".to_string()
            )));
        }

        let client = if let Some(ref client_config) = config.client_config {
            Some(Arc::new(client_config.create_client().await))
        } else {
            None
        };

        // The resolved client region wins over the configured fallback.
        let region = client
            .as_ref()
            .and_then(|c| c.config().region().map(|r| r.as_ref().to_string()))
            .unwrap_or_else(|| config.effective_region().to_string());
        let request_payer = config
            .client_config
            .as_ref()
            .and_then(|c| c.request_payer.clone());

        tracing::debug!(
            bucket = config.bucket,
            region = region,
            has_client = client.is_some(),
            "S3 storage created."
        );

        Ok(Box::new(S3Storage {
            bucket: config.bucket,
            region,
            client,
            request_payer,
        }))
    }
}

/// [`StorageTrait`] over a real S3 (or S3-compatible) bucket.
#[derive(Clone)]
struct S3Storage {
    bucket: String,
    region: String,
    client: Option<Arc<Client>>,
    request_payer: Option<RequestPayer>,
}

impl S3Storage {
    fn client(&self) -> Result<&Client> {
        self.client.as_deref().ok_or_else(|| {
            anyhow!(S3BrowseError::InvalidConfig(
                "S3 client is not configured".to_string()
            ))
        })
    }
}

#[async_trait]
impl StorageTrait for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn list_objects_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ListObjectsPage> {
        let output = self
            .client()?
            .list_objects_v2()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_delimiter(delimiter.map(String::from))
            .set_continuation_token(continuation_token)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    prefix = prefix,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 ListObjectsV2 API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    prefix,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::list_objects_v2() failed.")
            })?;

        Ok(ListObjectsPage {
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(String::from))
                .collect(),
            keys: output
                .contents()
                .iter()
                .filter_map(|o| o.key().map(String::from))
                .collect(),
            is_truncated: output.is_truncated() == Some(true),
            next_continuation_token: output.next_continuation_token().map(String::from),
        })
    }

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let content_length = body.len();
        self.client()?
            .put_object()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    content_length = content_length,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 PutObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::put_object() failed.")
            })?;

        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String> {
        let output = self
            .client()?
            .create_multipart_upload()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 CreateMultipartUpload API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::create_multipart_upload() failed.")
            })?;

        output
            .upload_id()
            .map(String::from)
            .context("CreateMultipartUpload response has no upload id.")
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        let content_length = body.len();
        let output = self
            .client()?
            .upload_part()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    part_number = part_number,
                    content_length = content_length,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 UploadPart API call failed for s3://{}/{} part {}: {} ({}).",
                    self.bucket,
                    key,
                    part_number,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::upload_part() failed.")
            })?;

        let e_tag = output
            .e_tag()
            .context("UploadPart response has no ETag.")?;

        Ok(CompletedPart::builder()
            .e_tag(e_tag)
            .part_number(part_number)
            .build())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()> {
        let part_count = parts.len();
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client()?
            .complete_multipart_upload()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    key = key,
                    part_count = part_count,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 CompleteMultipartUpload API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::complete_multipart_upload() failed.")
            })?;

        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        self.client()?
            .abort_multipart_upload()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    upload_id = upload_id,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 AbortMultipartUpload API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::abort_multipart_upload() failed.")
            })?;

        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client()?
            .delete_object()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::delete_object() failed.")
            })?;

        Ok(())
    }

    async fn delete_objects(&self, objects: Vec<ObjectIdentifier>) -> Result<DeleteObjectsOutput> {
        let object_count = objects.len();
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .context("Failed to build Delete request")?;

        self.client()?
            .delete_objects()
            .set_request_payer(self.request_payer.clone())
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    object_count = object_count,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObjects API call failed for {} objects in s3://{}: {} ({}).",
                    object_count,
                    self.bucket,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::delete_objects() failed.")
            })
    }

    fn get_client(&self) -> Option<Arc<Client>> {
        self.client.clone()
    }
}
