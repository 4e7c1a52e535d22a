use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::types::{CompletedPart, ObjectIdentifier};
use bytes::Bytes;
use dyn_clone::DynClone;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::types::error::S3BrowseError;

pub mod s3;

/// Type alias for a boxed Storage trait object.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// Factory trait for creating Storage instances.
#[async_trait]
pub trait StorageFactory {
    async fn create(config: Config) -> Result<Storage>;
}

/// One page of a ListObjectsV2 response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsPage {
    pub common_prefixes: Vec<String>,
    pub keys: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// Core storage trait over the object-store calls the browser needs.
///
/// Every method addresses the bucket the storage was created for. Keys are
/// full object keys.
///
/// - `list_objects_page`: one ListObjectsV2 page; callers drive pagination
/// - `put_object`: single-request upload
/// - `create_multipart_upload` / `upload_part` / `complete_multipart_upload`
///   / `abort_multipart_upload`: multipart upload lifecycle
/// - `delete_object` / `delete_objects`: single and batch deletion
#[async_trait]
pub trait StorageTrait: DynClone {
    fn bucket(&self) -> &str;

    /// Region that canonical object URLs are built with.
    fn region(&self) -> &str;

    async fn list_objects_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ListObjectsPage>;

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// Start a multipart upload and return its upload id.
    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart>;

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Delete up to 1000 objects in a single DeleteObjects request.
    ///
    /// Returns the output containing both the deleted keys and per-key
    /// errors (partial failure). The caller is responsible for batching.
    async fn delete_objects(&self, objects: Vec<ObjectIdentifier>) -> Result<DeleteObjectsOutput>;

    /// Get the underlying AWS S3 Client for direct API access.
    fn get_client(&self) -> Option<Arc<Client>>;
}

dyn_clone::clone_trait_object!(StorageTrait);

/// Create the S3 storage for `config.bucket`.
pub async fn create_storage(config: Config) -> Result<Storage> {
    s3::S3StorageFactory::create(config).await
}

/// Run `future` under an optional deadline.
///
/// An elapsed deadline surfaces as [`S3BrowseError::TransportTimeout`].
pub async fn with_timeout<T, F>(
    timeout_milliseconds: Option<u64>,
    operation: &str,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(milliseconds) = timeout_milliseconds else {
        return future.await;
    };

    match tokio::time::timeout(Duration::from_millis(milliseconds), future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation = operation,
                timeout_milliseconds = milliseconds,
                "{} timed out.",
                operation
            );
            Err(anyhow::anyhow!(S3BrowseError::TransportTimeout {
                operation: operation.to_string(),
                timeout_milliseconds: milliseconds,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_dummy_tracing_subscriber;

    #[tokio::test(start_paused = true)]
    async fn with_timeout_elapsed_is_transport_timeout() {
        init_dummy_tracing_subscriber();

        let result: Result<()> = with_timeout(Some(50), "ListObjectsV2", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(
            err.downcast_ref::<S3BrowseError>(),
            Some(&S3BrowseError::TransportTimeout {
                operation: "ListObjectsV2".to_string(),
                timeout_milliseconds: 50,
            })
        );
    }

    #[tokio::test]
    async fn with_timeout_passes_result_through() {
        init_dummy_tracing_subscriber();

        let value = with_timeout(Some(1000), "PutObject", async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let value = with_timeout(None, "PutObject", async { Ok(8) }).await.unwrap();
        assert_eq!(value, 8);

        let err = with_timeout::<(), _>(None, "PutObject", async {
            Err(anyhow::anyhow!("boom"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
