//! Single-object deletion using the S3 DeleteObject API.
//!
//! Deletes objects one at a time. Used for `rm` and when batch_size is 1.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::storage::Storage;

use super::{DeleteResult, DeletedKey, Deleter, FailedKey};

/// Deletes objects one at a time using the S3 DeleteObject API.
pub struct SingleDeleter {
    target: Storage,
}

impl SingleDeleter {
    pub fn new(target: Storage) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Deleter for SingleDeleter {
    async fn delete(&self, keys: &[String], _config: &Config) -> Result<DeleteResult> {
        let mut result = DeleteResult::default();

        for key in keys {
            debug!(key = key.as_str(), "sending DeleteObject request.");

            match self.target.delete_object(key).await {
                Ok(()) => {
                    debug!(key = key.as_str(), "DeleteObject succeeded.");
                    result.deleted.push(DeletedKey { key: key.clone() });
                }
                Err(e) => {
                    warn!(
                        key = key.as_str(),
                        error = %e,
                        "S3 DeleteObject API call failed for key '{}'.",
                        key,
                    );
                    result.failed.push(FailedKey {
                        key: key.clone(),
                        error_code: "DeleteObjectError".to_string(),
                        error_message: format!("{e:#}"),
                    });
                }
            }
        }

        Ok(result)
    }
}
