//! Deletion of single objects and whole folders.
//!
//! [`ObjectDeleter`] resolves references and prefixes to keys, then hands the
//! keys to a [`Deleter`] backend: [`BatchDeleter`] (DeleteObjects, up to
//! 1000 keys per request) or [`SingleDeleter`] (one DeleteObject per key).

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::lister::ObjectLister;
use crate::reference::normalize_to_key;
use crate::storage::Storage;
use crate::types::error::S3BrowseError;
use crate::types::{DeleteReport, DeletedKey, FailedKey};

pub mod batch;
pub mod single;

pub use batch::BatchDeleter;
pub use single::SingleDeleter;

/// Result of a deletion operation, reporting which keys succeeded and which failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted: Vec<DeletedKey>,
    pub failed: Vec<FailedKey>,
}

/// Trait for deletion backends (batch or single mode).
#[async_trait]
pub trait Deleter: Send + Sync {
    /// Delete `keys`, reporting per-key success and failure.
    ///
    /// An `Err` is returned only when the backend itself cannot run; request
    /// failures are reported as failed keys.
    async fn delete(&self, keys: &[String], config: &Config) -> Result<DeleteResult>;
}

/// Deletes objects and folders of the configured bucket.
#[derive(Clone)]
pub struct ObjectDeleter {
    storage: Storage,
    lister: ObjectLister,
    config: Config,
}

impl ObjectDeleter {
    pub fn new(storage: Storage, config: &Config) -> Self {
        ObjectDeleter {
            lister: ObjectLister::new(dyn_clone::clone_box(&*storage), config),
            storage,
            config: config.clone(),
        }
    }

    /// Delete the object a stored reference points at.
    ///
    /// An empty reference is a no-op and returns `Ok(None)` without any
    /// request. Otherwise returns the deleted key.
    pub async fn delete_object(&self, reference: &str) -> Result<Option<String>, S3BrowseError> {
        let Some(key) = normalize_to_key(reference, self.storage.bucket())? else {
            debug!("empty object reference, nothing to delete.");
            return Ok(None);
        };

        let deleter = SingleDeleter::new(dyn_clone::clone_box(&*self.storage));
        let result = deleter
            .delete(std::slice::from_ref(&key), &self.config)
            .await
            .map_err(|e| deletion_backend_failed(&key, e))?;

        if !result.failed.is_empty() {
            return Err(S3BrowseError::DeletionFailed {
                failed: result.failed,
            });
        }

        info!(key = key.as_str(), "object deleted.");
        Ok(Some(key))
    }

    /// Delete every object below a folder prefix.
    ///
    /// The prefix may itself be a stored reference. A prefix without a
    /// trailing delimiter gets one, so `"videos"` never matches
    /// `"videos-old/"`. An empty prefix is a no-op.
    pub async fn delete_folder(&self, prefix: &str) -> Result<DeleteReport, S3BrowseError> {
        let Some(prefix) = normalize_to_key(prefix, self.storage.bucket())? else {
            debug!("empty folder prefix, nothing to delete.");
            return Ok(DeleteReport::default());
        };
        let prefix = self.folder_prefix(prefix);

        let keys = self.lister.list_all_keys(&prefix).await?;
        if keys.is_empty() {
            debug!(prefix = prefix.as_str(), "folder is empty, nothing to delete.");
            return Ok(DeleteReport::default());
        }

        debug!(
            prefix = prefix.as_str(),
            keys = keys.len(),
            "folder deletion has started."
        );

        let deleter: Box<dyn Deleter> = if self.config.batch_size <= 1 {
            Box::new(SingleDeleter::new(dyn_clone::clone_box(&*self.storage)))
        } else {
            Box::new(BatchDeleter::new(dyn_clone::clone_box(&*self.storage)))
        };

        let result = deleter
            .delete(&keys, &self.config)
            .await
            .map_err(|e| deletion_backend_failed(&prefix, e))?;

        if !result.failed.is_empty() {
            warn!(
                prefix = prefix.as_str(),
                deleted = result.deleted.len(),
                failed = result.failed.len(),
                "folder deletion finished with failures."
            );
            return Err(S3BrowseError::DeletionFailed {
                failed: result.failed,
            });
        }

        info!(
            prefix = prefix.as_str(),
            deleted = result.deleted.len(),
            "folder deleted."
        );
        Ok(DeleteReport {
            deleted: result.deleted,
        })
    }

    fn folder_prefix(&self, prefix: String) -> String {
        let delimiter = self.config.delimiter.as_str();
        if delimiter.is_empty() || prefix.ends_with(delimiter) {
            prefix
        } else {
            format!("{prefix}{delimiter}")
        }
    }
}

fn deletion_backend_failed(key: &str, e: anyhow::Error) -> S3BrowseError {
    S3BrowseError::from_anyhow(e, |message| S3BrowseError::DeletionFailed {
        failed: vec![FailedKey {
            key: key.to_string(),
            error_code: "DeleteError".to_string(),
            error_message: message,
        }],
    })
}
