//! Batch deletion using the S3 DeleteObjects API.
//!
//! Groups keys into batches of up to 1000 and calls the S3 batch delete API
//! in quiet mode, so a response lists only the keys that failed.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::types::ObjectIdentifier;
use tracing::{debug, warn};

use crate::config::Config;
use crate::storage::Storage;

use super::{DeleteResult, DeletedKey, Deleter, FailedKey};

/// Maximum objects per batch DeleteObjects API call (S3 limit).
pub const MAX_BATCH_SIZE: usize = 1000;

/// Determines whether an S3 batch deletion error code is retryable.
///
/// Retryable errors are transient server-side issues that may succeed
/// on a subsequent attempt:
/// - `InternalError` / `ServiceUnavailable`: transient server errors
/// - `SlowDown`: throttling
/// - `RequestTimeout`: transient network/timeout
///
/// Non-retryable errors (e.g. `AccessDenied`) are permanent.
pub(crate) fn is_retryable_error_code(code: &str) -> bool {
    matches!(
        code,
        "InternalError" | "SlowDown" | "ServiceUnavailable" | "RequestTimeout" | "unknown"
    )
}

/// Deletes keys in batches using the S3 DeleteObjects API.
///
/// A batch whose request fails as a whole marks each of its keys as failed
/// and the next batch still runs. Keys that fail inside a batch with a
/// retryable code are retried one by one with DeleteObject.
pub struct BatchDeleter {
    target: Storage,
}

impl BatchDeleter {
    pub fn new(target: Storage) -> Self {
        Self { target }
    }

    async fn delete_with_fallback(
        &self,
        key: &str,
        force_retry_count: u32,
        force_retry_interval: u64,
    ) -> Result<(), String> {
        let mut last_error = String::new();
        for attempt in 0..=force_retry_count {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(force_retry_interval)).await;
            }

            match self.target.delete_object(key).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        key = key,
                        attempt = attempt + 1,
                        max_attempts = force_retry_count + 1,
                        error = %e,
                        "S3 DeleteObject fallback attempt {}/{} failed for key '{}'.",
                        attempt + 1, force_retry_count + 1, key,
                    );
                    last_error = format!("{e:#}");
                }
            }
        }
        Err(last_error)
    }
}

#[async_trait]
impl Deleter for BatchDeleter {
    async fn delete(&self, keys: &[String], config: &Config) -> Result<DeleteResult> {
        let mut result = DeleteResult::default();

        if keys.is_empty() {
            return Ok(result);
        }

        let batch_size = (config.batch_size as usize).clamp(1, MAX_BATCH_SIZE);
        let force_retry_count = config.force_retry_config.force_retry_count;
        let force_retry_interval = config.force_retry_config.force_retry_interval_milliseconds;

        for chunk in keys.chunks(batch_size) {
            let identifiers = chunk
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()?;

            debug!(
                batch_size = identifiers.len(),
                "sending DeleteObjects batch request."
            );

            let response = match self.target.delete_objects(identifiers).await {
                Ok(response) => response,
                Err(e) => {
                    let message = format!("{e:#}");
                    warn!(
                        batch_size = chunk.len(),
                        error = message.as_str(),
                        "S3 DeleteObjects request failed; every key of the batch is counted as failed."
                    );
                    result.failed.extend(chunk.iter().map(|key| FailedKey {
                        key: key.clone(),
                        error_code: "DeleteObjectsError".to_string(),
                        error_message: message.clone(),
                    }));
                    continue;
                }
            };

            let mut failed_in_batch = HashSet::new();
            let mut unattributed: Option<(String, String)> = None;
            for err in response.errors() {
                let code = err.code().unwrap_or("unknown").to_string();
                let message = err.message().unwrap_or("no message").to_string();
                let Some(key) = err.key().map(str::to_string) else {
                    warn!(
                        code = code.as_str(),
                        message = message.as_str(),
                        "S3 DeleteObjects reported an error without a key."
                    );
                    unattributed.get_or_insert((code, message));
                    continue;
                };
                failed_in_batch.insert(key.clone());

                if is_retryable_error_code(&code) {
                    match self
                        .delete_with_fallback(&key, force_retry_count, force_retry_interval)
                        .await
                    {
                        Ok(()) => {
                            result.deleted.push(DeletedKey { key });
                            continue;
                        }
                        Err(fallback_error) => {
                            warn!(
                                key = key.as_str(),
                                code = code.as_str(),
                                message = message.as_str(),
                                "S3 DeleteObject fallback exhausted all {} retries for key '{}': {}.",
                                force_retry_count + 1,
                                key,
                                fallback_error,
                            );
                        }
                    }
                } else {
                    warn!(
                        key = key.as_str(),
                        code = code.as_str(),
                        message = message.as_str(),
                        "S3 DeleteObjects partial failure for key '{}': {} ({}).",
                        key,
                        code,
                        message,
                    );
                }

                result.failed.push(FailedKey {
                    key,
                    error_code: code,
                    error_message: message,
                });
            }

            // Quiet mode: every key not reported as an error was deleted,
            // unless an error came back that names no key.
            let remaining = chunk
                .iter()
                .filter(|key| !failed_in_batch.contains(key.as_str()));
            match &unattributed {
                Some((code, message)) => result.failed.extend(remaining.map(|key| FailedKey {
                    key: key.clone(),
                    error_code: code.clone(),
                    error_message: message.clone(),
                })),
                None => result
                    .deleted
                    .extend(remaining.map(|key| DeletedKey { key: key.clone() })),
            }

            debug!(
                deleted = result.deleted.len(),
                failed = result.failed.len(),
                "DeleteObjects batch completed."
            );
        }

        Ok(result)
    }
}
