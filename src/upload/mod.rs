//! Concurrent uploads with per-file progress and cancellation.
//!
//! Every file gets its own [`UploadTask`] in the coordinator's registry and
//! its own tokio task. Bodies up to `multipart_chunksize` bytes are sent with
//! one PutObject. Larger bodies go through a multipart upload whose parts are
//! read lazily from the source and sent concurrently, at most
//! `max_concurrent_parts` at a time.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_channel::Sender;
use aws_sdk_s3::types::CompletedPart;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ForceRetryConfig};
use crate::reference::{build_object_key, object_url};
use crate::storage::{Storage, with_timeout};
use crate::types::error::S3BrowseError;
use crate::types::token::UploadCancellationToken;
use crate::types::{UploadStatistics, UploadStatus, UploadTask, UploadTaskId};

pub mod progress;
pub mod source;

/// Maximum number of parts in one multipart upload (S3 limit).
pub const MAX_PARTS: u64 = 10_000;

pub use progress::{ProgressCallback, UploadProgress};
pub use source::{UploadBody, UploadSource};

use progress::{ProgressTracker, TaskRegistry};

/// Starts uploads into the configured bucket and tracks them until they end.
///
/// ```no_run
/// use s3browse_rs::{Config, UploadCoordinator, UploadSource, create_storage, create_upload_cancellation_token};
///
/// # async fn run() -> anyhow::Result<()> {
/// let config = Config::for_bucket("media", "eu-north-1");
/// let storage = create_storage(config.clone()).await?;
/// let coordinator = UploadCoordinator::new(storage, &config, create_upload_cancellation_token());
///
/// let url = coordinator
///     .upload(UploadSource::from_bytes("a.mp4", vec![0u8; 1024]), "videos", |progress| {
///         println!("{} {}%", progress.file_name, progress.percent);
///     })
///     .await?;
/// println!("{url}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UploadCoordinator {
    storage: Storage,
    multipart_chunksize: u64,
    max_concurrent_parts: usize,
    part_timeout_milliseconds: Option<u64>,
    force_retry_config: ForceRetryConfig,
    cancellation_token: UploadCancellationToken,
    registry: TaskRegistry,
    next_task_id: Arc<AtomicU64>,
    stats_sender: Option<Sender<UploadStatistics>>,
}

/// Per-file outcome of [`UploadCoordinator::upload_many`].
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub task_id: UploadTaskId,
    pub file_name: String,
    pub folder_key: String,
    pub object_key: String,
    /// The object URL on success.
    pub result: Result<String, S3BrowseError>,
}

impl UploadOutcome {
    pub fn status(&self) -> UploadStatus {
        match &self.result {
            Ok(_) => UploadStatus::Completed,
            Err(e) if e.is_cancelled() => UploadStatus::Cancelled,
            Err(_) => UploadStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchUploadReport {
    pub outcomes: Vec<UploadOutcome>,
}

impl BatchUploadReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Outcomes that failed for a reason other than cancellation.
    pub fn failed(&self) -> Vec<&UploadOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status() == UploadStatus::Failed)
            .collect()
    }

    pub fn has_failure(&self) -> bool {
        !self.failed().is_empty()
    }
}

/// Cancels one upload. Cheap to clone and usable after the
/// [`UploadHandle`] has been consumed by `wait`.
#[derive(Clone)]
pub struct UploadAbortHandle {
    tracker: Arc<ProgressTracker>,
}

impl UploadAbortHandle {
    pub fn abort(&self) {
        self.tracker.abort();
    }
}

/// A running upload.
pub struct UploadHandle {
    task_id: UploadTaskId,
    file_name: String,
    folder_key: String,
    object_key: String,
    tracker: Arc<ProgressTracker>,
    join_handle: JoinHandle<Result<String, S3BrowseError>>,
}

impl UploadHandle {
    pub fn task_id(&self) -> UploadTaskId {
        self.task_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn folder_key(&self) -> &str {
        &self.folder_key
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    /// Cancel this upload. No progress callback fires once this returns.
    pub fn abort(&self) {
        self.tracker.abort();
    }

    pub fn abort_handle(&self) -> UploadAbortHandle {
        UploadAbortHandle {
            tracker: self.tracker.clone(),
        }
    }

    /// Wait for the upload to end and return the object URL.
    pub async fn wait(self) -> Result<String, S3BrowseError> {
        let key = self.object_key;
        match self.join_handle.await {
            Ok(result) => result,
            Err(e) => Err(S3BrowseError::UploadFailed {
                key,
                message: format!("upload task failed: {e}"),
            }),
        }
    }
}

impl UploadCoordinator {
    /// Create a coordinator. Cancelling `cancellation_token` aborts every
    /// upload it started.
    pub fn new(
        storage: Storage,
        config: &Config,
        cancellation_token: UploadCancellationToken,
    ) -> Self {
        UploadCoordinator {
            storage,
            multipart_chunksize: config.multipart_chunksize.max(1),
            max_concurrent_parts: (config.max_concurrent_parts as usize).max(1),
            part_timeout_milliseconds: config.part_timeout_milliseconds,
            force_retry_config: config.force_retry_config.clone(),
            cancellation_token,
            registry: TaskRegistry::default(),
            next_task_id: Arc::new(AtomicU64::new(1)),
            stats_sender: None,
        }
    }

    /// Send [`UploadStatistics`] for every task to `sender`.
    pub fn with_stats_sender(mut self, sender: Sender<UploadStatistics>) -> Self {
        self.stats_sender = Some(sender);
        self
    }

    /// Tasks that have not finished yet, ordered by id.
    pub fn active_tasks(&self) -> Vec<UploadTask> {
        self.registry.snapshot()
    }

    /// Upload one file into `folder` and return its URL.
    pub async fn upload(
        &self,
        source: UploadSource,
        folder: &str,
        on_progress: impl Fn(&UploadProgress) + Send + Sync + 'static,
    ) -> Result<String, S3BrowseError> {
        self.start(source, folder, Some(Arc::new(on_progress)))
            .wait()
            .await
    }

    /// Start uploading one file into `folder` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        source: UploadSource,
        folder: &str,
        on_progress: Option<ProgressCallback>,
    ) -> UploadHandle {
        let task_id = UploadTaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let object_key = build_object_key(folder, &source.file_name, unix_millis());

        let task = UploadTask {
            id: task_id,
            file_name: source.file_name.clone(),
            folder_key: folder.to_string(),
            object_key: object_key.clone(),
            progress_percent: 0,
            bytes_uploaded: 0,
            bytes_total: 0,
            status: UploadStatus::Pending,
        };
        self.registry.insert(task.clone());

        let tracker = Arc::new(ProgressTracker::new(
            &task,
            self.cancellation_token.child_token(),
            on_progress,
            self.registry.clone(),
            self.stats_sender.clone(),
        ));

        let job = UploadJob {
            task_id,
            storage: dyn_clone::clone_box(&*self.storage),
            key: object_key.clone(),
            source,
            tracker: tracker.clone(),
            multipart_chunksize: self.multipart_chunksize,
            max_concurrent_parts: self.max_concurrent_parts,
            part_timeout_milliseconds: self.part_timeout_milliseconds,
            force_retry_config: self.force_retry_config.clone(),
        };
        let registry = self.registry.clone();
        let join_handle = tokio::spawn(async move { job.run_and_report(registry).await });

        UploadHandle {
            task_id,
            file_name: task.file_name,
            folder_key: task.folder_key,
            object_key,
            tracker,
            join_handle,
        }
    }

    /// Start every file at once. Each task reports progress under its own id.
    pub fn start_many(
        &self,
        sources: Vec<UploadSource>,
        folder: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Vec<UploadHandle> {
        sources
            .into_iter()
            .map(|source| self.start(source, folder, on_progress.clone()))
            .collect()
    }

    /// Upload every file concurrently and report each outcome.
    ///
    /// One failing or cancelled file does not affect the others.
    pub async fn upload_many(
        &self,
        sources: Vec<UploadSource>,
        folder: &str,
        on_progress: Option<ProgressCallback>,
    ) -> BatchUploadReport {
        let handles = self.start_many(sources, folder, on_progress);
        wait_all(handles).await
    }
}

/// Wait for every handle, keeping the order they were started in.
pub async fn wait_all(handles: Vec<UploadHandle>) -> BatchUploadReport {
    let mut report = BatchUploadReport::default();
    for handle in handles {
        let task_id = handle.task_id;
        let file_name = handle.file_name.clone();
        let folder_key = handle.folder_key.clone();
        let object_key = handle.object_key.clone();
        let result = handle.wait().await;
        report.outcomes.push(UploadOutcome {
            task_id,
            file_name,
            folder_key,
            object_key,
            result,
        });
    }
    report
}

fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct UploadJob {
    task_id: UploadTaskId,
    storage: Storage,
    key: String,
    source: UploadSource,
    tracker: Arc<ProgressTracker>,
    multipart_chunksize: u64,
    max_concurrent_parts: usize,
    part_timeout_milliseconds: Option<u64>,
    force_retry_config: ForceRetryConfig,
}

impl UploadJob {
    async fn run_and_report(self, registry: TaskRegistry) -> Result<String, S3BrowseError> {
        let task_id = self.task_id;
        let result = self.run().await;

        let status = match &result {
            Ok(url) => {
                self.tracker.finish();
                info!(key = self.key.as_str(), url = url.as_str(), "upload completed.");
                self.tracker.send_stats(UploadStatistics::UploadComplete {
                    task_id,
                    key: self.key.clone(),
                });
                UploadStatus::Completed
            }
            Err(e) if e.is_cancelled() => {
                info!(key = self.key.as_str(), "upload cancelled.");
                self.tracker.send_stats(UploadStatistics::UploadCancelled {
                    task_id,
                    key: self.key.clone(),
                });
                UploadStatus::Cancelled
            }
            Err(e) => {
                error!(key = self.key.as_str(), error = e.to_string(), "upload failed.");
                self.tracker.send_stats(UploadStatistics::UploadError {
                    task_id,
                    key: self.key.clone(),
                });
                UploadStatus::Failed
            }
        };

        registry.remove(task_id);
        debug!(task_id = %task_id, status = ?status, "upload task finished.");
        result
    }

    async fn run(&self) -> Result<String, S3BrowseError> {
        let bytes_total = self.source.len().await.map_err(|e| self.upload_failed(e))?;
        let content_type = self.source.content_type();
        self.tracker.begin(&self.key, bytes_total);
        self.ensure_not_cancelled()?;

        debug!(
            key = self.key.as_str(),
            bytes_total = bytes_total,
            content_type = content_type.as_str(),
            "upload has started."
        );

        if bytes_total <= self.multipart_chunksize {
            self.put_single(bytes_total, &content_type).await?;
        } else {
            self.put_multipart(bytes_total, &content_type).await?;
        }

        Ok(object_url(self.storage.bucket(), self.storage.region(), &self.key))
    }

    async fn put_single(&self, bytes_total: u64, content_type: &str) -> Result<(), S3BrowseError> {
        let body = self
            .source
            .read_range(0, bytes_total)
            .await
            .map_err(|e| self.upload_failed(e))?;

        let token = self.tracker.cancellation_token();
        let put = retry_transient(&self.force_retry_config, token, &self.key, || {
            with_timeout(
                self.part_timeout_milliseconds,
                "PutObject",
                self.storage.put_object(&self.key, body.clone(), content_type),
            )
        });

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                self.delete_remote().await;
                Err(self.cancelled())
            }
            result = put => {
                result?;
                self.tracker.add_bytes(bytes_total);
                Ok(())
            }
        }
    }

    async fn put_multipart(&self, bytes_total: u64, content_type: &str) -> Result<(), S3BrowseError> {
        let upload_id = with_timeout(
            self.part_timeout_milliseconds,
            "CreateMultipartUpload",
            self.storage.create_multipart_upload(&self.key, content_type),
        )
        .await
        .map_err(|e| self.upload_failed(e))?;

        let result = match self.upload_parts(&upload_id, bytes_total).await {
            Ok(parts) => self.complete(&upload_id, parts).await,
            Err(e) => Err(e),
        };

        if result.is_err() {
            self.abort_remote(&upload_id).await;
        }
        result
    }

    async fn upload_parts(
        &self,
        upload_id: &str,
        bytes_total: u64,
    ) -> Result<Vec<CompletedPart>, S3BrowseError> {
        let token = self.tracker.cancellation_token().clone();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_parts));
        let part_size = part_size(bytes_total, self.multipart_chunksize);
        let part_count = bytes_total.div_ceil(part_size);
        let mut join_set = JoinSet::new();
        let mut parts = Vec::with_capacity(part_count as usize);

        for index in 0..part_count {
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(self.cancelled()),
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|e| self.upload_failed(anyhow!(e)))?
                }
            };
            self.ensure_not_cancelled()?;

            // Surface a failed part before reading more of the source.
            while let Some(joined) = join_set.try_join_next() {
                parts.push(self.joined_part(joined)?);
            }

            let offset = index * part_size;
            let length = part_size.min(bytes_total - offset);
            let body = self
                .source
                .read_range(offset, length)
                .await
                .map_err(|e| self.upload_failed(e))?;
            let part_number = (index + 1) as i32;

            let storage = dyn_clone::clone_box(&*self.storage);
            let tracker = self.tracker.clone();
            let retry_config = self.force_retry_config.clone();
            let part_timeout = self.part_timeout_milliseconds;
            let key = self.key.clone();
            let upload_id = upload_id.to_string();
            let token = token.clone();

            join_set.spawn(async move {
                let _permit = permit;
                let send = retry_transient(&retry_config, &token, &key, || {
                    with_timeout(
                        part_timeout,
                        "UploadPart",
                        storage.upload_part(&key, &upload_id, part_number, body.clone()),
                    )
                });
                let part = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        return Err(S3BrowseError::UploadCancelled { key: key.clone() });
                    }
                    part = send => part?,
                };
                tracker.add_bytes(length);
                Ok::<_, S3BrowseError>(part)
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(self.cancelled()),
                joined = join_set.join_next() => match joined {
                    Some(joined) => parts.push(self.joined_part(joined)?),
                    None => break,
                },
            }
        }

        parts.sort_by_key(|part| part.part_number());
        Ok(parts)
    }

    fn joined_part(
        &self,
        joined: Result<Result<CompletedPart, S3BrowseError>, tokio::task::JoinError>,
    ) -> Result<CompletedPart, S3BrowseError> {
        match joined {
            Ok(result) => result,
            Err(e) => Err(self.upload_failed(anyhow!(e))),
        }
    }

    async fn complete(&self, upload_id: &str, parts: Vec<CompletedPart>) -> Result<(), S3BrowseError> {
        self.ensure_not_cancelled()?;
        with_timeout(
            self.part_timeout_milliseconds,
            "CompleteMultipartUpload",
            self.storage
                .complete_multipart_upload(&self.key, upload_id, parts),
        )
        .await
        .map_err(|e| self.upload_failed(e))
    }

    async fn abort_remote(&self, upload_id: &str) {
        if let Err(e) = self
            .storage
            .abort_multipart_upload(&self.key, upload_id)
            .await
        {
            warn!(
                key = self.key.as_str(),
                upload_id = upload_id,
                error = format!("{e:#}"),
                "failed to abort multipart upload."
            );
        }
    }

    /// Remove an object a cancelled PutObject may have stored anyway.
    async fn delete_remote(&self) {
        if let Err(e) = self.storage.delete_object(&self.key).await {
            warn!(
                key = self.key.as_str(),
                error = format!("{e:#}"),
                "failed to delete object of cancelled upload."
            );
        }
    }

    fn ensure_not_cancelled(&self) -> Result<(), S3BrowseError> {
        if self.tracker.is_cancelled() {
            return Err(self.cancelled());
        }
        Ok(())
    }

    fn cancelled(&self) -> S3BrowseError {
        S3BrowseError::UploadCancelled {
            key: self.key.clone(),
        }
    }

    fn upload_failed(&self, e: anyhow::Error) -> S3BrowseError {
        let key = self.key.clone();
        S3BrowseError::from_anyhow(e, |message| S3BrowseError::UploadFailed { key, message })
    }
}

/// Part size for a multipart upload of `bytes_total` bytes.
///
/// `chunksize` grows when the body would otherwise need more than
/// [`MAX_PARTS`] parts.
fn part_size(bytes_total: u64, chunksize: u64) -> u64 {
    chunksize.max(bytes_total.div_ceil(MAX_PARTS)).max(1)
}

/// Run `operation`, retrying retryable failures up to `force_retry_count`
/// times with `force_retry_interval_milliseconds` between attempts.
async fn retry_transient<T, F, Fut>(
    retry_config: &ForceRetryConfig,
    token: &UploadCancellationToken,
    key: &str,
    mut operation: F,
) -> Result<T, S3BrowseError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => S3BrowseError::from_anyhow(e, |message| S3BrowseError::UploadFailed {
                key: key.to_string(),
                message,
            }),
        };

        if !error.is_retryable() || attempt >= retry_config.force_retry_count || token.is_cancelled() {
            return Err(error);
        }
        attempt += 1;
        warn!(
            key = key,
            attempt = attempt,
            max_retries = retry_config.force_retry_count,
            error = error.to_string(),
            "retrying upload request."
        );
        tokio::time::sleep(Duration::from_millis(
            retry_config.force_retry_interval_milliseconds,
        ))
        .await;
    }
}
