//! Per-task progress bookkeeping.
//!
//! Each upload owns one [`ProgressTracker`]. Progress callbacks run while the
//! tracker's lock is held and only after the cancellation token has been
//! checked, and [`ProgressTracker::abort`] takes the same lock before it
//! cancels. Once `abort` returns, no further callback fires for that task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_channel::Sender;

use crate::types::token::UploadCancellationToken;
use crate::types::{UploadStatistics, UploadStatus, UploadTask, UploadTaskId};

/// Progress of one upload, as passed to a [`ProgressCallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    pub task_id: UploadTaskId,
    pub file_name: String,
    pub folder_key: String,
    pub percent: u8,
}

/// Called every time the percentage of a task increases.
pub type ProgressCallback = Arc<dyn Fn(&UploadProgress) + Send + Sync>;

/// Active uploads, keyed by task id.
#[derive(Clone, Default)]
pub(crate) struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<UploadTaskId, UploadTask>>>,
}

impl TaskRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<UploadTaskId, UploadTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, task: UploadTask) {
        self.lock().insert(task.id, task);
    }

    pub fn update(&self, task_id: UploadTaskId, f: impl FnOnce(&mut UploadTask)) {
        if let Some(task) = self.lock().get_mut(&task_id) {
            f(task);
        }
    }

    /// Remove a finished task, returning its final state.
    pub fn remove(&self, task_id: UploadTaskId) -> Option<UploadTask> {
        self.lock().remove(&task_id)
    }

    pub fn snapshot(&self) -> Vec<UploadTask> {
        let mut tasks: Vec<UploadTask> = self.lock().values().cloned().collect();
        tasks.sort_by_key(|task| task.id);
        tasks
    }
}

#[derive(Default)]
struct ProgressState {
    bytes_total: u64,
    bytes_uploaded: u64,
    percent: u8,
}

pub(crate) struct ProgressTracker {
    task_id: UploadTaskId,
    file_name: String,
    folder_key: String,
    state: Mutex<ProgressState>,
    cancellation_token: UploadCancellationToken,
    callback: Option<ProgressCallback>,
    registry: TaskRegistry,
    stats_sender: Option<Sender<UploadStatistics>>,
}

impl ProgressTracker {
    pub fn new(
        task: &UploadTask,
        cancellation_token: UploadCancellationToken,
        callback: Option<ProgressCallback>,
        registry: TaskRegistry,
        stats_sender: Option<Sender<UploadStatistics>>,
    ) -> Self {
        ProgressTracker {
            task_id: task.id,
            file_name: task.file_name.clone(),
            folder_key: task.folder_key.clone(),
            state: Mutex::new(ProgressState::default()),
            cancellation_token,
            callback,
            registry,
            stats_sender,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cancellation_token(&self) -> &UploadCancellationToken {
        &self.cancellation_token
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Cancel the upload. No callback fires after this returns.
    pub fn abort(&self) {
        let _state = self.lock();
        self.cancellation_token.cancel();
    }

    /// Record the body size and move the task to `InProgress`.
    pub fn begin(&self, object_key: &str, bytes_total: u64) {
        self.lock().bytes_total = bytes_total;
        self.registry.update(self.task_id, |task| {
            task.bytes_total = bytes_total;
            task.status = UploadStatus::InProgress;
        });
        self.send_stats(UploadStatistics::UploadStarted {
            task_id: self.task_id,
            key: object_key.to_string(),
            bytes_total,
        });
    }

    /// Count `bytes` as sent. Parts may complete in any order.
    pub fn add_bytes(&self, bytes: u64) {
        let mut state = self.lock();
        if self.cancellation_token.is_cancelled() {
            return;
        }
        state.bytes_uploaded = (state.bytes_uploaded + bytes).min(state.bytes_total);
        let percent = percent_of(state.bytes_uploaded, state.bytes_total);
        self.publish(&mut state, percent);
    }

    /// Report 100 for a finished upload, including zero-byte bodies.
    pub fn finish(&self) {
        let mut state = self.lock();
        if self.cancellation_token.is_cancelled() {
            return;
        }
        state.bytes_uploaded = state.bytes_total;
        self.publish(&mut state, 100);
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.lock().bytes_uploaded
    }

    fn publish(&self, state: &mut ProgressState, percent: u8) {
        let bytes_uploaded = state.bytes_uploaded;
        self.registry.update(self.task_id, |task| {
            task.bytes_uploaded = bytes_uploaded;
        });
        if percent <= state.percent {
            return;
        }
        state.percent = percent;

        self.registry.update(self.task_id, |task| {
            task.progress_percent = percent;
        });
        self.send_stats(UploadStatistics::UploadProgress {
            task_id: self.task_id,
            bytes_uploaded,
            percent,
        });
        if let Some(callback) = &self.callback {
            callback(&UploadProgress {
                task_id: self.task_id,
                file_name: self.file_name.clone(),
                folder_key: self.folder_key.clone(),
                percent,
            });
        }
    }

    pub fn send_stats(&self, stats: UploadStatistics) {
        if let Some(sender) = &self.stats_sender {
            let _ = sender.try_send(stats);
        }
    }
}

/// `round(sent / total * 100)`, clamped to 100.
pub(crate) fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let sent = sent.min(total) as u128;
    let total = total as u128;
    ((sent * 200 + total) / (total * 2)) as u8
}
