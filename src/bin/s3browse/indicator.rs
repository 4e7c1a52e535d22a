// Upload progress display.
//
// Reads UploadStatistics from an async channel and keeps one indicatif bar
// per upload task inside a MultiProgress.

use std::collections::HashMap;

use async_channel::Receiver;
use indicatif::{
    HumanBytes, HumanDuration, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle,
};
use s3browse_rs::{UploadStatistics, UploadTaskId};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

const BAR_TEMPLATE: &str =
    "{spinner} {wide_msg} [{bar:30}] {bytes}/{total_bytes} ({percent}%)";

/// Totals returned by [`show_indicator`] after the stats channel closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorSummary {
    pub total_upload_count: u64,
    pub total_upload_bytes: u64,
    pub total_error_count: u64,
    pub total_cancel_count: u64,
}

/// Spawn a background task that draws one progress bar per upload.
///
/// The task runs until every sender of `stats_receiver` is dropped.
pub fn show_indicator(
    stats_receiver: Receiver<UploadStatistics>,
    show_progress: bool,
    show_result: bool,
) -> JoinHandle<IndicatorSummary> {
    let draw_target = if show_progress {
        ProgressDrawTarget::stderr()
    } else {
        ProgressDrawTarget::hidden()
    };
    let multi_progress = MultiProgress::with_draw_target(draw_target);
    let bar_style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");

    tokio::spawn(async move {
        let start_time = Instant::now();
        let mut bars: HashMap<UploadTaskId, ProgressBar> = HashMap::new();
        let mut bytes_by_task: HashMap<UploadTaskId, u64> = HashMap::new();
        let mut summary = IndicatorSummary::default();

        while let Ok(stats) = stats_receiver.recv().await {
            match stats {
                UploadStatistics::UploadStarted {
                    task_id,
                    key,
                    bytes_total,
                } => {
                    let bar = multi_progress.add(ProgressBar::new(bytes_total));
                    bar.set_style(bar_style.clone());
                    bar.set_message(key);
                    bars.insert(task_id, bar);
                }
                UploadStatistics::UploadProgress {
                    task_id,
                    bytes_uploaded,
                    ..
                } => {
                    bytes_by_task.insert(task_id, bytes_uploaded);
                    if let Some(bar) = bars.get(&task_id) {
                        bar.set_position(bytes_uploaded);
                    }
                }
                UploadStatistics::UploadComplete { task_id, key } => {
                    summary.total_upload_count += 1;
                    if let Some(bar) = bars.remove(&task_id) {
                        summary.total_upload_bytes += bar.length().unwrap_or_default();
                        bar.finish_with_message(format!("{key} done"));
                    } else {
                        summary.total_upload_bytes +=
                            bytes_by_task.get(&task_id).copied().unwrap_or_default();
                    }
                }
                UploadStatistics::UploadError { task_id, key } => {
                    summary.total_error_count += 1;
                    if let Some(bar) = bars.remove(&task_id) {
                        bar.abandon_with_message(format!("{key} failed"));
                    }
                }
                UploadStatistics::UploadCancelled { task_id, key } => {
                    summary.total_cancel_count += 1;
                    if let Some(bar) = bars.remove(&task_id) {
                        bar.abandon_with_message(format!("{key} cancelled"));
                    }
                }
            }
        }

        let elapsed = start_time.elapsed();
        info!(
            message = "upload summary",
            uploaded_objects = summary.total_upload_count,
            uploaded_bytes = summary.total_upload_bytes,
            error = summary.total_error_count,
            cancelled = summary.total_cancel_count,
            duration_sec = elapsed.as_secs_f64(),
        );

        if show_result {
            let _ = multi_progress.println(format!(
                "uploaded {} objects ({}),  error {} objects,  cancelled {} objects,  duration {}",
                summary.total_upload_count,
                HumanBytes(summary.total_upload_bytes),
                summary.total_error_count,
                summary.total_cancel_count,
                HumanDuration(elapsed),
            ));
        }

        summary
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn show_indicator_empty_channel_completes() {
        let (sender, receiver) = async_channel::unbounded();
        drop(sender);

        let handle = show_indicator(receiver, false, false);
        let summary = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("indicator should complete within timeout")
            .expect("indicator task should not panic");

        assert_eq!(summary, IndicatorSummary::default());
    }

    #[tokio::test]
    async fn show_indicator_counts_each_terminal_state() {
        let (sender, receiver) = async_channel::unbounded();

        let events = vec![
            UploadStatistics::UploadStarted {
                task_id: UploadTaskId(1),
                key: "videos/1_a.mp4".to_string(),
                bytes_total: 2048,
            },
            UploadStatistics::UploadStarted {
                task_id: UploadTaskId(2),
                key: "videos/1_b.mp4".to_string(),
                bytes_total: 10,
            },
            UploadStatistics::UploadStarted {
                task_id: UploadTaskId(3),
                key: "videos/1_c.mp4".to_string(),
                bytes_total: 10,
            },
            UploadStatistics::UploadProgress {
                task_id: UploadTaskId(1),
                bytes_uploaded: 1024,
                percent: 50,
            },
            UploadStatistics::UploadComplete {
                task_id: UploadTaskId(1),
                key: "videos/1_a.mp4".to_string(),
            },
            UploadStatistics::UploadError {
                task_id: UploadTaskId(2),
                key: "videos/1_b.mp4".to_string(),
            },
            UploadStatistics::UploadCancelled {
                task_id: UploadTaskId(3),
                key: "videos/1_c.mp4".to_string(),
            },
        ];
        for event in events {
            sender.send(event).await.unwrap();
        }
        drop(sender);

        let handle = show_indicator(receiver, false, true);
        let summary = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("indicator should complete within timeout")
            .expect("indicator task should not panic");

        assert_eq!(
            summary,
            IndicatorSummary {
                total_upload_count: 1,
                total_upload_bytes: 2048,
                total_error_count: 1,
                total_cancel_count: 1,
            }
        );
    }
}
