/*!
# Overview
s3browse-rs is a folder-style browser and file manager for a single Amazon S3
bucket. It presents the flat key space of a bucket as a tree of folders,
uploads files with live progress and per-file cancellation, and deletes
single objects or whole folders.

## Features
- **Lazy folder tree**: Each folder is listed once, on first expansion, and
  spliced into the tree at exactly its own path
- **Full-depth listing**: Depth-first traversal of every folder below a prefix
- **Concurrent uploads**: Multipart uploads with per-file progress,
  cancellation and transient-error retry
- **Folder deletion**: Batched DeleteObjects (up to 1000 keys per request)
  with per-key failure reporting
- **Object references**: Canonical object URLs and normalization of stored
  URLs back to keys

## As a Library
The s3browse CLI is a thin wrapper over the s3browse-rs library.

Example usage
=============

```toml
[dependencies]
s3browse-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use s3browse_rs::{Config, FolderBrowser, ObjectLister, create_storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::for_bucket("media", "eu-north-1");
    let storage = create_storage(config.clone()).await?;

    let browser = FolderBrowser::new(ObjectLister::new(storage, &config));
    browser.toggle_expand("").await?;
    browser.toggle_expand("videos/").await?;

    for row in browser.visible_rows().await {
        println!("{}{}", "  ".repeat(row.depth), row.display_name);
    }
    Ok(())
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod config;
pub mod deleter;
pub mod lister;
pub mod reference;
pub mod storage;
pub mod tree;
pub mod types;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use config::args::CLIArgs;
pub use deleter::ObjectDeleter;
pub use lister::ObjectLister;
pub use reference::{object_url, normalize_to_key};
pub use storage::create_storage;
pub use tree::{ExpandPlan, FolderBrowser, FolderTree, ToggleOutcome, TreeRow};
pub use types::error::{S3BrowseError, exit_code_from_error, is_cancelled_error};
pub use types::token::{UploadCancellationToken, create_upload_cancellation_token};
pub use types::{
    DeleteReport, DeletedKey, Depth, FailedKey, FolderNode, Listing, NodeKind, UploadStatistics,
    UploadStatus, UploadTask, UploadTaskId,
};
pub use upload::{
    BatchUploadReport, ProgressCallback, UploadAbortHandle, UploadCoordinator, UploadHandle,
    UploadOutcome, UploadProgress, UploadSource, wait_all,
};
