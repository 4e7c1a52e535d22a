use std::collections::HashSet;

use tracing::{debug, trace};

use crate::config::Config;
use crate::storage::{Storage, with_timeout};
use crate::types::error::S3BrowseError;
use crate::types::{Depth, Listing};

/// Lists folders and files of the configured bucket.
///
/// Every call follows ListObjectsV2 continuation tokens until the store
/// reports that the listing is complete, and merges the pages. A failing
/// page fails the whole call; no partial listing is ever returned.
///
/// ```text
/// list("a/", "/")  ->  folders ["a/b/"], files ["a/x.txt"]
/// resolve("a/", Full)  ->  folders ["a/b/", "a/b/c/"], files ["a/x.txt", "a/b/y.txt", ...]
/// ```
#[derive(Clone)]
pub struct ObjectLister {
    storage: Storage,
    delimiter: String,
    max_keys: i32,
    listing_timeout_milliseconds: Option<u64>,
}

impl ObjectLister {
    pub fn new(storage: Storage, config: &Config) -> Self {
        Self {
            storage,
            delimiter: config.delimiter.clone(),
            max_keys: config.max_keys,
            listing_timeout_milliseconds: config.listing_timeout_milliseconds,
        }
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// List `prefix` with an explicit delimiter.
    ///
    /// An empty delimiter lists every key below `prefix` as a flat file list.
    pub async fn list(&self, prefix: &str, delimiter: &str) -> Result<Listing, S3BrowseError> {
        debug!(prefix = prefix, delimiter = delimiter, "list has started.");

        let delimiter = (!delimiter.is_empty()).then_some(delimiter);
        let mut listing = Listing::default();
        let mut seen_folders = HashSet::new();
        let mut seen_files = HashSet::new();
        let mut continuation_token = None;
        let mut page_count = 0usize;

        loop {
            let page = with_timeout(
                self.listing_timeout_milliseconds,
                "ListObjectsV2",
                self.storage.list_objects_page(
                    prefix,
                    delimiter,
                    continuation_token.take(),
                    self.max_keys,
                ),
            )
            .await
            .map_err(|e| {
                S3BrowseError::from_anyhow(e, |message| S3BrowseError::ListingFailed {
                    prefix: prefix.to_string(),
                    message,
                })
            })?;
            page_count += 1;

            for folder in page.common_prefixes {
                if seen_folders.insert(folder.clone()) {
                    listing.folders.push(folder);
                }
            }
            for key in page.keys {
                // Zero-byte folder marker of the listed prefix itself.
                if !prefix.is_empty() && key == prefix && delimiter.is_some() {
                    continue;
                }
                if seen_files.insert(key.clone()) {
                    listing.files.push(key);
                }
            }

            if !page.is_truncated {
                break;
            }
            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => {
                    return Err(S3BrowseError::ListingFailed {
                        prefix: prefix.to_string(),
                        message: "truncated listing without a continuation token".to_string(),
                    });
                }
            }
        }

        debug!(
            prefix = prefix,
            pages = page_count,
            folders = listing.folders.len(),
            files = listing.files.len(),
            "list has been completed."
        );
        Ok(listing)
    }

    /// List the immediate children of `prefix` with the configured delimiter.
    pub async fn list_one_level(&self, prefix: &str) -> Result<Listing, S3BrowseError> {
        self.list(prefix, &self.delimiter).await
    }

    /// Resolve `prefix` to the given depth.
    ///
    /// `Depth::Full` walks the folder hierarchy depth-first in pre-order by
    /// repeated one-level listings. Each prefix is listed once. The first
    /// failing sub-listing fails the whole call.
    pub async fn resolve(&self, prefix: &str, depth: Depth) -> Result<Listing, S3BrowseError> {
        if depth == Depth::OneLevel {
            return self.list_one_level(prefix).await;
        }

        let mut listing = Listing::default();
        let mut visited = HashSet::new();
        let mut stack = vec![prefix.to_string()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            trace!(prefix = current.as_str(), "resolving folder.");

            let level = self.list_one_level(&current).await?;
            listing.files.extend(level.files);

            let children: Vec<String> = level
                .folders
                .into_iter()
                .filter(|folder| !visited.contains(folder))
                .collect();
            // Reverse push keeps the store's order when popping.
            for folder in children.iter().rev() {
                stack.push(folder.clone());
            }
            // Pre-order: a folder is reported when it is visited.
            if current != prefix {
                listing.folders.push(current);
            }
        }

        Ok(listing)
    }

    /// Every folder and file below `prefix`, depth-first.
    pub async fn fetch_all(&self, prefix: &str) -> Result<Listing, S3BrowseError> {
        self.resolve(prefix, Depth::Full).await
    }

    /// Every object key below `prefix`, without delimiter grouping.
    pub async fn list_all_keys(&self, prefix: &str) -> Result<Vec<String>, S3BrowseError> {
        Ok(self.list(prefix, "").await?.files)
    }
}
