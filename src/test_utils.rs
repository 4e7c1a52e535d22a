//! Shared test utilities for the s3browse library crate.
//!
//! [`InMemoryStorage`] is a `StorageTrait` implementation over a sorted map
//! that mimics ListObjectsV2 pagination and common-prefix grouping, the
//! multipart upload lifecycle and batch deletion. Failures, latency and
//! pauses can be injected per test.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::types::{CompletedPart, DeletedObject, ObjectIdentifier};
use bytes::Bytes;
use tokio::sync::Semaphore;

use crate::config::{Config, ForceRetryConfig};
use crate::storage::{ListObjectsPage, Storage, StorageTrait};

pub(crate) const TEST_BUCKET: &str = "test-bucket";
pub(crate) const TEST_REGION: &str = "eu-north-1";

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// Create a default [`Config`] suitable for most unit / property tests.
///
/// Key defaults: bucket=`"test-bucket"`, no forced retries, tiny multipart
/// chunks (4 bytes) so that multipart paths run on short bodies.
pub(crate) fn make_test_config() -> Config {
    let mut config = Config::for_bucket(TEST_BUCKET, TEST_REGION);
    config.force_retry_config = ForceRetryConfig {
        force_retry_count: 0,
        force_retry_interval_milliseconds: 0,
    };
    config.multipart_chunksize = 4;
    config.max_concurrent_parts = 2;
    config
}

/// One recorded ListObjectsV2 call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ListCall {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct MultipartState {
    pub key: String,
    pub content_type: String,
    pub parts: BTreeMap<i32, Bytes>,
}

/// Mutable state behind [`InMemoryStorage`].
#[derive(Debug, Default)]
pub(crate) struct InMemoryState {
    pub objects: BTreeMap<String, Bytes>,
    pub content_types: HashMap<String, String>,
    /// Entries per listing page; `0` means `max_keys`.
    pub page_size: usize,
    pub list_delay: Option<Duration>,
    pub failing_list_prefixes: HashSet<String>,
    pub list_calls: Vec<ListCall>,

    /// Uploads whose key contains one of these fragments always fail.
    pub failing_upload_fragments: Vec<String>,
    /// Number of upcoming `upload_part` calls that fail before parts succeed.
    pub transient_part_failures: u32,
    pub put_calls: Vec<String>,
    /// Delay between storing a PutObject body and answering the call.
    pub put_response_delay: Option<Duration>,
    pub part_calls: Vec<(String, i32)>,
    pub multipart: HashMap<String, MultipartState>,
    pub next_upload_id: u64,
    pub aborted_uploads: Vec<String>,

    /// Per-key `(code, message)` errors reported inside DeleteObjects output.
    pub batch_error_keys: HashMap<String, (String, String)>,
    /// `(code, message)` errors reported without a key. Nothing in such a
    /// batch is deleted.
    pub keyless_batch_errors: Vec<(String, String)>,
    /// Zero-based indexes of DeleteObjects requests that fail as a whole.
    pub failing_batch_requests: HashSet<usize>,
    pub failing_delete_keys: HashSet<String>,
    pub delete_object_calls: Vec<String>,
    pub delete_objects_calls: Vec<Vec<String>>,
}

#[derive(Clone)]
pub(crate) struct InMemoryStorage {
    bucket: String,
    region: String,
    state: Arc<Mutex<InMemoryState>>,
    /// Parts of keys containing the fragment wait for a permit before sending.
    part_gate: Option<(String, Arc<Semaphore>)>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        InMemoryStorage {
            bucket: TEST_BUCKET.to_string(),
            region: TEST_REGION.to_string(),
            state: Arc::new(Mutex::new(InMemoryState::default())),
            part_gate: None,
        }
    }

    pub fn with_objects(keys: &[&str]) -> Self {
        let storage = Self::new();
        {
            let mut state = storage.state();
            for key in keys {
                state
                    .objects
                    .insert(key.to_string(), Bytes::from_static(b"x"));
            }
        }
        storage
    }

    pub fn with_part_gate(mut self, key_fragment: &str, gate: Arc<Semaphore>) -> Self {
        self.part_gate = Some((key_fragment.to_string(), gate));
        self
    }

    pub fn boxed(&self) -> Storage {
        Box::new(self.clone())
    }

    pub fn state(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn list_call_count(&self) -> usize {
        self.state().list_calls.len()
    }

    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state().objects.get(key).cloned()
    }

    fn upload_fails(state: &InMemoryState, key: &str) -> bool {
        state
            .failing_upload_fragments
            .iter()
            .any(|fragment| key.contains(fragment.as_str()))
    }
}

enum Entry {
    Prefix(String),
    Key(String),
}

fn collect_entries(
    objects: &BTreeMap<String, Bytes>,
    prefix: &str,
    delimiter: Option<&str>,
) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut last_prefix: Option<String> = None;

    for key in objects.keys().filter(|key| key.starts_with(prefix)) {
        let rest = &key[prefix.len()..];
        let common_prefix = delimiter
            .filter(|d| !d.is_empty())
            .and_then(|d| rest.find(d).map(|i| format!("{prefix}{}", &rest[..i + d.len()])));

        match common_prefix {
            Some(common_prefix) => {
                if last_prefix.as_deref() != Some(common_prefix.as_str()) {
                    last_prefix = Some(common_prefix.clone());
                    entries.push(Entry::Prefix(common_prefix));
                }
            }
            None => entries.push(Entry::Key(key.clone())),
        }
    }

    entries
}

#[async_trait]
impl StorageTrait for InMemoryStorage {
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
        let delay = {
            let mut state = self.state();
            state.list_calls.push(ListCall {
                prefix: prefix.to_string(),
                delimiter: delimiter.map(str::to_string),
                continuation_token: continuation_token.clone(),
            });
            state.list_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state();
        if state.failing_list_prefixes.contains(prefix) {
            return Err(anyhow!("AccessDenied: listing '{prefix}' is not allowed"));
        }

        let entries = collect_entries(&state.objects, prefix, delimiter);
        let page_size = match state.page_size {
            0 => max_keys.max(1) as usize,
            n => n.min(max_keys.max(1) as usize),
        };
        let start = match continuation_token {
            Some(token) => token.parse::<usize>()?,
            None => 0,
        };
        let end = (start + page_size).min(entries.len());

        let mut page = ListObjectsPage::default();
        for entry in entries.iter().take(end).skip(start) {
            match entry {
                Entry::Prefix(p) => page.common_prefixes.push(p.clone()),
                Entry::Key(k) => page.keys.push(k.clone()),
            }
        }
        page.is_truncated = end < entries.len();
        page.next_continuation_token = page.is_truncated.then(|| end.to_string());
        Ok(page)
    }

    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let delay = {
            let mut state = self.state();
            state.put_calls.push(key.to_string());
            if Self::upload_fails(&state, key) {
                return Err(anyhow!("injected put failure for '{key}'"));
            }
            state.objects.insert(key.to_string(), body);
            state
                .content_types
                .insert(key.to_string(), content_type.to_string());
            state.put_response_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String> {
        let mut state = self.state();
        state.next_upload_id += 1;
        let upload_id = format!("upload-id-{}", state.next_upload_id);
        state.multipart.insert(
            upload_id.clone(),
            MultipartState {
                key: key.to_string(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        if let Some((fragment, gate)) = &self.part_gate {
            if key.contains(fragment.as_str()) {
                gate.acquire().await?.forget();
            }
        }

        let mut state = self.state();
        state.part_calls.push((key.to_string(), part_number));
        if Self::upload_fails(&state, key) {
            return Err(anyhow!("injected part failure for '{key}'"));
        }
        if state.transient_part_failures > 0 {
            state.transient_part_failures -= 1;
            return Err(anyhow!("injected transient part failure"));
        }

        let upload = state
            .multipart
            .get_mut(upload_id)
            .ok_or_else(|| anyhow!("NoSuchUpload: {upload_id}"))?;
        upload.parts.insert(part_number, body);

        Ok(CompletedPart::builder()
            .e_tag(format!("\"etag-{part_number}\""))
            .part_number(part_number)
            .build())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()> {
        let mut state = self.state();
        let upload = state
            .multipart
            .remove(upload_id)
            .ok_or_else(|| anyhow!("NoSuchUpload: {upload_id}"))?;

        let mut body = Vec::new();
        for part in &parts {
            let part_number = part.part_number().unwrap_or_default();
            let data = upload
                .parts
                .get(&part_number)
                .ok_or_else(|| anyhow!("InvalidPart: {part_number}"))?;
            body.extend_from_slice(data);
        }

        state.objects.insert(key.to_string(), Bytes::from(body));
        state
            .content_types
            .insert(key.to_string(), upload.content_type);
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let mut state = self.state();
        state.multipart.remove(upload_id);
        state.aborted_uploads.push(key.to_string());
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut state = self.state();
        state.delete_object_calls.push(key.to_string());
        if state.failing_delete_keys.contains(key) {
            return Err(anyhow!("AccessDenied: cannot delete '{key}'"));
        }
        state.objects.remove(key);
        Ok(())
    }

    async fn delete_objects(&self, objects: Vec<ObjectIdentifier>) -> Result<DeleteObjectsOutput> {
        let mut state = self.state();
        let keys: Vec<String> = objects.iter().map(|o| o.key().to_string()).collect();
        let request_index = state.delete_objects_calls.len();
        state.delete_objects_calls.push(keys.clone());

        if state.failing_batch_requests.contains(&request_index) {
            return Err(anyhow!("InternalError: DeleteObjects request failed"));
        }

        let mut builder = DeleteObjectsOutput::builder();
        if !state.keyless_batch_errors.is_empty() {
            for (code, message) in state.keyless_batch_errors.clone() {
                builder = builder.errors(
                    aws_sdk_s3::types::Error::builder()
                        .code(code)
                        .message(message)
                        .build(),
                );
            }
            return Ok(builder.build());
        }
        for key in keys {
            if let Some((code, message)) = state.batch_error_keys.get(&key).cloned() {
                builder = builder.errors(
                    aws_sdk_s3::types::Error::builder()
                        .key(&key)
                        .code(code)
                        .message(message)
                        .build(),
                );
            } else {
                state.objects.remove(&key);
                builder = builder.deleted(DeletedObject::builder().key(&key).build());
            }
        }
        Ok(builder.build())
    }

    fn get_client(&self) -> Option<Arc<Client>> {
        None
    }
}
