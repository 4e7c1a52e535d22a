//! Canonical object URLs and normalisation of stored object references.
//!
//! A stored reference may be a public URL (virtual-hosted or path-style), an
//! `s3://bucket/key` URI, or a bare key. Every delete or re-upload goes
//! through [`normalize_to_key`] first.

use url::Url;

use crate::types::error::S3BrowseError;

const KEY_SEPARATOR: char = '/';

/// Build the public URL of `key`.
///
/// Each path segment is percent-encoded, so keys with spaces or `+`
/// survive a round trip through [`normalize_to_key`].
///
/// ```
/// use s3browse_rs::object_url;
///
/// assert_eq!(
///     object_url("media", "eu-north-1", "videos/my clip.mp4"),
///     "https://media.s3.eu-north-1.amazonaws.com/videos/my%20clip.mp4"
/// );
/// ```
pub fn object_url(bucket: &str, region: &str, key: &str) -> String {
    let encoded_key = key
        .split(KEY_SEPARATOR)
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("https://{bucket}.s3.{region}.amazonaws.com/{encoded_key}")
}

/// Normalise a stored reference into an object key of `bucket`.
///
/// Returns `Ok(None)` for an empty or whitespace-only reference.
///
/// ```
/// use s3browse_rs::normalize_to_key;
///
/// let key = normalize_to_key(
///     "https://media.s3.eu-north-1.amazonaws.com/videos/my%20clip.mp4",
///     "media",
/// )
/// .unwrap();
/// assert_eq!(key.as_deref(), Some("videos/my clip.mp4"));
///
/// assert_eq!(normalize_to_key("   ", "media").unwrap(), None);
/// ```
pub fn normalize_to_key(reference: &str, bucket: &str) -> Result<Option<String>, S3BrowseError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Ok(None);
    }

    if !reference.contains("://") {
        let key = percent_decode(reference, reference)?;
        let key = key.trim_start_matches(KEY_SEPARATOR);
        if key.is_empty() {
            return Err(S3BrowseError::InvalidReference(reference.to_string()));
        }
        return Ok(Some(key.to_string()));
    }

    let url = Url::parse(reference)
        .map_err(|e| S3BrowseError::InvalidReference(format!("{reference} ({e})")))?;

    let key = match url.scheme() {
        "http" | "https" => key_from_http_url(&url, bucket, reference)?,
        "s3" => {
            if url.host_str() != Some(bucket) {
                return Err(S3BrowseError::InvalidReference(format!(
                    "{reference} (bucket does not match '{bucket}')"
                )));
            }
            percent_decode(url.path().trim_start_matches(KEY_SEPARATOR), reference)?
        }
        _ => return Err(S3BrowseError::InvalidReference(reference.to_string())),
    };

    if key.is_empty() {
        return Err(S3BrowseError::InvalidReference(format!(
            "{reference} (no object key)"
        )));
    }

    Ok(Some(key))
}

/// Build the key of a new upload: `{folder}/{unix_millis}_{file_name}`.
///
/// A folder that already ends with `/` is not doubled, and the root folder
/// (`""`) yields `{unix_millis}_{file_name}`.
pub fn build_object_key(folder: &str, file_name: &str, unix_millis: i64) -> String {
    if folder.is_empty() {
        format!("{unix_millis}_{file_name}")
    } else if folder.ends_with(KEY_SEPARATOR) {
        format!("{folder}{unix_millis}_{file_name}")
    } else {
        format!("{folder}{KEY_SEPARATOR}{unix_millis}_{file_name}")
    }
}

fn key_from_http_url(url: &Url, bucket: &str, reference: &str) -> Result<String, S3BrowseError> {
    let path = url.path().trim_start_matches(KEY_SEPARATOR);
    let host = url.host_str().unwrap_or_default();

    if is_virtual_hosted(host, bucket) {
        return percent_decode(path, reference);
    }

    // Path-style: the first segment names the bucket.
    let (first_segment, rest) = path.split_once(KEY_SEPARATOR).unwrap_or((path, ""));
    if percent_decode(first_segment, reference)? == bucket {
        percent_decode(rest, reference)
    } else {
        percent_decode(path, reference)
    }
}

fn is_virtual_hosted(host: &str, bucket: &str) -> bool {
    host.strip_prefix(bucket)
        .is_some_and(|rest| rest.starts_with('.'))
}

fn percent_decode(value: &str, reference: &str) -> Result<String, S3BrowseError> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| S3BrowseError::InvalidReference(format!("{reference} ({e})")))
}
