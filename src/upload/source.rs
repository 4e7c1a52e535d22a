use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::types::error::S3BrowseError;

/// Where the bytes of an upload come from.
#[derive(Debug, Clone)]
pub enum UploadBody {
    Bytes(Bytes),
    /// Read part by part, so a large file is never held in memory whole.
    File(PathBuf),
}

/// A file handed to the [`UploadCoordinator`](crate::UploadCoordinator).
#[derive(Debug, Clone)]
pub struct UploadSource {
    pub file_name: String,
    /// Overrides the type guessed from `file_name`.
    pub content_type: Option<String>,
    pub body: UploadBody,
}

impl UploadSource {
    pub fn from_bytes(file_name: &str, bytes: impl Into<Bytes>) -> Self {
        UploadSource {
            file_name: file_name.to_string(),
            content_type: None,
            body: UploadBody::Bytes(bytes.into()),
        }
    }

    /// Source for a local file. The file name is the last path component.
    pub async fn from_path(path: &Path) -> Result<Self, S3BrowseError> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(S3BrowseError::Io(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| S3BrowseError::Io(format!("{} has no file name", path.display())))?;

        Ok(UploadSource {
            file_name,
            content_type: None,
            body: UploadBody::File(path.to_path_buf()),
        })
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn content_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.file_name)
                .first_or_octet_stream()
                .to_string()
        })
    }

    pub async fn len(&self) -> Result<u64> {
        match &self.body {
            UploadBody::Bytes(bytes) => Ok(bytes.len() as u64),
            UploadBody::File(path) => Ok(tokio::fs::metadata(path)
                .await
                .with_context(|| format!("failed to stat {}", path.display()))?
                .len()),
        }
    }

    /// Read `length` bytes starting at `offset`.
    pub(crate) async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes> {
        match &self.body {
            UploadBody::Bytes(bytes) => {
                let start = (offset as usize).min(bytes.len());
                let end = (start + length as usize).min(bytes.len());
                Ok(bytes.slice(start..end))
            }
            UploadBody::File(path) => {
                let mut file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?;
                file.seek(SeekFrom::Start(offset)).await?;

                let mut buffer = vec![0u8; length as usize];
                let mut bytes_read = 0;
                while bytes_read < buffer.len() {
                    let n = file
                        .read(&mut buffer[bytes_read..])
                        .await
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    if n == 0 {
                        break;
                    }
                    bytes_read += n;
                }
                buffer.truncate(bytes_read);
                Ok(Bytes::from(buffer))
            }
        }
    }
}
