use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod token;

/// One level of a folder listing.
///
/// `folders` are common prefixes (always ending with the delimiter) and
/// `files` are object keys. Neither list contains duplicates, and both keep
/// the order in which the store returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub folders: Vec<String>,
    pub files: Vec<String>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.files.is_empty()
    }
}

/// Depth of a [`resolve`](crate::ObjectLister::resolve) call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Immediate children of the prefix only.
    OneLevel,
    /// Every folder and file below the prefix, depth-first.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Folder,
    File,
}

/// A node of the client-side folder tree.
///
/// `name` is the full cumulative path (`"a/b/"`, `"a/b/c.txt"`); the root is
/// `""`. `children` is `None` until the folder has been fetched, and once set
/// it holds the complete single-level listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub name: String,
    pub kind: NodeKind,
    pub children: Option<Vec<FolderNode>>,
    pub expanded: bool,
    pub local_only: bool,
}

impl FolderNode {
    pub fn root() -> Self {
        Self::folder("")
    }

    pub fn folder(name: &str) -> Self {
        FolderNode {
            name: name.to_string(),
            kind: NodeKind::Folder,
            children: None,
            expanded: false,
            local_only: false,
        }
    }

    pub fn file(name: &str) -> Self {
        FolderNode {
            name: name.to_string(),
            kind: NodeKind::File,
            children: None,
            expanded: false,
            local_only: false,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn is_fetched(&self) -> bool {
        self.children.is_some()
    }

    /// Last path segment, without the trailing delimiter.
    pub fn display_name(&self, delimiter: &str) -> &str {
        let trimmed = if delimiter.is_empty() {
            self.name.as_str()
        } else {
            self.name.strip_suffix(delimiter).unwrap_or(&self.name)
        };
        if delimiter.is_empty() {
            return trimmed;
        }
        match trimmed.rfind(delimiter) {
            Some(index) => &trimmed[index + delimiter.len()..],
            None => trimmed,
        }
    }
}

/// Identifier of one upload task, unique within an
/// [`UploadCoordinator`](crate::UploadCoordinator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadTaskId(pub u64);

impl fmt::Display for UploadTaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "upload-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Failed | UploadStatus::Cancelled
        )
    }
}

/// Snapshot of one upload, as shown by a UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub id: UploadTaskId,
    pub file_name: String,
    pub folder_key: String,
    pub object_key: String,
    pub progress_percent: u8,
    pub bytes_uploaded: u64,
    pub bytes_total: u64,
    pub status: UploadStatus,
}

/// Statistics sent through the stats channel while uploads run.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadStatistics {
    UploadStarted {
        task_id: UploadTaskId,
        key: String,
        bytes_total: u64,
    },
    UploadProgress {
        task_id: UploadTaskId,
        bytes_uploaded: u64,
        percent: u8,
    },
    UploadComplete {
        task_id: UploadTaskId,
        key: String,
    },
    UploadError {
        task_id: UploadTaskId,
        key: String,
    },
    UploadCancelled {
        task_id: UploadTaskId,
        key: String,
    },
}

/// A successfully deleted key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedKey {
    pub key: String,
}

/// A key that failed to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedKey {
    pub key: String,
    pub error_code: String,
    pub error_message: String,
}

/// Outcome of a folder deletion in which every key was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<DeletedKey>,
}

/// AWS configuration file locations.
#[derive(Debug, Clone)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

/// AWS credential types supported by s3browse-rs.
#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair with secure zeroization.
///
/// The secret_access_key and session_token are securely cleared from memory
/// when this struct is dropped, using the zeroize crate.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
