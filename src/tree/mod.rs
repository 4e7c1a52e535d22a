//! Client-side mirror of the bucket's folder hierarchy.
//!
//! [`FolderTree`] is plain state. Expanding an unfetched folder is split into
//! three steps so that the network call happens without holding any lock:
//!
//! ```text
//! plan_toggle(path)  ->  ExpandPlan::Fetch { prefix }   (marks prefix loading)
//! lister.list_one_level(prefix)                         (no lock held)
//! splice(prefix, listing)                               (rewrites that node only)
//! ```
//!
//! Because a splice only touches the node whose full path matches, splices
//! of disjoint paths commute. [`FolderBrowser`] drives these steps over a
//! `tokio::sync::Mutex`.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::lister::ObjectLister;
use crate::types::error::S3BrowseError;
use crate::types::{FolderNode, Listing, NodeKind};

/// What `toggle_expand` has to do for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandPlan {
    /// The node was expanded and is now collapsed.
    Collapse,
    /// The node was collapsed with cached children and is now expanded.
    ExpandCached,
    /// The node must be listed; `prefix` is marked as loading.
    Fetch { prefix: String },
    /// A fetch of this path is already in flight.
    AlreadyLoading,
}

/// Result of [`FolderBrowser::toggle_expand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Collapsed,
    ExpandedFromCache,
    Fetched,
    AlreadyLoading,
}

/// One line of the flattened tree view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub depth: usize,
    pub path: String,
    pub display_name: String,
    pub kind: NodeKind,
    pub expanded: bool,
    pub loading: bool,
    pub local_only: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FolderTree {
    root: FolderNode,
    loading: HashSet<String>,
    local_folders: BTreeSet<String>,
    delimiter: String,
}

impl FolderTree {
    pub fn new(delimiter: &str) -> Self {
        FolderTree {
            root: FolderNode::root(),
            loading: HashSet::new(),
            local_folders: BTreeSet::new(),
            delimiter: delimiter.to_string(),
        }
    }

    pub fn root(&self) -> &FolderNode {
        &self.root
    }

    pub fn node(&self, path: &str) -> Option<&FolderNode> {
        find(&self.root, path)
    }

    pub fn is_fetched(&self, path: &str) -> bool {
        self.node(path).is_some_and(FolderNode::is_fetched)
    }

    pub fn is_loading(&self, path: &str) -> bool {
        self.loading.contains(path)
    }

    /// Decide what toggling `path` needs, applying every local change.
    ///
    /// Collapse and cached expansion complete here. A `Fetch` plan marks the
    /// path as loading until [`splice`](Self::splice) or
    /// [`abandon_fetch`](Self::abandon_fetch) is called.
    pub fn plan_toggle(&mut self, path: &str) -> Result<ExpandPlan, S3BrowseError> {
        let already_loading = self.loading.contains(path);
        let node = self.node_mut(path)?;

        if node.expanded {
            node.expanded = false;
            return Ok(ExpandPlan::Collapse);
        }
        if already_loading {
            return Ok(ExpandPlan::AlreadyLoading);
        }
        if node.is_fetched() {
            node.expanded = true;
            return Ok(ExpandPlan::ExpandCached);
        }

        self.loading.insert(path.to_string());
        Ok(ExpandPlan::Fetch {
            prefix: path.to_string(),
        })
    }

    /// Install the one-level `listing` of `path` and expand it.
    ///
    /// Local-only folders created under `path` stay visible until a listing
    /// reports them as real folders.
    pub fn splice(&mut self, path: &str, listing: Listing) -> Result<(), S3BrowseError> {
        self.loading.remove(path);

        let local_children: Vec<String> = self
            .local_folders
            .iter()
            .filter(|folder| self.parent_path(folder) == path)
            .cloned()
            .collect();

        let mut children: Vec<FolderNode> = listing
            .folders
            .iter()
            .map(|folder| FolderNode::folder(folder))
            .collect();
        for local in local_children {
            if listing.folders.contains(&local) {
                self.local_folders.remove(&local);
            } else {
                children.push(local_folder_node(&local));
            }
        }
        children.extend(listing.files.iter().map(|file| FolderNode::file(file)));

        let node = self.node_mut(path)?;
        node.children = Some(children);
        node.expanded = true;
        Ok(())
    }

    /// Clear the loading mark of a fetch that failed. The node stays
    /// collapsed and unfetched.
    pub fn abandon_fetch(&mut self, path: &str) {
        self.loading.remove(path);
    }

    /// Drop the cached children of `path` so that the next expansion lists
    /// it again.
    pub fn invalidate(&mut self, path: &str) -> Result<(), S3BrowseError> {
        let node = self.node_mut(path)?;
        node.children = None;
        node.expanded = false;
        Ok(())
    }

    /// Remove the folder `prefix` and everything below it.
    ///
    /// Returns whether a node was removed. Removing the root resets the tree.
    pub fn remove_subtree(&mut self, prefix: &str) -> bool {
        let prefix = self.folder_path(prefix);
        let prefix = prefix.as_str();
        self.loading.retain(|path| !path.starts_with(prefix));
        self.local_folders.retain(|path| !path.starts_with(prefix));

        if prefix.is_empty() {
            self.root = FolderNode::root();
            return true;
        }

        let parent = self.parent_path(prefix).to_string();
        let Ok(parent_node) = self.node_mut(&parent) else {
            return false;
        };
        let Some(children) = parent_node.children.as_mut() else {
            return false;
        };
        let before = children.len();
        children.retain(|child| child.name != prefix);
        before != children.len()
    }

    /// Add a folder that exists only client-side until an upload lands in it.
    ///
    /// Returns the full path of the new folder.
    pub fn create_local_folder(&mut self, parent: &str, name: &str) -> Result<String, S3BrowseError> {
        let name = name.trim();
        if name.is_empty() || (!self.delimiter.is_empty() && name.contains(self.delimiter.as_str())) {
            return Err(S3BrowseError::InvalidReference(format!(
                "invalid folder name '{name}'"
            )));
        }

        let path = format!("{parent}{name}{}", self.delimiter);
        let parent_node = self.node_mut(parent)?;
        if let Some(children) = parent_node.children.as_mut() {
            if children.iter().any(|child| child.name == path) {
                return Ok(path);
            }
            children.push(local_folder_node(&path));
        }
        self.local_folders.insert(path.clone());

        debug!(path = path.as_str(), "local folder created.");
        Ok(path)
    }

    /// Depth-annotated rows of every visible node, in display order.
    pub fn visible_rows(&self) -> Vec<TreeRow> {
        let mut rows = Vec::new();
        if self.root.expanded {
            self.push_rows(&self.root, 0, &mut rows);
        }
        rows
    }

    fn push_rows(&self, node: &FolderNode, depth: usize, rows: &mut Vec<TreeRow>) {
        let Some(children) = node.children.as_ref() else {
            return;
        };
        for child in children {
            rows.push(TreeRow {
                depth,
                path: child.name.clone(),
                display_name: child.display_name(&self.delimiter).to_string(),
                kind: child.kind,
                expanded: child.expanded,
                loading: self.loading.contains(&child.name),
                local_only: child.local_only,
            });
            if child.expanded {
                self.push_rows(child, depth + 1, rows);
            }
        }
    }

    fn node_mut(&mut self, path: &str) -> Result<&mut FolderNode, S3BrowseError> {
        let node = find_mut(&mut self.root, path)
            .ok_or_else(|| S3BrowseError::UnknownTreePath(path.to_string()))?;
        if !node.is_folder() {
            return Err(S3BrowseError::NotAFolder(path.to_string()));
        }
        Ok(node)
    }

    fn folder_path(&self, prefix: &str) -> String {
        let delimiter = self.delimiter.as_str();
        if prefix.is_empty() || delimiter.is_empty() || prefix.ends_with(delimiter) {
            return prefix.to_string();
        }
        format!("{prefix}{delimiter}")
    }

    fn parent_path<'a>(&self, path: &'a str) -> &'a str {
        let delimiter = self.delimiter.as_str();
        if delimiter.is_empty() {
            return "";
        }
        let trimmed = path.strip_suffix(delimiter).unwrap_or(path);
        match trimmed.rfind(delimiter) {
            Some(index) => &path[..index + delimiter.len()],
            None => "",
        }
    }
}

fn local_folder_node(path: &str) -> FolderNode {
    FolderNode {
        children: Some(Vec::new()),
        local_only: true,
        ..FolderNode::folder(path)
    }
}

fn leads_to(child: &FolderNode, path: &str) -> bool {
    child.name == path || (child.is_folder() && !child.name.is_empty() && path.starts_with(&child.name))
}

fn find<'a>(node: &'a FolderNode, path: &str) -> Option<&'a FolderNode> {
    if node.name == path {
        return Some(node);
    }
    let child = node.children.as_ref()?.iter().find(|c| leads_to(c, path))?;
    find(child, path)
}

fn find_mut<'a>(node: &'a mut FolderNode, path: &str) -> Option<&'a mut FolderNode> {
    if node.name == path {
        return Some(node);
    }
    let child = node
        .children
        .as_mut()?
        .iter_mut()
        .find(|c| leads_to(c, path))?;
    find_mut(child, path)
}

/// A [`FolderTree`] shared across tasks, expanded through an [`ObjectLister`].
#[derive(Clone)]
pub struct FolderBrowser {
    tree: Arc<Mutex<FolderTree>>,
    lister: ObjectLister,
}

impl FolderBrowser {
    pub fn new(lister: ObjectLister) -> Self {
        FolderBrowser {
            tree: Arc::new(Mutex::new(FolderTree::new(lister.delimiter()))),
            lister,
        }
    }

    /// Collapse, re-expand from cache, or fetch and expand `path`.
    ///
    /// On a failed fetch the tree is left as it was before the call.
    pub async fn toggle_expand(&self, path: &str) -> Result<ToggleOutcome, S3BrowseError> {
        let plan = self.tree.lock().await.plan_toggle(path)?;

        let prefix = match plan {
            ExpandPlan::Collapse => return Ok(ToggleOutcome::Collapsed),
            ExpandPlan::ExpandCached => return Ok(ToggleOutcome::ExpandedFromCache),
            ExpandPlan::AlreadyLoading => return Ok(ToggleOutcome::AlreadyLoading),
            ExpandPlan::Fetch { prefix } => prefix,
        };

        match self.lister.list_one_level(&prefix).await {
            Ok(listing) => {
                self.tree.lock().await.splice(&prefix, listing)?;
                Ok(ToggleOutcome::Fetched)
            }
            Err(e) => {
                warn!(prefix = prefix.as_str(), error = e.to_string(), "folder fetch failed.");
                self.tree.lock().await.abandon_fetch(&prefix);
                Err(e)
            }
        }
    }

    pub async fn invalidate(&self, path: &str) -> Result<(), S3BrowseError> {
        self.tree.lock().await.invalidate(path)
    }

    pub async fn remove_subtree(&self, prefix: &str) -> bool {
        self.tree.lock().await.remove_subtree(prefix)
    }

    pub async fn create_local_folder(&self, parent: &str, name: &str) -> Result<String, S3BrowseError> {
        self.tree.lock().await.create_local_folder(parent, name)
    }

    pub async fn visible_rows(&self) -> Vec<TreeRow> {
        self.tree.lock().await.visible_rows()
    }

    /// A copy of the current tree state.
    pub async fn snapshot(&self) -> FolderTree {
        self.tree.lock().await.clone()
    }
}
