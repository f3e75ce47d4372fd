//! Pure share↔store path mapping for a single share root.

use std::path::{Component, Path, PathBuf};

use crate::core::errors::{Result, SwdError};

/// Marker prefixed to a share's final path component to name its store.
pub const STORE_PREFIX: &str = ".";

/// Path layout of one share and its hidden store sibling.
///
/// Invariants: `store.parent == share.parent` and
/// `store.name == "." + share.name`. All mapping is purely syntactic; no
/// filesystem access happens here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLayout {
    share_root: PathBuf,
    store_root: PathBuf,
}

impl ShareLayout {
    /// Build the layout for a share root.
    ///
    /// The root must be absolute and must have both a parent directory and a
    /// final component (so `/` itself is rejected).
    pub fn new(share_root: impl Into<PathBuf>) -> Result<Self> {
        let share_root = share_root.into();
        if !share_root.is_absolute() {
            return Err(SwdError::InvalidPath {
                path: share_root,
                details: "share root must be absolute".to_string(),
            });
        }
        let (Some(parent), Some(name)) = (share_root.parent(), share_root.file_name()) else {
            return Err(SwdError::InvalidPath {
                path: share_root,
                details: "share root has no parent or name".to_string(),
            });
        };
        let mut store_name = std::ffi::OsString::from(STORE_PREFIX);
        store_name.push(name);
        let store_root = parent.join(store_name);
        Ok(Self {
            share_root,
            store_root,
        })
    }

    /// Absolute path of the share root.
    pub fn share_root(&self) -> &Path {
        &self.share_root
    }

    /// Absolute path of the hidden store root.
    pub fn store_root(&self) -> &Path {
        &self.store_root
    }

    /// Map a share-relative path to its store counterpart.
    pub fn store_path(&self, rel: &Path) -> Result<PathBuf> {
        check_relative(rel)?;
        Ok(self.store_root.join(rel))
    }

    /// Map a share-relative path to its absolute share location.
    pub fn share_path(&self, rel: &Path) -> Result<PathBuf> {
        check_relative(rel)?;
        Ok(self.share_root.join(rel))
    }
}

/// Reject relative paths that could escape the tree root.
///
/// Only plain name components are allowed: no absolute paths, no `..`, no
/// `.`, no empty paths.
fn check_relative(rel: &Path) -> Result<()> {
    if rel.as_os_str().is_empty() {
        return Err(SwdError::InvalidPath {
            path: rel.to_path_buf(),
            details: "empty relative path".to_string(),
        });
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) => {}
            Component::ParentDir => {
                return Err(SwdError::InvalidPath {
                    path: rel.to_path_buf(),
                    details: "path escapes share root via `..`".to_string(),
                });
            }
            _ => {
                return Err(SwdError::InvalidPath {
                    path: rel.to_path_buf(),
                    details: format!("disallowed component {component:?}"),
                });
            }
        }
    }
    Ok(())
}
