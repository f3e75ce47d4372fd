//! Lock state oracle: identity comparison between share and store.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::core::errors::{Result, SwdError};
use crate::share::ShareLayout;

/// (device, inode) identity of a filesystem object.
#[cfg(unix)]
pub(crate) fn identity(meta: &fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino())
}

#[cfg(not(unix))]
pub(crate) fn identity(_meta: &fs::Metadata) -> (u64, u64) {
    (0, 0)
}

/// Is the share file at `rel` currently locked?
///
/// Stats both sides fresh. A missing store entry means unlocked; a missing
/// share file propagates `NotFound` because lock state is defined for an
/// existing share file only. Equal content with distinct inodes is NOT a
/// lock — identity, not content, defines it.
pub fn is_locked(layout: &ShareLayout, rel: &Path) -> Result<bool> {
    let share_path = layout.share_path(rel)?;
    let share_meta =
        fs::symlink_metadata(&share_path).map_err(|source| SwdError::io(&share_path, source))?;
    let (dev, ino) = identity(&share_meta);
    is_locked_ids(layout, rel, dev, ino)
}

/// Lock check against an already-observed share-side identity.
///
/// Used where the caller just stat'ed the share file (walker snapshot or a
/// pre-deletion re-verify) and only the store side needs a fresh stat.
pub fn is_locked_ids(layout: &ShareLayout, rel: &Path, dev: u64, ino: u64) -> Result<bool> {
    let store_path = layout.store_path(rel)?;
    match fs::symlink_metadata(&store_path) {
        Ok(store_meta) => Ok(store_meta.is_file() && identity(&store_meta) == (dev, ino)),
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(SwdError::io(&store_path, source)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, ShareLayout) {
        let tmp = TempDir::new().unwrap();
        let share = tmp.path().join("foobar");
        fs::create_dir_all(&share).unwrap();
        let layout = ShareLayout::new(&share).unwrap();
        fs::create_dir_all(layout.store_root()).unwrap();
        (tmp, layout)
    }

    #[test]
    fn unlocked_without_store_entry() {
        let (_tmp, layout) = fixture();
        fs::write(layout.share_root().join("a.txt"), "x").unwrap();

        assert!(!is_locked(&layout, Path::new("a.txt")).unwrap());
    }

    #[test]
    fn locked_when_store_holds_same_inode() {
        let (_tmp, layout) = fixture();
        let share_file = layout.share_root().join("a.txt");
        fs::write(&share_file, "x").unwrap();
        fs::hard_link(&share_file, layout.store_root().join("a.txt")).unwrap();

        assert!(is_locked(&layout, Path::new("a.txt")).unwrap());
    }

    #[test]
    fn equal_content_distinct_inode_is_not_locked() {
        let (_tmp, layout) = fixture();
        fs::write(layout.share_root().join("a.txt"), "same bytes").unwrap();
        fs::write(layout.store_root().join("a.txt"), "same bytes").unwrap();

        assert!(!is_locked(&layout, Path::new("a.txt")).unwrap());
    }

    #[test]
    fn missing_share_file_propagates_not_found() {
        let (_tmp, layout) = fixture();
        let err = is_locked(&layout, Path::new("ghost.txt")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn ids_variant_skips_share_stat() {
        let (_tmp, layout) = fixture();
        let share_file = layout.share_root().join("a.txt");
        fs::write(&share_file, "x").unwrap();
        fs::hard_link(&share_file, layout.store_root().join("a.txt")).unwrap();

        let meta = fs::symlink_metadata(&share_file).unwrap();
        let (dev, ino) = identity(&meta);
        assert!(is_locked_ids(&layout, Path::new("a.txt"), dev, ino).unwrap());
        // A different claimed identity does not match.
        assert!(!is_locked_ids(&layout, Path::new("a.txt"), dev, ino + 1).unwrap());
    }

    #[test]
    fn escaping_rel_path_is_invalid() {
        let (_tmp, layout) = fixture();
        let err = is_locked(&layout, Path::new("../outside")).unwrap_err();
        assert!(matches!(err, SwdError::InvalidPath { .. }));
    }
}
