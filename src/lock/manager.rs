//! Lock/unlock side effects: creating and removing store hardlinks.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::core::errors::{Result, SwdError};
use crate::lock::oracle::{self, identity};
use crate::share::ShareLayout;

/// Result of a `lock` call. Both variants are success; locking is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// A new store hardlink was created.
    Locked,
    /// The file was already locked; nothing changed.
    AlreadyLocked,
}

/// Result of an `unlock` call. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The store hardlink was removed.
    Unlocked,
    /// The file was not locked; nothing changed.
    NotLocked,
}

/// Lock the share file at `rel` by hardlinking it into the store.
///
/// Fails with `NotFound` when the share file is missing or not a regular
/// file. Already-locked is a no-op. A store path occupied by a different
/// inode fails with `LockConflict` — the occupant is never replaced.
/// Store parent directories are created as needed; any failure in directory
/// creation or link creation surfaces to the caller.
pub fn lock(layout: &ShareLayout, rel: &Path) -> Result<LockOutcome> {
    let share_path = layout.share_path(rel)?;
    let store_path = layout.store_path(rel)?;

    let share_meta =
        fs::symlink_metadata(&share_path).map_err(|source| SwdError::io(&share_path, source))?;
    if !share_meta.is_file() {
        return Err(SwdError::NotFound { path: share_path });
    }
    let share_id = identity(&share_meta);

    match fs::symlink_metadata(&store_path) {
        Ok(store_meta) => {
            if store_meta.is_file() && identity(&store_meta) == share_id {
                return Ok(LockOutcome::AlreadyLocked);
            }
            return Err(SwdError::LockConflict { path: store_path });
        }
        Err(source) if source.kind() == ErrorKind::NotFound => {}
        Err(source) => return Err(SwdError::io(&store_path, source)),
    }

    if let Some(parent) = store_path.parent() {
        fs::create_dir_all(parent).map_err(|source| SwdError::io(parent, source))?;
    }
    match fs::hard_link(&share_path, &store_path) {
        Ok(()) => Ok(LockOutcome::Locked),
        // Lost a race against a concurrent lock of the same file: accept the
        // winner's link if it carries our inode.
        Err(source) if source.kind() == ErrorKind::AlreadyExists => {
            if oracle::is_locked_ids(layout, rel, share_id.0, share_id.1)? {
                Ok(LockOutcome::AlreadyLocked)
            } else {
                Err(SwdError::LockConflict { path: store_path })
            }
        }
        Err(source) => Err(SwdError::io(&store_path, source)),
    }
}

/// Unlock the share file at `rel` by removing its store hardlink.
///
/// Not-locked is a no-op. The share file is never touched. A store entry
/// that vanished between the check and the removal counts as unlocked.
pub fn unlock(layout: &ShareLayout, rel: &Path) -> Result<UnlockOutcome> {
    if !oracle::is_locked(layout, rel)? {
        return Ok(UnlockOutcome::NotLocked);
    }
    let store_path = layout.store_path(rel)?;
    match fs::remove_file(&store_path) {
        Ok(()) => Ok(UnlockOutcome::Unlocked),
        Err(source) if source.kind() == ErrorKind::NotFound => Ok(UnlockOutcome::Unlocked),
        Err(source) => Err(SwdError::io(&store_path, source)),
    }
}
