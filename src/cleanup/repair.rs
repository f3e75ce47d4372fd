//! Cleanup phase 1: re-establish missing share-side hardlinks.
//!
//! The store is the protected mirror: a store entry without a share
//! counterpart means the share copy was lost while still under lock, so the
//! invariant is restored by linking the store's inode back into the share.
//! A counterpart that exists under a different inode is a conflict; policy
//! is to skip and report, never to overwrite or delete either side.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::cleanup::walker::{FileEntry, TreeWalk};
use crate::cleanup::EntryFailure;
use crate::core::errors::{Result, SwdError};
use crate::lock::oracle::identity;
use crate::share::ShareLayout;

/// Outcome of one repair pass over a share's store tree.
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    /// Store files examined.
    pub store_files_seen: usize,
    /// Share-relative paths whose hardlink was re-created (or would be,
    /// under dry-run).
    pub restored: Vec<PathBuf>,
    /// Share-relative paths where the share holds a different inode.
    pub conflicts: Vec<PathBuf>,
    /// Entries already consistent; no action taken.
    pub already_consistent: usize,
    /// Per-entry failures; the pass continued past each.
    pub failures: Vec<EntryFailure>,
    /// Whether this pass was a dry-run.
    pub dry_run: bool,
}

/// Walk the store tree and restore the lock invariant for every entry.
///
/// A share that has never had a lock has no store directory; that is an
/// empty pass, not an error. An existing store root that cannot be listed
/// is fatal. This phase only ever adds hardlinks on the share side.
pub fn repair_share(layout: &ShareLayout, dry_run: bool) -> Result<RepairReport> {
    let mut report = RepairReport {
        dry_run,
        ..RepairReport::default()
    };

    let walk = match TreeWalk::new(layout.store_root()) {
        Ok(walk) => walk,
        Err(err) if err.is_not_found() => return Ok(report),
        Err(err) => return Err(err),
    };

    for item in walk {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                report
                    .failures
                    .push(EntryFailure::new(layout.store_root(), &err));
                continue;
            }
        };
        report.store_files_seen += 1;
        repair_entry(layout, &entry, &mut report);
    }

    Ok(report)
}

fn repair_entry(layout: &ShareLayout, entry: &FileEntry, report: &mut RepairReport) {
    let share_path = match layout.share_path(&entry.rel_path) {
        Ok(path) => path,
        Err(err) => {
            report.failures.push(EntryFailure::new(&entry.path, &err));
            return;
        }
    };

    match fs::symlink_metadata(&share_path) {
        Ok(share_meta) => {
            if share_meta.is_file() && identity(&share_meta) == (entry.dev, entry.ino) {
                report.already_consistent += 1;
            } else {
                // Content at this path was replaced while the lock was
                // active. Conservative policy: report, touch nothing.
                report.conflicts.push(entry.rel_path.clone());
            }
        }
        Err(source) if source.kind() == ErrorKind::NotFound => {
            if report.dry_run {
                report.restored.push(entry.rel_path.clone());
                return;
            }
            match restore_link(entry, &share_path) {
                Ok(()) => report.restored.push(entry.rel_path.clone()),
                Err(SwdError::LockConflict { .. }) => {
                    report.conflicts.push(entry.rel_path.clone());
                }
                Err(err) => report.failures.push(EntryFailure::new(&share_path, &err)),
            }
        }
        Err(source) => {
            let err = SwdError::io(&share_path, source);
            report.failures.push(EntryFailure::new(&share_path, &err));
        }
    }
}

/// Hardlink a store entry back into the share, creating intermediate share
/// directories as needed.
fn restore_link(entry: &FileEntry, share_path: &std::path::Path) -> Result<()> {
    if let Some(parent) = share_path.parent() {
        fs::create_dir_all(parent).map_err(|source| SwdError::io(parent, source))?;
    }
    match fs::hard_link(&entry.path, share_path) {
        Ok(()) => Ok(()),
        // Lost a race against an SMB client creating the same name: if the
        // winner carries our inode we are consistent, otherwise conflict.
        Err(source) if source.kind() == ErrorKind::AlreadyExists => {
            let share_meta =
                fs::symlink_metadata(share_path).map_err(|e| SwdError::io(share_path, e))?;
            if share_meta.is_file() && identity(&share_meta) == (entry.dev, entry.ino) {
                Ok(())
            } else {
                Err(SwdError::LockConflict {
                    path: share_path.to_path_buf(),
                })
            }
        }
        Err(source) => Err(SwdError::io(share_path, source)),
    }
}
