//! Cleanup phase 2: delete unlocked share files past the retention age.
//!
//! The scan-time lock check is only an optimization; the check that decides
//! a deletion is the fresh one taken immediately before `remove_file`. No
//! file whose store-side hardlink matches its inode at that moment is ever
//! deleted, regardless of what the scan snapshot said.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::cleanup::walker::{FileEntry, TreeWalk};
use crate::cleanup::EntryFailure;
use crate::core::errors::{Result, SwdError};
use crate::lock::oracle::{identity, is_locked_ids};
use crate::share::ShareLayout;

/// Outcome of one retention sweep over a share tree.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Share files examined.
    pub share_files_seen: usize,
    /// Share-relative paths deleted (or slated for deletion under dry-run).
    pub deleted: Vec<PathBuf>,
    /// Bytes reclaimed by deletions.
    pub bytes_freed: u64,
    /// Files retained because they were locked.
    pub retained_locked: usize,
    /// Files retained because their age does not exceed the threshold.
    pub retained_fresh: usize,
    /// Entries that vanished or were replaced between scan and action.
    pub skipped_races: usize,
    /// Per-entry failures; the sweep continued past each.
    pub failures: Vec<EntryFailure>,
    /// Whether this sweep was a dry-run.
    pub dry_run: bool,
}

/// Walk the share tree and delete unlocked files strictly older than
/// `threshold` as of `now`. Age equal to the threshold retains the file.
///
/// Deletion failures are per-file and do not abort the sweep. Directories
/// emptied by deletions are left in place.
pub fn sweep_share(
    layout: &ShareLayout,
    threshold: Duration,
    now: SystemTime,
    dry_run: bool,
) -> Result<SweepReport> {
    let mut report = SweepReport {
        dry_run,
        ..SweepReport::default()
    };

    for item in TreeWalk::new(layout.share_root())? {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                report
                    .failures
                    .push(EntryFailure::new(layout.share_root(), &err));
                continue;
            }
        };
        report.share_files_seen += 1;
        sweep_entry(layout, &entry, threshold, now, &mut report);
    }

    Ok(report)
}

fn sweep_entry(
    layout: &ShareLayout,
    entry: &FileEntry,
    threshold: Duration,
    now: SystemTime,
    report: &mut SweepReport,
) {
    // Scan-time check using the identity the walker already observed.
    match is_locked_ids(layout, &entry.rel_path, entry.dev, entry.ino) {
        Ok(true) => {
            report.retained_locked += 1;
            return;
        }
        Ok(false) => {}
        Err(err) => {
            report.failures.push(EntryFailure::new(&entry.path, &err));
            return;
        }
    }

    if !exceeds_threshold(now, entry.modified, threshold) {
        report.retained_fresh += 1;
        return;
    }

    if report.dry_run {
        report.deleted.push(entry.rel_path.clone());
        report.bytes_freed += entry.size;
        return;
    }

    // Re-verify against fresh stats right before the destructive step: the
    // file may have been locked, replaced, rewritten, or removed since the
    // walker observed it.
    let fresh = match fs::symlink_metadata(&entry.path) {
        Ok(meta) => meta,
        Err(source) if source.kind() == ErrorKind::NotFound => {
            report.skipped_races += 1;
            return;
        }
        Err(source) => {
            let err = SwdError::io(&entry.path, source);
            report.failures.push(EntryFailure::new(&entry.path, &err));
            return;
        }
    };
    let (dev, ino) = identity(&fresh);
    if !fresh.is_file() || (dev, ino) != (entry.dev, entry.ino) {
        // A different object now lives at this path; judge it next run.
        report.skipped_races += 1;
        return;
    }
    match is_locked_ids(layout, &entry.rel_path, dev, ino) {
        Ok(true) => {
            report.retained_locked += 1;
            return;
        }
        Ok(false) => {}
        Err(err) => {
            report.failures.push(EntryFailure::new(&entry.path, &err));
            return;
        }
    }
    let fresh_mtime = fresh.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    if !exceeds_threshold(now, fresh_mtime, threshold) {
        report.retained_fresh += 1;
        return;
    }

    match fs::remove_file(&entry.path) {
        Ok(()) => {
            report.deleted.push(entry.rel_path.clone());
            report.bytes_freed += fresh.len();
        }
        Err(source) if source.kind() == ErrorKind::NotFound => {
            report.skipped_races += 1;
        }
        Err(source) => {
            let err = SwdError::io(&entry.path, source);
            report.failures.push(EntryFailure::new(&entry.path, &err));
        }
    }
}

/// Strictly-exceeds comparison; a file exactly at the threshold is retained.
/// A modification time in the future counts as age zero.
fn exceeds_threshold(now: SystemTime, modified: SystemTime, threshold: Duration) -> bool {
    now.duration_since(modified).unwrap_or_default() > threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock;
    use filetime::{FileTime, set_file_mtime};
    use std::path::Path;
    use tempfile::TempDir;

    const WEEK: Duration = Duration::from_secs(7 * 86_400);

    fn fixture() -> (TempDir, ShareLayout) {
        let tmp = TempDir::new().unwrap();
        let share = tmp.path().join("foobar");
        fs::create_dir_all(&share).unwrap();
        (tmp, ShareLayout::new(&share).unwrap())
    }

    fn backdate(path: &Path, days: u64) {
        let then = SystemTime::now() - Duration::from_secs(days * 86_400);
        set_file_mtime(path, FileTime::from_system_time(then)).unwrap();
    }

    #[test]
    fn deletes_stale_unlocked_file() {
        let (_tmp, layout) = fixture();
        let old = layout.share_root().join("old.txt");
        fs::write(&old, "stale").unwrap();
        backdate(&old, 10);

        let report = sweep_share(&layout, WEEK, SystemTime::now(), false).unwrap();
        assert_eq!(report.deleted, vec![PathBuf::from("old.txt")]);
        assert_eq!(report.bytes_freed, 5);
        assert!(!old.exists());
    }

    #[test]
    fn retains_fresh_unlocked_file() {
        let (_tmp, layout) = fixture();
        let kept = layout.share_root().join("kept.txt");
        fs::write(&kept, "fresh").unwrap();
        backdate(&kept, 3);

        let report = sweep_share(&layout, WEEK, SystemTime::now(), false).unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.retained_fresh, 1);
        assert!(kept.exists());
    }

    #[test]
    fn age_equal_to_threshold_is_retained() {
        let (_tmp, layout) = fixture();
        let file = layout.share_root().join("boundary.txt");
        fs::write(&file, "b").unwrap();

        let now = SystemTime::now();
        let mtime = now - WEEK;
        set_file_mtime(&file, FileTime::from_system_time(mtime)).unwrap();

        // Pass the exact same `now`, so age == threshold exactly.
        let report = sweep_share(&layout, WEEK, now, false).unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.retained_fresh, 1);
        assert!(file.exists());
    }

    #[test]
    fn locked_file_retained_regardless_of_age() {
        let (_tmp, layout) = fixture();
        let locked = layout.share_root().join("locked.txt");
        fs::write(&locked, "keep").unwrap();
        backdate(&locked, 30);
        lock::lock(&layout, Path::new("locked.txt")).unwrap();

        let report = sweep_share(&layout, WEEK, SystemTime::now(), false).unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.retained_locked, 1);
        assert!(locked.exists());
    }

    #[test]
    fn future_mtime_counts_as_age_zero() {
        let (_tmp, layout) = fixture();
        let file = layout.share_root().join("future.txt");
        fs::write(&file, "f").unwrap();
        let future = SystemTime::now() + Duration::from_secs(3_600);
        set_file_mtime(&file, FileTime::from_system_time(future)).unwrap();

        let report = sweep_share(&layout, Duration::ZERO, SystemTime::now(), false).unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.retained_fresh, 1);
    }

    #[test]
    fn dry_run_reports_without_deleting() {
        let (_tmp, layout) = fixture();
        let old = layout.share_root().join("old.txt");
        fs::write(&old, "stale").unwrap();
        backdate(&old, 10);

        let report = sweep_share(&layout, WEEK, SystemTime::now(), true).unwrap();
        assert_eq!(report.deleted, vec![PathBuf::from("old.txt")]);
        assert!(old.exists());
    }

    #[test]
    fn sweeps_nested_trees_and_leaves_empty_dirs() {
        let (_tmp, layout) = fixture();
        let nested = layout.share_root().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let deep = nested.join("deep.txt");
        fs::write(&deep, "d").unwrap();
        backdate(&deep, 10);

        let report = sweep_share(&layout, WEEK, SystemTime::now(), false).unwrap();
        assert_eq!(report.deleted, vec![PathBuf::from("a/b/deep.txt")]);
        assert!(!deep.exists());
        // Directory pruning is not part of the retention contract.
        assert!(nested.is_dir());
    }

    #[test]
    fn missing_share_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let layout = ShareLayout::new(tmp.path().join("nonexistent")).unwrap();
        let err = sweep_share(&layout, WEEK, SystemTime::now(), false).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn lock_gained_after_scan_blocks_deletion() {
        // Simulates the lock-then-delete race by invoking the per-entry
        // logic with a stale snapshot: the file was unlocked when walked,
        // then locked before the sweep reached it.
        let (_tmp, layout) = fixture();
        let file = layout.share_root().join("raced.txt");
        fs::write(&file, "r").unwrap();
        backdate(&file, 10);

        let entry = TreeWalk::new(layout.share_root())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();

        // Lock after the walker observed the entry.
        lock::lock(&layout, Path::new("raced.txt")).unwrap();

        let mut report = SweepReport::default();
        sweep_entry(&layout, &entry, WEEK, SystemTime::now(), &mut report);

        // The scan-time check already sees the lock here; the important
        // property is that the file survives.
        assert!(report.deleted.is_empty());
        assert_eq!(report.retained_locked, 1);
        assert!(file.exists());
    }

    #[test]
    fn replaced_inode_is_skipped_as_race() {
        let (_tmp, layout) = fixture();
        let file = layout.share_root().join("swap.txt");
        fs::write(&file, "first").unwrap();
        backdate(&file, 10);

        let entry = TreeWalk::new(layout.share_root())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();

        // Replace the file (new inode) after the walker observed it.
        fs::remove_file(&file).unwrap();
        fs::write(&file, "second").unwrap();
        backdate(&file, 10);

        let mut report = SweepReport::default();
        sweep_entry(&layout, &entry, WEEK, SystemTime::now(), &mut report);

        assert_eq!(report.skipped_races, 1);
        assert!(file.exists());
    }

    #[test]
    fn vanished_entry_is_skipped_as_race() {
        let (_tmp, layout) = fixture();
        let file = layout.share_root().join("gone.txt");
        fs::write(&file, "g").unwrap();
        backdate(&file, 10);

        let entry = TreeWalk::new(layout.share_root())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();

        fs::remove_file(&file).unwrap();

        let mut report = SweepReport::default();
        sweep_entry(&layout, &entry, WEEK, SystemTime::now(), &mut report);

        assert_eq!(report.skipped_races, 1);
        assert!(report.failures.is_empty());
    }
}
