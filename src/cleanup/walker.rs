//! Iterative, race-tolerant directory walker.
//!
//! The walker is the "eyes" of cleanup: it yields every regular file under a
//! root together with the identity metadata (device, inode, link count) the
//! repair and retention phases decide on. The share tree is mutated
//! concurrently by SMB clients, so every observation is a snapshot and a
//! vanished entry is a normal outcome, never corruption.

use std::collections::VecDeque;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::core::errors::{Result, SwdError};

/// Snapshot of one regular file as observed at traversal time.
///
/// The underlying file may change after observation; destructive decisions
/// must re-verify against a fresh stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the walk root.
    pub rel_path: PathBuf,
    /// Absolute path.
    pub path: PathBuf,
    /// Device id at observation time.
    pub dev: u64,
    /// Inode number at observation time.
    pub ino: u64,
    /// Hardlink count at observation time.
    pub nlink: u64,
    /// Size in bytes at observation time.
    pub size: u64,
    /// Modification time at observation time.
    pub modified: SystemTime,
}

/// Iterative depth-first walk over all regular files under a root.
///
/// Guarantees:
/// - Finite and non-restartable; bounded memory via an explicit work stack.
/// - Entries within a directory are visited in lexicographic order; files
///   are yielded before subdirectories are entered.
/// - Symlinks are never followed.
/// - An entry that disappears between listing and stat is silently skipped.
/// - Other per-entry failures (permission, IO) are yielded as `Err` items;
///   the walk continues past them.
/// - A root that cannot be listed fails construction (fatal for the caller).
#[derive(Debug)]
pub struct TreeWalk {
    root: PathBuf,
    dirs: Vec<PathBuf>,
    queue: VecDeque<Result<FileEntry>>,
}

impl TreeWalk {
    /// Start a walk. Listing the root happens eagerly so an inaccessible
    /// root surfaces here instead of mid-iteration.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut walk = Self {
            root: root.clone(),
            dirs: Vec::new(),
            queue: VecDeque::new(),
        };
        let listing = fs::read_dir(&root).map_err(|source| SwdError::io(&root, source))?;
        walk.ingest_listing(listing);
        Ok(walk)
    }

    /// Process one directory listing: queue file entries in lexicographic
    /// order and push subdirectories (reversed, so the stack pops them in
    /// lexicographic order too).
    fn ingest_listing(&mut self, listing: fs::ReadDir) {
        let mut children: Vec<fs::DirEntry> = Vec::new();
        for entry in listing {
            match entry {
                Ok(entry) => children.push(entry),
                // A listing that fails mid-stream is reported once and the
                // rest of the directory is abandoned.
                Err(source) if source.kind() == ErrorKind::NotFound => {}
                Err(source) => self.queue.push_back(Err(SwdError::io(&self.root, source))),
            }
        }
        children.sort_by_key(fs::DirEntry::file_name);

        let mut subdirs: Vec<PathBuf> = Vec::new();
        for child in children {
            let path = child.path();
            // DirEntry::metadata does not traverse symlinks.
            let meta = match child.metadata() {
                Ok(meta) => meta,
                Err(source) if source.kind() == ErrorKind::NotFound => continue,
                Err(source) => {
                    self.queue.push_back(Err(SwdError::io(&path, source)));
                    continue;
                }
            };

            if meta.file_type().is_symlink() {
                continue;
            }
            if meta.is_dir() {
                subdirs.push(path);
                continue;
            }
            if !meta.is_file() {
                // Sockets, fifos, devices: not lockable, not reclaimable.
                continue;
            }

            match path.strip_prefix(&self.root) {
                Ok(rel) => self.queue.push_back(Ok(file_entry(rel, &path, &meta))),
                Err(_) => self.queue.push_back(Err(SwdError::InvalidPath {
                    path: path.clone(),
                    details: "walked entry outside walk root".to_string(),
                })),
            }
        }

        for dir in subdirs.into_iter().rev() {
            self.dirs.push(dir);
        }
    }
}

impl Iterator for TreeWalk {
    type Item = Result<FileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Some(item);
            }
            let dir = self.dirs.pop()?;
            match fs::read_dir(&dir) {
                Ok(listing) => self.ingest_listing(listing),
                // Directory vanished since it was listed: benign race.
                Err(source) if source.kind() == ErrorKind::NotFound => {}
                Err(source) => return Some(Err(SwdError::io(&dir, source))),
            }
        }
    }
}

fn file_entry(rel: &Path, path: &Path, meta: &fs::Metadata) -> FileEntry {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        FileEntry {
            rel_path: rel.to_path_buf(),
            path: path.to_path_buf(),
            dev: meta.dev(),
            ino: meta.ino(),
            nlink: meta.nlink(),
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }
    #[cfg(not(unix))]
    {
        FileEntry {
            rel_path: rel.to_path_buf(),
            path: path.to_path_buf(),
            dev: 0,
            ino: 0,
            nlink: 1,
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn collect_rel_paths(walk: TreeWalk) -> Vec<PathBuf> {
        walk.map(|item| item.unwrap().rel_path).collect()
    }

    #[test]
    fn yields_regular_files_only() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("a.txt"), "a").unwrap();
        fs::write(tmp.path().join("sub/b.txt"), "b").unwrap();

        let paths = collect_rel_paths(TreeWalk::new(tmp.path()).unwrap());
        assert_eq!(
            paths,
            vec![PathBuf::from("a.txt"), PathBuf::from("sub/b.txt")]
        );
    }

    #[test]
    fn order_is_lexicographic_files_before_subdirs() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("aa")).unwrap();
        fs::write(tmp.path().join("aa/deep.txt"), "d").unwrap();
        fs::write(tmp.path().join("bb.txt"), "b").unwrap();
        fs::write(tmp.path().join("ab.txt"), "a").unwrap();
        fs::create_dir_all(tmp.path().join("zz")).unwrap();
        fs::write(tmp.path().join("zz/last.txt"), "z").unwrap();

        let paths = collect_rel_paths(TreeWalk::new(tmp.path()).unwrap());
        assert_eq!(
            paths,
            vec![
                PathBuf::from("ab.txt"),
                PathBuf::from("bb.txt"),
                PathBuf::from("aa/deep.txt"),
                PathBuf::from("zz/last.txt"),
            ]
        );
    }

    #[test]
    fn captures_identity_metadata() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "data").unwrap();
        fs::hard_link(&file, tmp.path().join("b.txt")).unwrap();

        let entries: Vec<FileEntry> = TreeWalk::new(tmp.path())
            .unwrap()
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ino, entries[1].ino);
        assert_eq!(entries[0].dev, entries[1].dev);
        assert_eq!(entries[0].nlink, 2);
        assert_eq!(entries[0].size, 4);
    }

    #[cfg(unix)]
    #[test]
    fn never_follows_symlinks() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real");
        fs::create_dir_all(&real).unwrap();
        fs::write(real.join("inside.txt"), "x").unwrap();
        std::os::unix::fs::symlink(&real, tmp.path().join("link_dir")).unwrap();
        std::os::unix::fs::symlink(real.join("inside.txt"), tmp.path().join("link_file")).unwrap();

        let paths = collect_rel_paths(TreeWalk::new(tmp.path()).unwrap());
        assert_eq!(paths, vec![PathBuf::from("real/inside.txt")]);
    }

    #[test]
    fn empty_tree_yields_nothing() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(TreeWalk::new(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn unreadable_root_fails_construction() {
        let err = TreeWalk::new("/definitely/does/not/exist").unwrap_err();
        assert!(err.is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_per_entry_error() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let locked_dir = tmp.path().join("no_access");
        fs::create_dir_all(&locked_dir).unwrap();
        fs::write(locked_dir.join("hidden.txt"), "x").unwrap();
        fs::write(tmp.path().join("visible.txt"), "v").unwrap();
        fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o000)).unwrap();

        // Running as root bypasses permission bits; skip in that case.
        if fs::read_dir(&locked_dir).is_ok() {
            fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let results: Vec<Result<FileEntry>> = TreeWalk::new(tmp.path()).unwrap().collect();
        fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o755)).unwrap();

        let ok: Vec<&FileEntry> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        let errs: Vec<&SwdError> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].rel_path, PathBuf::from("visible.txt"));
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0], SwdError::PermissionDenied { .. }));
    }
}
