//! Two-phase cleanup: store→share consistency repair, then retention sweep.
//!
//! Phase 1 ([`repair::repair_share`]) walks the store and re-establishes
//! missing share-side hardlinks; it never deletes anything. Phase 2
//! ([`retention::sweep_share`]) walks the share and deletes unlocked files
//! strictly older than the retention threshold, re-verifying lock state
//! immediately before each deletion.

pub mod repair;
pub mod retention;
pub mod walker;

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::core::errors::{Result, SwdError};
use crate::share::ShareLayout;

pub use repair::RepairReport;
pub use retention::SweepReport;
pub use walker::{FileEntry, TreeWalk};

/// A per-entry failure collected during a walk or sweep.
///
/// Failures never abort the phase; they are aggregated and surfaced in the
/// final report so the command can exit non-zero while unaffected files are
/// still processed.
#[derive(Debug, Clone)]
pub struct EntryFailure {
    pub path: PathBuf,
    pub error: String,
    pub error_code: String,
    pub retryable: bool,
}

impl EntryFailure {
    pub(crate) fn new(path: impl Into<PathBuf>, error: &SwdError) -> Self {
        Self {
            path: path.into(),
            error: error.to_string(),
            error_code: error.code().to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Knobs for one cleanup invocation.
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    /// Minimum age an unlocked file must strictly exceed to be deleted.
    pub threshold: Duration,
    /// Report planned actions without touching the tree.
    pub dry_run: bool,
}

/// Merged result of both cleanup phases against one share.
#[derive(Debug, Clone)]
pub struct CleanupReport {
    pub share_root: PathBuf,
    pub repair: RepairReport,
    pub sweep: SweepReport,
}

impl CleanupReport {
    /// Whether anything went wrong that should drive a non-zero exit:
    /// per-entry failures in either phase, or unresolved lock conflicts.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.repair.failures.is_empty()
            || !self.repair.conflicts.is_empty()
            || !self.sweep.failures.is_empty()
    }
}

/// Run phase 1 then phase 2 against a share.
///
/// Lock state is never carried between the phases; phase 2 recomputes it at
/// point of use so concurrent external mutation cannot act on stale state.
pub fn run_cleanup(layout: &ShareLayout, options: &CleanupOptions) -> Result<CleanupReport> {
    let repair = repair::repair_share(layout, options.dry_run)?;
    let sweep = retention::sweep_share(layout, options.threshold, SystemTime::now(), options.dry_run)?;
    Ok(CleanupReport {
        share_root: layout.share_root().to_path_buf(),
        repair,
        sweep,
    })
}
