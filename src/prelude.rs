//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use share_warden::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, SwdError};

// Share model
pub use crate::share::discovery::{effective_shares, share_of, shares_from_smb_conf};
pub use crate::share::layout::ShareLayout;

// Locking
pub use crate::lock::manager::{LockOutcome, UnlockOutcome, lock, unlock};
pub use crate::lock::oracle::{is_locked, is_locked_ids};

// Cleanup
pub use crate::cleanup::repair::{RepairReport, repair_share};
pub use crate::cleanup::retention::{SweepReport, sweep_share};
pub use crate::cleanup::walker::{FileEntry, TreeWalk};
pub use crate::cleanup::{CleanupOptions, CleanupReport, run_cleanup};
