//! Lock state derivation and lock/unlock side effects.
//!
//! A share file is locked iff its store counterpart exists as a regular file
//! on the same (device, inode). Lock state is never cached or persisted
//! anywhere else; the filesystem is the single source of truth.

pub mod manager;
pub mod oracle;

pub use manager::{LockOutcome, UnlockOutcome, lock, unlock};
pub use oracle::{is_locked, is_locked_ids};
