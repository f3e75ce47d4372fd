#![forbid(unsafe_code)]

//! Share Warden (swd) — hardlink-based lock keeper and retention cleaner for
//! SMB share trees.
//!
//! A share's hidden sibling directory (the *store*) holds hardlinks that mark
//! files as locked; lock state is derived from filesystem identity (device,
//! inode), never stored separately. Two-phase cleanup repairs store→share
//! divergence and then deletes unlocked files past a retention age, staying
//! safe while SMB clients concurrently mutate the tree.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use share_warden::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use share_warden::share::ShareLayout;
//! use share_warden::cleanup::{CleanupOptions, run_cleanup};
//! ```

pub mod prelude;

pub mod cleanup;
pub mod core;
pub mod lock;
pub mod logger;
pub mod share;
