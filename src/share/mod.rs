//! Share model: share↔store path layout and share discovery.
//!
//! A *share* is an externally writable directory tree exported over SMB. Its
//! *store* is the hidden sibling directory (same parent, name prefixed with a
//! dot) holding hardlinks that mark share files as locked. For share
//! `/mnt/foobar` the store is `/mnt/.foobar`.

pub mod discovery;
pub mod layout;

pub use discovery::{share_of, shares_from_smb_conf};
pub use layout::ShareLayout;
