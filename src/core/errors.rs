//! SWD-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SwdError>;

/// Top-level error type for Share Warden.
#[derive(Debug, Error)]
pub enum SwdError {
    #[error("[SWD-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SWD-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SWD-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SWD-2001] invalid path {path}: {details}")]
    InvalidPath { path: PathBuf, details: String },

    #[error("[SWD-2002] not found: {path}")]
    NotFound { path: PathBuf },

    #[error("[SWD-2003] lock conflict at {path}: share and store hold different inodes")]
    LockConflict { path: PathBuf },

    #[error("[SWD-2004] cross-device link for {path}: share and store must be on one filesystem")]
    CrossDevice { path: PathBuf },

    #[error("[SWD-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SWD-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[SWD-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SWD-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SwdError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SWD-1001",
            Self::MissingConfig { .. } => "SWD-1002",
            Self::ConfigParse { .. } => "SWD-1003",
            Self::InvalidPath { .. } => "SWD-2001",
            Self::NotFound { .. } => "SWD-2002",
            Self::LockConflict { .. } => "SWD-2003",
            Self::CrossDevice { .. } => "SWD-2004",
            Self::Serialization { .. } => "SWD-2101",
            Self::PermissionDenied { .. } => "SWD-3001",
            Self::Io { .. } => "SWD-3002",
            Self::Runtime { .. } => "SWD-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Runtime { .. })
    }

    /// Whether the underlying cause is a vanished filesystem entry.
    ///
    /// Callers racing with external SMB clients treat these as benign skips.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classify an IO error against a known path.
    ///
    /// `NotFound`, `PermissionDenied`, and `EXDEV` get first-class variants
    /// so callers can branch on kind without inspecting errno themselves.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            ErrorKind::NotFound => Self::NotFound { path },
            ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => {
                #[cfg(unix)]
                if source.raw_os_error() == Some(libc::EXDEV) {
                    return Self::CrossDevice { path };
                }
                Self::Io { path, source }
            }
        }
    }
}

impl From<serde_json::Error> for SwdError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SwdError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
