//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SwdError};

/// Full swd configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub shares: SharesConfig,
    pub retention: RetentionConfig,
    pub cleanup: CleanupConfig,
    pub paths: PathsConfig,
}

/// Which share roots swd operates on and how they are discovered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SharesConfig {
    /// Explicitly configured share roots.
    pub roots: Vec<PathBuf>,
    /// Samba configuration file to harvest additional share roots from.
    pub smb_conf: PathBuf,
    /// Whether smb.conf discovery is consulted at all.
    pub use_smb_conf: bool,
}

/// Retention threshold for unlocked files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetentionConfig {
    /// Days component of the retention threshold.
    pub days: u64,
    /// Minutes component, added to the days.
    pub minutes: u64,
}

impl RetentionConfig {
    /// Combined threshold age. A file must be strictly older to be deleted.
    #[must_use]
    pub const fn threshold(&self) -> Duration {
        Duration::from_secs(self.days * 86_400 + self.minutes * 60)
    }
}

/// Cleanup behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CleanupConfig {
    /// Report what would be restored/deleted without touching the tree.
    pub dry_run: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self { dry_run: false }
    }
}

/// Filesystem paths used by swd itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// JSONL activity log; empty path disables file logging.
    pub jsonl_log: PathBuf,
}

impl Default for SharesConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            smb_conf: PathBuf::from("/etc/samba/smb.conf"),
            use_smb_conf: true,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: 7,
            minutes: 0,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        let data_dir = home_dir.join(".local").join("share").join("swd");
        Self {
            config_file: home_dir.join(".config").join("swd").join("config.toml"),
            jsonl_log: data_dir.join("activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path;
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| SwdError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(SwdError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // shares
        if let Some(raw) = env_var("SWD_SHARES_SMB_CONF") {
            self.shares.smb_conf = PathBuf::from(raw);
        }
        set_env_bool("SWD_SHARES_USE_SMB_CONF", &mut self.shares.use_smb_conf)?;
        if let Some(raw) = env_var("SWD_SHARES_ROOTS") {
            self.shares.roots = raw.split(':').map(PathBuf::from).collect();
        }

        // retention
        set_env_u64("SWD_RETENTION_DAYS", &mut self.retention.days)?;
        set_env_u64("SWD_RETENTION_MINUTES", &mut self.retention.minutes)?;

        // cleanup
        set_env_bool("SWD_CLEANUP_DRY_RUN", &mut self.cleanup.dry_run)?;

        // paths
        if let Some(raw) = env_var("SWD_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    /// Strip trailing slashes so path comparisons stay consistent.
    fn normalize_paths(&mut self) {
        for path in &mut self.shares.roots {
            let s = path.to_string_lossy();
            if s.len() > 1
                && let Some(stripped) = s.strip_suffix('/')
            {
                *path = PathBuf::from(stripped);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        for root in &self.shares.roots {
            if !root.is_absolute() {
                return Err(SwdError::InvalidConfig {
                    details: format!("shares.roots entries must be absolute, got {root:?}"),
                });
            }
        }
        if self.shares.roots.is_empty() && !self.shares.use_smb_conf {
            return Err(SwdError::InvalidConfig {
                details: "no share roots configured and smb.conf discovery disabled".to_string(),
            });
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| SwdError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<bool>().map_err(|error| SwdError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_retention_is_seven_days() {
        let cfg = Config::default();
        assert_eq!(cfg.retention.threshold(), Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn threshold_combines_days_and_minutes() {
        let retention = RetentionConfig {
            days: 1,
            minutes: 30,
        };
        assert_eq!(
            retention.threshold(),
            Duration::from_secs(86_400 + 30 * 60)
        );
    }

    #[test]
    fn parses_full_toml() {
        let raw = r#"
            [shares]
            roots = ["/mnt/foobar", "/mnt/media/"]
            use_smb_conf = false
            smb_conf = "/etc/samba/smb.conf"

            [retention]
            days = 14
            minutes = 15

            [cleanup]
            dry_run = true
        "#;
        let mut cfg: Config = toml::from_str(raw).unwrap();
        cfg.normalize_paths();
        assert_eq!(cfg.retention.days, 14);
        assert_eq!(cfg.retention.minutes, 15);
        assert!(cfg.cleanup.dry_run);
        assert_eq!(cfg.shares.roots[1], PathBuf::from("/mnt/media"));
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg: Config = toml::from_str("[retention]\ndays = 3\n").unwrap();
        assert_eq!(cfg.retention.days, 3);
        assert_eq!(cfg.retention.minutes, 0);
        assert!(cfg.shares.use_smb_conf);
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, SwdError::MissingConfig { .. }));
    }

    #[test]
    fn rejects_relative_share_roots() {
        let mut cfg = Config::default();
        cfg.shares.roots.push(PathBuf::from("relative/share"));
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, SwdError::InvalidConfig { .. }));
    }

    #[test]
    fn rejects_empty_share_sources() {
        let mut cfg = Config::default();
        cfg.shares.use_smb_conf = false;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, SwdError::InvalidConfig { .. }));
    }

    #[test]
    fn loads_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retention]\ndays = 2\nminutes = 5\n").unwrap();

        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.retention.days, 2);
        assert_eq!(cfg.retention.minutes, 5);
        assert_eq!(cfg.paths.config_file, path);
    }
}
