//! Share discovery: smb.conf harvesting and share-of-path resolution.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::core::config::Config;
use crate::core::errors::{Result, SwdError};
use crate::core::paths::resolve_absolute_path;

fn path_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^[^#]*path\s*=\s*"(.*)""#).expect("static regex"))
}

fn protected_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#.*protected").expect("static regex"))
}

/// Extract share roots from a Samba configuration file.
///
/// A share is any `path = "..."` line; lines carrying a `# protected` marker
/// comment are administratively excluded from warden management.
pub fn shares_from_smb_conf(conf: &Path) -> Result<Vec<PathBuf>> {
    let raw = fs::read_to_string(conf).map_err(|source| SwdError::io(conf, source))?;
    let mut roots = Vec::new();
    for line in raw.lines() {
        let Some(captures) = path_line().captures(line) else {
            continue;
        };
        if protected_marker().is_match(line) {
            continue;
        }
        roots.push(PathBuf::from(&captures[1]));
    }
    Ok(roots)
}

/// Effective share set: configured roots plus smb.conf discovery when enabled.
///
/// A missing or unreadable smb.conf is only an error when no explicit roots
/// are configured; otherwise the explicit roots win silently.
pub fn effective_shares(config: &Config) -> Result<Vec<PathBuf>> {
    let mut roots = config.shares.roots.clone();
    if config.shares.use_smb_conf {
        match shares_from_smb_conf(&config.shares.smb_conf) {
            Ok(discovered) => {
                for root in discovered {
                    if !roots.contains(&root) {
                        roots.push(root);
                    }
                }
            }
            Err(err) if !roots.is_empty() => {
                let _ = err;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(roots)
}

/// Find which share root contains `path`, returning the root and the
/// share-relative remainder.
///
/// `path` is resolved to an absolute normalized form first, so callers may
/// pass what the user typed. Longest matching root wins so nested share
/// definitions resolve to the innermost share.
pub fn share_of(path: &Path, roots: &[PathBuf]) -> Option<(PathBuf, PathBuf)> {
    let absolute = resolve_absolute_path(path);
    let mut best: Option<&PathBuf> = None;
    for root in roots {
        if absolute.strip_prefix(root).is_ok()
            && best.is_none_or(|b| root.components().count() > b.components().count())
        {
            best = Some(root);
        }
    }
    let root = best?;
    let rel = absolute.strip_prefix(root).ok()?.to_path_buf();
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some((root.clone(), rel))
}
