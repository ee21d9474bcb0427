//! Paths & Workspace: the fixed on-disk layout this runtime uses to track
//! containers across process invocations.
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::error::RuntimeError;

/// Fixed workspace root. Not configurable — unlike the bundle path or the
/// container id, the spec pins this to a single well-known location.
pub const WORKSPACE_ROOT: &str = "/run/gocon";

/// Rejects IDs that would escape the workspace root as a path component.
pub fn validate_container_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!(RuntimeError::InvalidArgument("container id must not be empty".to_string()));
    }
    if id.contains('/') || id.contains('\\') || id == "." || id == ".." {
        bail!(RuntimeError::InvalidArgument(format!(
            "container id {:?} is not a valid path component",
            id
        )));
    }
    Ok(())
}

pub fn container_dir(id: &str) -> PathBuf {
    Path::new(WORKSPACE_ROOT).join(id)
}

/// Creates the workspace root and the per-container directory. Fails if a
/// state file already exists for `id` (the caller's `AlreadyExists` check).
pub fn ensure_workspace(id: &str) -> Result<PathBuf> {
    validate_container_id(id)?;
    let root = Path::new(WORKSPACE_ROOT);
    if !root.exists() {
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create workspace root {:?}", root))?;
        fs::set_permissions(root, fs::Permissions::from_mode(0o744))
            .with_context(|| format!("failed to set permissions on {:?}", root))?;
    }

    let dir = container_dir(id);
    if crate::state::State::file_path(&dir).exists() {
        bail!(RuntimeError::AlreadyExists(id.to_string()));
    }
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {:?}", dir))?;
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o744))
        .with_context(|| format!("failed to set permissions on {:?}", dir))?;
    Ok(dir)
}

pub fn destroy(id: &str) -> Result<()> {
    let dir = container_dir(id);
    if dir.exists() {
        fs::remove_dir_all(&dir).with_context(|| format!("failed to remove {:?}", dir))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_separators() {
        assert!(validate_container_id("../etc").is_err());
        assert!(validate_container_id("a/b").is_err());
        assert!(validate_container_id("").is_err());
        assert!(validate_container_id("..").is_err());
        assert!(validate_container_id("my-container").is_ok());
    }

    #[test]
    fn container_dir_is_under_root() {
        assert_eq!(
            container_dir("abc"),
            PathBuf::from("/run/gocon/abc")
        );
    }
}
