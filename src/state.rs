//! Persisted container state and the status enum driving the lifecycle.
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Runtime status of a container, per the OCI state machine.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ContainerStatus {
    Creating,
    Created,
    Running,
    Stopped,
}

impl Default for ContainerStatus {
    fn default() -> Self {
        ContainerStatus::Creating
    }
}

impl ContainerStatus {
    pub fn can_start(&self) -> bool {
        matches!(self, ContainerStatus::Created)
    }

    pub fn can_kill(&self) -> bool {
        matches!(self, ContainerStatus::Created | ContainerStatus::Running)
    }

    /// `delete` is allowed from `Stopped`, and also from `Created` — a
    /// container that never reached `start` has nothing running to stop.
    pub fn can_delete(&self) -> bool {
        matches!(self, ContainerStatus::Stopped | ContainerStatus::Created)
    }
}

impl Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let print = match *self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", print)
    }
}

/// Stores the state information of the container. Matches the fields of the
/// OCI runtime `state` command's output, plus `pipe_fd` which is kept purely
/// in memory on the supervisor side and never serialized.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct State {
    pub oci_version: String,
    pub id: String,
    pub status: ContainerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    pub bundle: String,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip, default)]
    pub pipe_fd: Option<i32>,
}

impl State {
    const STATE_FILE_NAME: &'static str = "state.json";

    pub fn new(id: &str, bundle: &str) -> Self {
        Self {
            oci_version: "1.0.2".to_string(),
            id: id.to_string(),
            status: ContainerStatus::Creating,
            pid: None,
            bundle: bundle.to_string(),
            annotations: HashMap::default(),
            created: None,
            pipe_fd: None,
        }
    }

    pub fn file_path(container_root: &Path) -> PathBuf {
        container_root.join(Self::STATE_FILE_NAME)
    }

    /// Writes the state as `state.json.tmp` then renames over `state.json`,
    /// so a concurrent reader never observes a partially written file.
    pub fn save(&self, container_root: &Path) -> Result<()> {
        let final_path = Self::file_path(container_root);
        let tmp_path = container_root.join("state.json.tmp");
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open {:?}", tmp_path))?;
        serde_json::to_writer(&file, self)
            .with_context(|| format!("failed to write state to {:?}", tmp_path))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {:?}", tmp_path))?;
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("failed to rename {:?} to {:?}", tmp_path, final_path))?;
        Ok(())
    }

    pub fn load(container_root: &Path) -> Result<Self> {
        let state_file_path = Self::file_path(container_root);
        let file = File::open(&state_file_path)
            .with_context(|| format!("failed to open container state file {:?}", state_file_path))?;
        let state: Self = serde_json::from_reader(&file)
            .with_context(|| format!("failed to parse container state file {:?}", state_file_path))?;
        Ok(state)
    }

    /// Reconciles `status` against the live process table: a `running` or
    /// `created` container whose pid is dead or zombied is really `stopped`.
    /// `kill` intentionally does not update status itself (§4.6), so this is
    /// the only place that observes the process's real liveness.
    pub fn refresh_status(mut self) -> Result<Self> {
        if matches!(self.status, ContainerStatus::Stopped) {
            return Ok(self);
        }
        let pid = match self.pid {
            Some(pid) => pid,
            None => return Ok(self),
        };
        use procfs::process::ProcState;
        let dead = match procfs::process::Process::new(pid) {
            Ok(proc) => matches!(
                proc.stat.state(),
                Ok(ProcState::Zombie) | Ok(ProcState::Dead)
            ),
            Err(_) => true,
        };
        if dead {
            self.status = ContainerStatus::Stopped;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips() -> Result<()> {
        let dir = tempdir()?;
        let mut state = State::new("abc", "/bundle");
        state.status = ContainerStatus::Created;
        state.pid = Some(42);
        state.annotations.insert("k".into(), "v".into());
        state.save(dir.path())?;

        let loaded = State::load(dir.path())?;
        assert_eq!(loaded.id, "abc");
        assert_eq!(loaded.status, ContainerStatus::Created);
        assert_eq!(loaded.pid, Some(42));
        assert_eq!(loaded.pipe_fd, None);
        Ok(())
    }

    #[test]
    fn pipe_fd_is_not_serialized() {
        let mut state = State::new("abc", "/bundle");
        state.pipe_fd = Some(7);
        let json = serde_json::to_string(&state).unwrap();
        assert!(!json.contains("pipeFd"));
        assert!(!json.contains('7'));
    }

    #[test]
    fn status_transitions() {
        assert!(ContainerStatus::Created.can_start());
        assert!(!ContainerStatus::Stopped.can_start());
        assert!(ContainerStatus::Running.can_kill());
        assert!(!ContainerStatus::Creating.can_kill());
        assert!(ContainerStatus::Stopped.can_delete());
        assert!(ContainerStatus::Created.can_delete());
        assert!(!ContainerStatus::Running.can_delete());
    }
}
