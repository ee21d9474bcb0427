//! Lifecycle Controller: stitches the workspace, spec loader, cgroup writer,
//! rootfs builder, process launcher and FIFO barrier together into the
//! `create`/`start`/`kill`/`delete`/`state`/`init` state machine.
use std::os::unix::io::RawFd;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::error::RuntimeError;
use crate::state::{ContainerStatus, State};
use crate::{cgroup, fifo, launcher, rootfs, spec as spec_loader, syscall, workspace};

/// `create <id> <bundle>`: validates the id, stakes out the workspace,
/// clones the namespaced init child and waits for it to report `created`.
pub fn create(id: &str, bundle: &Path) -> Result<()> {
    let bundle = bundle
        .canonicalize()
        .with_context(|| format!("bundle path {:?} does not exist", bundle))?;

    let dir = workspace::ensure_workspace(id)?;
    let state = State::new(id, &bundle.to_string_lossy());
    state.save(&dir)?;

    fifo::create(&dir)?;

    let pid = launcher::spawn_init_child(id, &bundle)
        .with_context(|| format!("failed to launch container process for {}", id))?;

    // Reload rather than reuse the in-memory copy above: by the time
    // `spawn_init_child` returns, the child has already saved `status =
    // created` with `ociVersion`/`annotations` populated from the spec, and
    // writing the stale copy back out here would clobber that.
    let mut state = State::load(&dir)?;
    state.pid = Some(pid.as_raw());
    state.status = ContainerStatus::Created;
    state.created = Some(Utc::now());
    state.save(&dir)?;

    Ok(())
}

/// `init <id> <bundle> <ready-fd>`: executed inside the namespaced child.
/// Prepares the container (hostname, mounts, cgroup, pivot_root), saves
/// `created`, signals readiness, blocks on the FIFO, then execs the user
/// process.
pub fn init(id: &str, bundle: &Path, ready_fd: RawFd) -> Result<()> {
    workspace::validate_container_id(id)?;
    let dir = workspace::container_dir(id);
    let mut state = State::load(&dir)?;
    if state.status != ContainerStatus::Creating {
        bail!(RuntimeError::InvalidState {
            id: id.to_string(),
            status: state.status.to_string(),
            op: "init"
        });
    }

    let spec = spec_loader::load(bundle)?;
    let syscall = syscall::create_syscall();

    if let Some(hostname) = spec.hostname().clone() {
        if !hostname.is_empty() {
            syscall.sethostname(&hostname)?;
        }
    }

    if let Some(linux) = spec.linux().clone() {
        cgroup::apply(id, &linux).context("failed to apply cgroup limits")?;
    }

    rootfs::prepare(&spec, syscall.as_ref()).context("failed to prepare rootfs")?;

    state.oci_version = spec.version().clone();
    state.annotations = spec.annotations().clone().unwrap_or_default();
    state.status = ContainerStatus::Created;
    state.save(&dir)?;

    launcher::signal_ready(ready_fd)?;

    fifo::block_until_released(&dir).context("failed waiting on start barrier")?;

    // Reload from disk: the supervisor wrote `pid` into `state.json` after
    // this process's in-memory copy was loaded at the top of this function,
    // so saving that stale copy here would blank the pid back out.
    let mut state = State::load(&dir)?;
    state.status = ContainerStatus::Running;
    state.save(&dir)?;

    let process = spec
        .process()
        .clone()
        .context("no process in spec")?;
    let args = process.args().clone().context("no args in spec process")?;
    let env = process.env().clone().unwrap_or_default();
    launcher::exec_process(&args, &env)
}

/// `start <id>`: releases the FIFO barrier, unblocking the init child's exec.
pub fn start(id: &str) -> Result<()> {
    workspace::validate_container_id(id)?;
    let dir = workspace::container_dir(id);
    if !dir.exists() {
        bail!(RuntimeError::NotFound(id.to_string()));
    }
    let state = State::load(&dir)?.refresh_status()?;
    if !state.status.can_start() {
        bail!(RuntimeError::InvalidState {
            id: id.to_string(),
            status: state.status.to_string(),
            op: "start"
        });
    }

    fifo::release(&dir)
}

/// `kill <id> [signal]`: delivers a signal to the init child's pid. Does not
/// update `status`; `state`/`delete` reconcile status against the live
/// process on next observation.
pub fn kill(id: &str, sig: Signal) -> Result<()> {
    workspace::validate_container_id(id)?;
    let dir = workspace::container_dir(id);
    if !dir.exists() {
        bail!(RuntimeError::NotFound(id.to_string()));
    }
    let state = State::load(&dir)?.refresh_status()?;
    if !state.status.can_kill() {
        bail!(RuntimeError::InvalidState {
            id: id.to_string(),
            status: state.status.to_string(),
            op: "kill"
        });
    }
    let pid = state.pid.context("container has no pid")?;
    signal::kill(Pid::from_raw(pid), sig).context("failed to send signal")?;
    Ok(())
}

/// `delete <id>`: allowed from `stopped` or `created`; removes the cgroup
/// (best-effort) and the workspace directory.
pub fn delete(id: &str) -> Result<()> {
    workspace::validate_container_id(id)?;
    let dir = workspace::container_dir(id);
    if !dir.exists() {
        bail!(RuntimeError::NotFound(id.to_string()));
    }
    let state = State::load(&dir)?.refresh_status()?;
    if !state.status.can_delete() {
        bail!(RuntimeError::InvalidState {
            id: id.to_string(),
            status: state.status.to_string(),
            op: "delete"
        });
    }

    if let Ok(spec) = spec_loader::load(Path::new(&state.bundle)) {
        if let Some(linux) = spec.linux().clone() {
            let cgroups_path = linux.cgroups_path().as_deref();
            let cgroup_dir = cgroup::resolve_cgroup_path(id, cgroups_path);
            let _ = std::fs::remove_dir(cgroup_dir);
        }
    }

    workspace::destroy(id)
}

/// `state <id>`: loads and reconciles state, returning it for the command
/// surface to serialize.
pub fn state(id: &str) -> Result<State> {
    workspace::validate_container_id(id)?;
    let dir = workspace::container_dir(id);
    if !dir.exists() {
        bail!(RuntimeError::NotFound(id.to_string()));
    }
    State::load(&dir)?.refresh_status()
}
