//! Cgroup Writer: resolves the cpu-subsystem cgroup directory for a
//! container and writes the resource knobs from the OCI spec into it.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use oci_spec::runtime::{Linux, LinuxCpu};

const CGROUP_CPU_ROOT: &str = "/sys/fs/cgroup/cpu";

/// Resolves the effective cpu cgroup directory for `id` given the spec's
/// `linux.cgroupsPath`, per the three cases:
/// - empty -> `/sys/fs/cgroup/cpu/gocon/<id>`
/// - absolute -> `/sys/fs/cgroup/cpu<cgroupsPath>`
/// - relative -> `/sys/fs/cgroup/cpu/gocon/<id>/<cgroupsPath>`
pub fn resolve_cgroup_path(id: &str, cgroups_path: Option<&Path>) -> PathBuf {
    let root = Path::new(CGROUP_CPU_ROOT);
    match cgroups_path {
        None => root.join("gocon").join(id),
        Some(p) if p.as_os_str().is_empty() => root.join("gocon").join(id),
        Some(p) if p.is_absolute() => {
            let relative = p.strip_prefix("/").unwrap_or(p);
            root.join(relative)
        }
        Some(p) => root.join("gocon").join(id).join(p),
    }
}

/// Creates the cgroup directory, writes the configured cpu knobs, and joins
/// the current task (the init child, at this point) to the cgroup.
pub fn apply(id: &str, linux: &Linux) -> Result<PathBuf> {
    let cgroups_path = linux.cgroups_path().as_deref();
    let dir = resolve_cgroup_path(id, cgroups_path);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create cgroup dir {:?}", dir))?;

    if let Some(resources) = linux.resources() {
        if let Some(cpu) = resources.cpu() {
            write_cpu(&dir, cpu)?;
        }
    }

    join_tasks(&dir, nix::unistd::getpid().as_raw())?;
    Ok(dir)
}

fn write_cpu(dir: &Path, cpu: &LinuxCpu) -> Result<()> {
    if let Some(shares) = cpu.shares() {
        write_knob(dir, "cpu.shares", shares)?;
    }
    if let Some(quota) = cpu.quota() {
        write_knob(dir, "cpu.cfs_quota_us", quota)?;
    }
    if let Some(period) = cpu.period() {
        write_knob(dir, "cpu.cfs_period_us", period)?;
    }
    if let Some(rt_runtime) = cpu.realtime_runtime() {
        write_knob(dir, "cpu.rt_runtime_us", rt_runtime)?;
    }
    if let Some(rt_period) = cpu.realtime_period() {
        write_knob(dir, "cpu.rt_period_us", rt_period)?;
    }
    Ok(())
}

fn write_knob<T: std::fmt::Display>(dir: &Path, file: &str, value: T) -> Result<()> {
    let path = dir.join(file);
    fs::write(&path, format!("{}", value)).with_context(|| format!("failed to write {:?}", path))
}

fn join_tasks(dir: &Path, pid: i32) -> Result<()> {
    let tasks = dir.join("tasks");
    fs::write(&tasks, format!("{}", pid)).with_context(|| format!("failed to write {:?}", tasks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cgroups_path_uses_default_layout() {
        assert_eq!(
            resolve_cgroup_path("abc", None),
            PathBuf::from("/sys/fs/cgroup/cpu/gocon/abc")
        );
        assert_eq!(
            resolve_cgroup_path("abc", Some(Path::new(""))),
            PathBuf::from("/sys/fs/cgroup/cpu/gocon/abc")
        );
    }

    #[test]
    fn absolute_cgroups_path_is_rooted_under_cpu_hierarchy() {
        assert_eq!(
            resolve_cgroup_path("abc", Some(Path::new("/custom/slice"))),
            PathBuf::from("/sys/fs/cgroup/cpu/custom/slice")
        );
    }

    #[test]
    fn relative_cgroups_path_nests_under_the_container() {
        assert_eq!(
            resolve_cgroup_path("abc", Some(Path::new("custom/slice"))),
            PathBuf::from("/sys/fs/cgroup/cpu/gocon/abc/custom/slice")
        );
    }
}
