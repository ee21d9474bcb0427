//! Mount & Rootfs Builder: applies the spec's mounts (with a `/proc` default
//! prepended) under the new mount namespace, then pivots into the bundle's
//! root filesystem and detaches the old one.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nix::mount::MsFlags;
use oci_spec::runtime::{Mount, MountBuilder, Root, Spec};

use crate::syscall::Syscall;

fn proc_default() -> Mount {
    MountBuilder::default()
        .destination(PathBuf::from("/proc"))
        .typ("proc")
        .source(PathBuf::from("/proc"))
        .build()
        .expect("well-formed default mount")
}

fn mount_flags(readonly_root: bool) -> MsFlags {
    let mut flags = MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV;
    if readonly_root {
        flags |= MsFlags::MS_RDONLY;
    }
    flags
}

/// Applies every mount in `[/proc] ++ spec.mounts` (in order) under
/// `root.path`, then pivots into it. Runs entirely inside the namespaced
/// child, after the new mount namespace has been entered.
pub fn prepare(spec: &Spec, syscall: &dyn Syscall) -> Result<()> {
    let root: Root = spec.root().clone().context("no root in spec")?;
    let readonly_root = root.readonly().unwrap_or(false);
    let root_path = root.path();

    bind_mount_self(root_path, syscall)
        .with_context(|| format!("failed to bind-mount {:?} onto itself", root_path))?;

    let mut mounts = vec![proc_default()];
    if let Some(spec_mounts) = spec.mounts().clone() {
        mounts.extend(spec_mounts);
    }

    let flags = mount_flags(readonly_root);
    for mount in &mounts {
        mount_one(root_path, mount, flags, syscall)
            .with_context(|| format!("failed to mount {:?}", mount.destination()))?;
    }

    pivot(root_path, syscall)
}

/// Bind-mounts `root_path` onto itself, recursively. `pivot_root` requires
/// its new-root argument to be a mount point; bundles whose rootfs lives on
/// the same filesystem as its parent otherwise fail with `EINVAL`.
fn bind_mount_self(root_path: &Path, syscall: &dyn Syscall) -> Result<()> {
    syscall.mount(
        Some(root_path),
        root_path,
        None,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None,
    )
}

fn mount_one(root_path: &Path, mount: &Mount, flags: MsFlags, syscall: &dyn Syscall) -> Result<()> {
    let dest = mount.destination();
    let rel = dest.strip_prefix("/").unwrap_or(dest);
    let destination = root_path.join(rel);
    syscall.mkdir(&destination)?;

    let source = mount.source().as_deref();
    let fstype = mount.typ().as_deref();

    syscall
        .mount(source, &destination, fstype, flags, None)
        .with_context(|| format!("failed to mount {:?} at {:?}", source, destination))
}

fn pivot(root_path: &Path, syscall: &dyn Syscall) -> Result<()> {
    syscall
        .pivot_rootfs(root_path)
        .with_context(|| format!("failed to pivot_root into {:?}", root_path))?;
    syscall.chdir(Path::new("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::TestHelperSyscall;
    use oci_spec::runtime::{RootBuilder, SpecBuilder};

    fn test_spec(mounts: Vec<Mount>) -> Spec {
        SpecBuilder::default()
            .root(
                RootBuilder::default()
                    .path(PathBuf::from("/tmp/rootfs"))
                    .readonly(false)
                    .build()
                    .unwrap(),
            )
            .mounts(mounts)
            .build()
            .unwrap()
    }

    #[test]
    fn proc_is_always_prepended() -> Result<()> {
        let extra = MountBuilder::default()
            .destination(PathBuf::from("/tmp/extra"))
            .typ("bind")
            .source(PathBuf::from("/tmp/extra"))
            .build()
            .unwrap();
        let spec = test_spec(vec![extra]);
        let syscall = TestHelperSyscall::default();
        prepare(&spec, &syscall)?;

        let mounted: Vec<_> = syscall
            .mount_args
            .borrow()
            .iter()
            .map(|(_, target, ..)| target.clone())
            .collect();
        assert_eq!(mounted[0], PathBuf::from("/tmp/rootfs"));
        assert_eq!(mounted[1], PathBuf::from("/tmp/rootfs/proc"));
        assert_eq!(mounted[2], PathBuf::from("/tmp/rootfs/tmp/extra"));
        Ok(())
    }

    #[test]
    fn root_is_bind_mounted_onto_itself_before_other_mounts() -> Result<()> {
        let spec = test_spec(vec![]);
        let syscall = TestHelperSyscall::default();
        prepare(&spec, &syscall)?;

        let (source, target, _, flags, _) = &syscall.mount_args.borrow()[0];
        assert_eq!(source.as_deref(), Some(Path::new("/tmp/rootfs")));
        assert_eq!(target, &PathBuf::from("/tmp/rootfs"));
        assert!(flags.contains(MsFlags::MS_BIND));
        assert!(flags.contains(MsFlags::MS_REC));
        Ok(())
    }

    #[test]
    fn mount_flags_include_nosuid_noexec_nodev() {
        let flags = mount_flags(false);
        assert!(flags.contains(MsFlags::MS_NOSUID));
        assert!(flags.contains(MsFlags::MS_NOEXEC));
        assert!(flags.contains(MsFlags::MS_NODEV));
        assert!(!flags.contains(MsFlags::MS_RDONLY));
    }

    #[test]
    fn readonly_root_marks_every_mount_readonly() {
        assert!(mount_flags(true).contains(MsFlags::MS_RDONLY));
    }
}
