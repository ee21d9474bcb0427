//! The kernel-facing seam. Everything the Mount & Rootfs Builder and the
//! Process Launcher need from the kernel goes through this trait, so the
//! logic above it can be exercised against a recording test double instead
//! of a real container environment.
use std::any::Any;
use std::path::Path;

use anyhow::Result;
use nix::mount::MsFlags;
use nix::unistd::{Gid, Uid};

pub trait Syscall {
    fn as_any(&self) -> &dyn Any;
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()>;
    fn pivot_rootfs(&self, path: &Path) -> Result<()>;
    fn chdir(&self, path: &Path) -> Result<()>;
    fn sethostname(&self, hostname: &str) -> Result<()>;
    fn mkdir(&self, path: &Path) -> Result<()>;
    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;
}

pub fn create_syscall() -> Box<dyn Syscall> {
    Box::new(LinuxSyscall)
}

#[derive(Clone)]
pub struct LinuxSyscall;

impl Syscall for LinuxSyscall {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        nix::mount::mount(source, target, fstype, flags, data)?;
        Ok(())
    }

    /// Bind-mounts the new root onto itself, then pivots into it and
    /// detaches the old root. Same approach as pivoting in place: giving
    /// the same path as both arguments of `pivot_root` stacks the old root
    /// on top of the new one at the same mount point, so the subsequent
    /// `umount2` unmounts the original root with no need for a temporary
    /// directory to stash it under.
    fn pivot_rootfs(&self, path: &Path) -> Result<()> {
        use nix::fcntl::{open, OFlag};
        use nix::sys::stat::Mode;
        use nix::unistd::{fchdir, pivot_root};

        let newroot = open(path, OFlag::O_DIRECTORY | OFlag::O_RDONLY, Mode::empty())?;
        pivot_root(path, path)?;
        nix::mount::umount2("/", nix::mount::MntFlags::MNT_DETACH)?;
        fchdir(newroot)?;
        nix::unistd::close(newroot).ok();
        Ok(())
    }

    fn chdir(&self, path: &Path) -> Result<()> {
        nix::unistd::chdir(path)?;
        Ok(())
    }

    fn sethostname(&self, hostname: &str) -> Result<()> {
        nix::unistd::sethostname(hostname)?;
        Ok(())
    }

    fn mkdir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        std::fs::write(path, contents)?;
        Ok(())
    }
}

pub fn write_id_mapping(pid: nix::unistd::Pid, uid: Uid, gid: Gid) -> Result<()> {
    std::fs::write(format!("/proc/{}/setgroups", pid), "deny")?;
    std::fs::write(
        format!("/proc/{}/uid_map", pid),
        format!("0 {} 1", uid),
    )?;
    std::fs::write(
        format!("/proc/{}/gid_map", pid),
        format!("0 {} 1", gid),
    )?;
    Ok(())
}

#[cfg(test)]
pub mod test {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    /// Records calls instead of touching the kernel, mirroring the
    /// teacher's `TestHelperSyscall` double.
    #[derive(Default)]
    pub struct TestHelperSyscall {
        pub mount_args: RefCell<Vec<(Option<PathBuf>, PathBuf, Option<String>, MsFlags, Option<String>)>>,
        pub pivoted: RefCell<Vec<PathBuf>>,
        pub hostname: RefCell<Option<String>>,
        pub mkdirs: RefCell<Vec<PathBuf>>,
        pub written_files: RefCell<Vec<(PathBuf, String)>>,
    }

    impl Syscall for TestHelperSyscall {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn mount(
            &self,
            source: Option<&Path>,
            target: &Path,
            fstype: Option<&str>,
            flags: MsFlags,
            data: Option<&str>,
        ) -> Result<()> {
            self.mount_args.borrow_mut().push((
                source.map(|p| p.to_path_buf()),
                target.to_path_buf(),
                fstype.map(|s| s.to_string()),
                flags,
                data.map(|s| s.to_string()),
            ));
            Ok(())
        }

        fn pivot_rootfs(&self, path: &Path) -> Result<()> {
            self.pivoted.borrow_mut().push(path.to_path_buf());
            Ok(())
        }

        fn chdir(&self, _path: &Path) -> Result<()> {
            Ok(())
        }

        fn sethostname(&self, hostname: &str) -> Result<()> {
            *self.hostname.borrow_mut() = Some(hostname.to_string());
            Ok(())
        }

        fn mkdir(&self, path: &Path) -> Result<()> {
            self.mkdirs.borrow_mut().push(path.to_path_buf());
            Ok(())
        }

        fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
            self.written_files
                .borrow_mut()
                .push((path.to_path_buf(), contents.to_string()));
            Ok(())
        }
    }
}
