//! Process Launcher: re-execs the runtime binary under a fresh set of Linux
//! namespaces and, on the child side, execs the user-specified process.
//!
//! Namespace entry uses raw `clone(2)` with every namespace flag set on the
//! call itself, not `fork` followed by `unshare`: `CLONE_NEWPID` only takes
//! effect for a process created with that flag, so a process that unshares
//! its own PID namespace after the fact never becomes PID 1 there — only
//! its own subsequent children would. Re-execing `/proc/self/exe init <id>`
//! as the very process created by `clone` is what makes it the namespace's
//! init.
use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::ptr;

use anyhow::{bail, Context, Result};
use nix::sched::{self, CloneFlags};
use nix::sys::mman;
use nix::unistd::{close, pipe, read, write, Gid, Pid, Uid};

use crate::syscall;

/// Namespaces entered by every container: independent IPC, network, mount,
/// pid, user and uts namespaces, with an identity uid/gid map so the
/// container's root maps onto the invoking user.
fn namespace_flags() -> CloneFlags {
    CloneFlags::CLONE_NEWIPC
        | CloneFlags::CLONE_NEWNET
        | CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWUSER
        | CloneFlags::CLONE_NEWUTS
}

/// Clones the init child, waits for it to request (and then have written)
/// its identity id-mapping, and waits for it to signal that preparation
/// (mounts, cgroup, pivot_root, `status=created`) is complete.
///
/// Returns the child's host-visible pid once it has reached that point.
pub fn spawn_init_child(id: &str, bundle: &Path) -> Result<Pid> {
    let (map_req_r, map_req_w) = pipe().context("failed to create mapping-request pipe")?;
    let (map_ack_r, map_ack_w) = pipe().context("failed to create mapping-ack pipe")?;
    let (ready_r, ready_w) = pipe().context("failed to create readiness pipe")?;

    let id = id.to_string();
    let bundle_path = bundle.to_path_buf();
    let callback: sched::CloneCb = Box::new(move || {
        close(map_req_r).ok();
        close(map_ack_w).ok();
        close(ready_r).ok();

        if write(map_req_w, &[0u8]).is_err() {
            return -1;
        }
        close(map_req_w).ok();

        let mut ack = [0u8; 1];
        if read(map_ack_r, &mut ack).is_err() {
            return -1;
        }
        close(map_ack_r).ok();

        let exe = CString::new("/proc/self/exe").unwrap();
        let args: Vec<CString> = vec![
            exe.clone(),
            CString::new("init").unwrap(),
            CString::new(id.clone()).unwrap(),
            CString::new(bundle_path.to_string_lossy().into_owned()).unwrap(),
            CString::new(ready_w.to_string()).unwrap(),
        ];
        match nix::unistd::execvp(&exe, &args) {
            Ok(_) => 0,
            Err(_) => -1,
        }
    });

    let pid = raw_clone(callback, namespace_flags())?;

    close(map_req_w).ok();
    close(map_ack_r).ok();
    close(ready_w).ok();

    let mut req = [0u8; 1];
    read(map_req_r, &mut req).context("failed to read mapping request from child")?;
    close(map_req_r).ok();

    syscall::write_id_mapping(pid, Uid::from_raw(nix::unistd::getuid().as_raw()), Gid::from_raw(nix::unistd::getgid().as_raw()))
        .context("failed to write uid/gid mapping")?;
    write(map_ack_w, &[0u8]).context("failed to ack mapping")?;
    close(map_ack_w).ok();

    let mut ready = [0u8; 1];
    read(ready_r, &mut ready).context("failed waiting for child readiness")?;
    close(ready_r).ok();

    Ok(pid)
}

/// Called from inside the init child once it has finished preparing the
/// container, to unblock `spawn_init_child`'s wait above.
pub fn signal_ready(ready_fd: RawFd) -> Result<()> {
    write(ready_fd, &[0u8]).context("failed to signal readiness")?;
    close(ready_fd).ok();
    Ok(())
}

/// Resolves `args[0]` via `PATH` and replaces the current process image.
/// No shell interposition.
pub fn exec_process(args: &[String], env: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("empty process args");
    }
    let path = CString::new(args[0].clone())?;
    let argv: Vec<CString> = args.iter().map(|a| CString::new(a.as_str()).unwrap()).collect();
    let envp: Vec<CString> = env.iter().map(|e| CString::new(e.as_str()).unwrap()).collect();
    nix::unistd::execvpe(&path, &argv, &envp)?;
    unreachable!("execvpe replaces the process image on success")
}

/// Raw `clone(2)` with an mmap'd stack and a guard page, needed because
/// entering `CLONE_NEWPID` must happen at process-creation time and
/// `nix::sched::clone`'s own wrapper does not expose enough control over the
/// child's stack for this use.
fn raw_clone(mut cb: sched::CloneCb, flags: CloneFlags) -> Result<Pid> {
    use nix::errno::Errno;

    extern "C" fn callback(data: *mut sched::CloneCb) -> libc::c_int {
        let cb: &mut sched::CloneCb = unsafe { &mut *data };
        (*cb)() as libc::c_int
    }

    let page_size: usize = unsafe {
        match libc::sysconf(libc::_SC_PAGE_SIZE) {
            -1 => 4 * 1024,
            x => x as usize,
        }
    };

    let mut rlimit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    unsafe { Errno::result(libc::getrlimit(libc::RLIMIT_STACK, &mut rlimit))? };
    let stack_size = rlimit.rlim_cur as usize;

    let child_stack = unsafe {
        mman::mmap(
            ptr::null_mut(),
            stack_size,
            mman::ProtFlags::PROT_READ | mman::ProtFlags::PROT_WRITE,
            mman::MapFlags::MAP_PRIVATE | mman::MapFlags::MAP_ANONYMOUS | mman::MapFlags::MAP_STACK,
            -1,
            0,
        )?
    };

    let signal = nix::sys::signal::Signal::SIGCHLD;
    let combined = flags.bits() | signal as libc::c_int;
    let res = unsafe {
        mman::mprotect(child_stack, page_size, mman::ProtFlags::PROT_NONE)
            .context("failed to create guard page")?;
        let child_stack_top = child_stack.add(stack_size);
        libc::clone(
            std::mem::transmute(callback as extern "C" fn(*mut sched::CloneCb) -> i32),
            child_stack_top,
            combined,
            &mut cb as *mut _ as *mut libc::c_void,
        )
    };
    Errno::result(res).map(Pid::from_raw).map_err(anyhow::Error::from)
}

#[cfg(test)]
mod tests {
    use super::namespace_flags;
    use nix::sched::CloneFlags;

    #[test]
    fn namespace_flags_cover_the_six_namespaces() {
        let flags = namespace_flags();
        for expect in [
            CloneFlags::CLONE_NEWIPC,
            CloneFlags::CLONE_NEWNET,
            CloneFlags::CLONE_NEWNS,
            CloneFlags::CLONE_NEWPID,
            CloneFlags::CLONE_NEWUSER,
            CloneFlags::CLONE_NEWUTS,
        ] {
            assert!(flags.contains(expect));
        }
    }
}
