//! The start/create synchronization barrier.
//!
//! A single named pipe per container is the one deliberate rendezvous point
//! between the init child (which prepares the container and then blocks)
//! and the `start` command (which releases it). The two sides open the FIFO
//! in complementary modes: the child opens for writing (which blocks until a
//! reader shows up) and `start` opens for reading. Opening both ends in the
//! same mode, as a literal reading of the upstream source suggests, cannot
//! rendezvous at all — this is the resolution recorded in `SPEC_FULL.md` §9.
use std::path::Path;

use anyhow::{Context, Result};
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, mkfifo, read, write};

pub const FIFO_NAME: &str = "pipe.fifo";

pub fn path(container_dir: &Path) -> std::path::PathBuf {
    container_dir.join(FIFO_NAME)
}

pub fn create(container_dir: &Path) -> Result<()> {
    let fifo_path = path(container_dir);
    mkfifo(&fifo_path, Mode::from_bits_truncate(0o700))
        .with_context(|| format!("failed to create fifo {:?}", fifo_path))?;
    Ok(())
}

/// Called by the init child once preparation is complete. Blocks until
/// `release` (the `start` command) opens the other end, then writes a single
/// byte so the reader's `read` call observes completion, and closes.
pub fn block_until_released(container_dir: &Path) -> Result<()> {
    let fifo_path = path(container_dir);
    let fd = open(&fifo_path, OFlag::O_WRONLY, Mode::empty())
        .with_context(|| format!("failed to open fifo {:?} for writing", fifo_path))?;
    write(fd, &[0u8]).with_context(|| "failed to write fifo barrier byte")?;
    close(fd).ok();
    Ok(())
}

/// Called by `start`. Unblocks the child's pending write and confirms it by
/// reading the single byte.
pub fn release(container_dir: &Path) -> Result<()> {
    let fifo_path = path(container_dir);
    let fd = open(&fifo_path, OFlag::O_RDONLY, Mode::empty())
        .with_context(|| format!("failed to open fifo {:?} for reading", fifo_path))?;
    let mut buf = [0u8; 1];
    read(fd, &mut buf).with_context(|| "failed to read fifo barrier byte")?;
    close(fd).ok();
    Ok(())
}
