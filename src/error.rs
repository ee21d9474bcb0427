//! Error taxonomy used at the edges of the container lifecycle.
//!
//! Most call sites propagate failures through `anyhow::Context` the way the
//! rest of this crate does; `RuntimeError` exists so the command surface can
//! decide what kind of failure it is dealing with without string matching.
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum RuntimeError {
    InvalidArgument(String),
    AlreadyExists(String),
    NotFound(String),
    InvalidState { id: String, status: String, op: &'static str },
    SpecInvalid { path: PathBuf, cause: String },
    SyscallFailed { op: &'static str, cause: String },
    IoFailed { path: PathBuf, cause: String },
}

impl std::error::Error for RuntimeError {}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Self::AlreadyExists(id) => write!(f, "container {} already exists", id),
            Self::NotFound(id) => write!(f, "container {} does not exist", id),
            Self::InvalidState { id, status, op } => write!(
                f,
                "container {} could not {} because it was {}",
                id, op, status
            ),
            Self::SpecInvalid { path, cause } => {
                write!(f, "invalid runtime spec at {:?}: {}", path, cause)
            }
            Self::SyscallFailed { op, cause } => write!(f, "{} failed: {}", op, cause),
            Self::IoFailed { path, cause } => write!(f, "io error at {:?}: {}", path, cause),
        }
    }
}
