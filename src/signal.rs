//! Signal name parsing for `kill`. Only the names the spec documents are
//! recognized — deliberately not the full POSIX table, and not the source's
//! `QUITA`/`TEM`/`EGV` typos.
use anyhow::{bail, Result};
use nix::sys::signal::Signal;

use crate::error::RuntimeError;

pub fn from_str(signal: &str) -> Result<Signal> {
    use Signal::*;
    Ok(match signal.to_ascii_uppercase().as_str() {
        "1" | "HUP" | "SIGHUP" => SIGHUP,
        "2" | "INT" | "SIGINT" => SIGINT,
        "3" | "QUIT" | "SIGQUIT" => SIGQUIT,
        "4" | "ILL" | "SIGILL" => SIGILL,
        "5" | "TRAP" | "SIGTRAP" => SIGTRAP,
        "6" | "ABRT" | "SIGABRT" => SIGABRT,
        "8" | "FPE" | "SIGFPE" => SIGFPE,
        "9" | "KILL" | "SIGKILL" => SIGKILL,
        "11" | "SEGV" | "SIGSEGV" => SIGSEGV,
        "13" | "PIPE" | "SIGPIPE" => SIGPIPE,
        "14" | "ALRM" | "SIGALRM" => SIGALRM,
        "15" | "TERM" | "SIGTERM" => SIGTERM,
        _ => bail!(RuntimeError::InvalidArgument(format!(
            "{} is not a recognized signal",
            signal
        ))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_name_prefixed_and_numeric_forms() {
        for (name, sig) in [
            ("HUP", Signal::SIGHUP),
            ("TERM", Signal::SIGTERM),
            ("SEGV", Signal::SIGSEGV),
            ("KILL", Signal::SIGKILL),
        ] {
            assert_eq!(from_str(name).unwrap(), sig);
            assert_eq!(from_str(&format!("SIG{}", name)).unwrap(), sig);
            assert_eq!(from_str(&name.to_ascii_lowercase()).unwrap(), sig);
        }
        assert_eq!(from_str("9").unwrap(), Signal::SIGKILL);
        assert_eq!(from_str("15").unwrap(), Signal::SIGTERM);
    }

    #[test]
    fn rejects_unknown_signal() {
        assert!(from_str("QUITA").is_err());
        assert!(from_str("bogus").is_err());
    }
}
