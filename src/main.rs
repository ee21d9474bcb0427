//! A minimal OCI-compatible container runtime, invoked as a single
//! self-reexecuting binary driving a container through `create`, `start`,
//! `kill`, `delete` and `state`, plus the hidden `init` entry point used
//! only by the re-exec convention in `warden::launcher`.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Clap;

use warden::controller;
use warden::error::RuntimeError;
use warden::signal;

#[derive(Clap, Debug)]
#[clap(version = "0.1.0", author = "utam0k <k0ma@utam0k.jp>")]
struct Opts {
    /// write logs to this file instead of stderr
    #[clap(short, long)]
    log: Option<PathBuf>,
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Clap, Debug)]
pub struct Create {
    container_id: String,
    bundle: PathBuf,
}

#[derive(Clap, Debug)]
pub struct Start {
    container_id: String,
}

#[derive(Clap, Debug)]
pub struct Kill {
    container_id: String,
    #[clap(default_value = "TERM")]
    signal: String,
}

#[derive(Clap, Debug)]
pub struct Delete {
    container_id: String,
}

#[derive(Clap, Debug)]
pub struct State {
    container_id: String,
}

#[derive(Clap, Debug)]
pub struct Init {
    container_id: String,
    bundle: PathBuf,
    ready_fd: i32,
}

#[derive(Clap, Debug)]
enum SubCommand {
    Create(Create),
    Start(Start),
    Kill(Kill),
    Delete(Delete),
    State(State),
    /// Internal entry point for the namespaced container process. Not meant
    /// to be invoked directly.
    #[clap(setting = clap::AppSettings::Hidden)]
    Init(Init),
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    if let Err(e) = warden::logger::init(opts.log) {
        eprintln!("log init failed: {:?}", e);
    }

    match opts.subcmd {
        SubCommand::Create(create) => controller::create(&create.container_id, &create.bundle),
        SubCommand::Start(start) => controller::start(&start.container_id),
        SubCommand::Kill(kill) => {
            let sig = signal::from_str(&kill.signal)?;
            controller::kill(&kill.container_id, sig)
        }
        SubCommand::Delete(delete) => controller::delete(&delete.container_id),
        SubCommand::State(state) => {
            let state = controller::state(&state.container_id)?;
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
        SubCommand::Init(init) => {
            if init.ready_fd < 0 {
                bail!(RuntimeError::InvalidArgument(format!(
                    "ready-fd must not be negative, got {}",
                    init.ready_fd
                )));
            }
            controller::init(&init.container_id, &init.bundle, init.ready_fd)
        }
    }
}
