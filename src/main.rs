use clap::Parser;
use std::env;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod compile;
mod confirm;
mod discovery;
mod error;
mod evidence;
mod sections;
#[cfg(test)]
mod test_support;
mod util;
mod validate;
mod workflow;
mod workspace;

use cli::{Command, RootArgs};
use util::Cancellation;
use workflow::Locations;

/// Log filter override; falls back to `warn`, or `info` with `--verbose`.
const LOG_ENV: &str = "IPACK_LOG";

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let locations = Locations {
        repo: args.repo,
        workspace: args.workspace,
        cancel: Cancellation::new(),
    };
    let result = match args.command {
        Command::Init(args) => workflow::run_init(&locations, args),
        Command::Evidence(args) => workflow::run_evidence(&locations, args),
        Command::Discover(args) => workflow::run_discover(&locations, args),
        Command::Confirm(args) => workflow::run_confirm(&locations, args),
        Command::Build(args) => workflow::run_build(&locations, args),
        Command::Export(args) => workflow::run_export(&locations, args),
        Command::Validate(args) => workflow::run_validate(args),
        Command::Status(args) => workflow::run_status(&locations, args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            workflow::report_failure(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = env::var(LOG_ENV)
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
