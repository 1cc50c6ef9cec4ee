use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use lockstep_config::{explicit_config_path, load_config, Config};
use lockstep_session::SessionError;

mod logging;
mod simulation;

const USAGE: &str = "usage: lockstep [program-path]";

/// Exit status for errors that prevented the session from starting.
const EXIT_BOOTSTRAP: i32 = 2;

fn load(cwd: Option<&Path>) -> Result<Config> {
    let explicit = explicit_config_path();
    load_config(explicit.as_deref(), cwd).context("failed to load configuration")
}

fn run(program: Option<PathBuf>) -> Result<()> {
    let cwd = env::current_dir().ok();
    let config = load(cwd.as_deref())?;
    logging::init(&config.log)?;

    match program {
        Some(path) => {
            info!(program = %path.display(), "starting concurrent simulation");
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            let report = runtime.block_on(simulation::run_concurrent(&config, &path))?;
            simulation::print_concurrent_report(&report);
        }
        None => {
            info!("starting sequential simulation");
            let report = simulation::run_sequential(&config)?;
            simulation::print_sequential_report(&report);
        }
    }
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SessionError>() {
        Some(session) if session.is_fatal() => EXIT_BOOTSTRAP,
        _ => 1,
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() > 2 {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }
    let program = args.get(1).map(PathBuf::from);

    if let Err(e) = run(program) {
        eprintln!("lockstep: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}
