//! Woodpecker
//!
//! Continuously submits throwaway certificates to static-ct-api logs and
//! checks that every SCT they return is included in the published tree.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::Report;
use tracing::{error, info, warn};
use woodpecker_cli::{Config, Failure, exit, init_logging, setup, woodpeck};

#[derive(Parser)]
#[command(name = "woodpecker")]
#[command(about = "Stress-test Certificate Transparency tile logs", long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short = 'c', long = "config", default_value = "woodpecker.yaml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    if let Err(e) = color_eyre::install() {
        eprintln!("installing error reporter: {e}");
    }
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.use_stderr() { exit::CONFIG } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };
    init_logging();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %args.config.display(), "loading config");
            return fail(e.into());
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "starting runtime");
            return ExitCode::from(exit::SETUP);
        }
    };
    runtime.block_on(run(config))
}

async fn run(config: Config) -> ExitCode {
    let orchestrator = match setup(&config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => return fail(e.into()),
    };

    let cancel = orchestrator.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight requests");
            cancel.cancel();
        }
    });

    match woodpeck(orchestrator).await {
        Ok(report) => {
            info!(cycles = report.attempts(), "success");
            ExitCode::SUCCESS
        }
        Err(failure) => fail(failure),
    }
}

fn fail(failure: Failure) -> ExitCode {
    let code = failure.exit_code();
    error!("{:?}", Report::new(failure));
    ExitCode::from(code)
}
