use std::process::ExitCode;

use acpcap::commands::{run_decode, run_extract};
use acpcap::config::Settings;
use acpcap::context::{Cli, Mode};
use acpcap::error::AppError;
use clap::Parser;
use colored::Colorize;
use log::{debug, info};

fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

fn run(cli: Cli) -> Result<(), AppError> {
    let mode = cli.mode()?;
    let settings = Settings::load(cli.config.as_deref(), cli.overrides())?;
    debug!("{:?}", settings);

    match mode {
        Mode::Decode { artifact } => {
            let report = run_decode(&artifact, &settings)?;
            print!("{}", report);
        }
        Mode::Extract {
            capture,
            output_dir,
        } => {
            let summary = run_extract(&capture, &output_dir, &settings)?;
            info!(
                "{} packets, {} artifacts written",
                summary.packets,
                summary.written.len()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            ExitCode::FAILURE
        }
    }
}
