mod cli;
mod config;
mod ingest;
mod logging;
mod model;
mod prompt;
mod refine;
mod run;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = if cli.verbose {
        true
    } else {
        logging::env_flag()
    };
    logging::init(verbose);
    match cli.command {
        Command::Refine {
            input,
            output,
            min_improve,
            max_attempts,
            provider,
            model,
        } => refine::run_cli(input, output, min_improve, max_attempts, provider, model),
        Command::Run { config } => run::run_from_config(&config),
    }
}
