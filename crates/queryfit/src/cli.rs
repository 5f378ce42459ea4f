use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "queryfit", about = "query/content alignment refinement CLI")]
pub struct Cli {
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Refine every row of a similarity CSV against its query.
    Refine {
        input: String,
        #[arg(long)]
        output: Option<String>,
        #[arg(long)]
        min_improve: Option<f32>,
        #[arg(long)]
        max_attempts: Option<u32>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Run with settings from a YAML config file.
    Run {
        #[arg(long, default_value = "queryfit.yaml")]
        config: String,
    },
}
