pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "dealwatch",
    about = "Dealwatch operator CLI",
    long_about = "Check readiness, inspect effective configuration, and preview the Slack notifications a batch of deal events would produce.",
    after_help = "Examples:\n  dealwatch doctor --json\n  dealwatch config\n  dealwatch preview events.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and stage directory readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run a JSON batch of events through the deal filter without sending anything")]
    Preview {
        #[arg(help = "Path to a JSON array of {\"id\", \"payload\"} events")]
        file: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Preview { file } => commands::preview::run(&file),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
