pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "wincomp",
    about = "Won-service compensation operator CLI",
    long_about = "Calculate expected compensation offline, recompute won services in Dataverse, \
                  and inspect configuration readiness.",
    after_help = "Examples:\n  wincomp calc --revenue-type renewal --mrr 1000 --uptick 200 --tcv 12000 \
                  --term 12 --margin 0.30\n  wincomp recompute 6f9619ff-8b86-d011-b42d-00c04fc964ff\n  \
                  wincomp doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Calculate a compensation breakdown without touching Dataverse")]
    Calc(commands::calc::CalcArgs),
    #[command(about = "Recompute and write back expected compensation for won services")]
    Recompute {
        #[arg(required = true, help = "Won service record ids (GUIDs)")]
        ids: Vec<String>,
        #[arg(long, help = "Record per-id failures and continue instead of aborting the batch")]
        isolate_failures: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, service-principal credentials and token acquisition")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Calc(args) => commands::calc::run(&args),
        Command::Recompute { ids, isolate_failures } => {
            commands::recompute::run(&ids, isolate_failures)
        }
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
