pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "reqflow",
    about = "Reqflow operator CLI",
    long_about = "Operate the requisition service database, demo directory, configuration, and local bearer tokens.",
    after_help = "Examples:\n  reqflow migrate\n  reqflow seed\n  reqflow doctor --json\n  reqflow issue-token --email employee@reqflow.test --ttl-hours 8"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo directory (users, roles, asset types, bearer tokens) and verify it")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, notification readiness, DB connectivity, and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(name = "issue-token", about = "Mint a bearer token for an existing active user")]
    IssueToken {
        #[arg(long, help = "Email address of the directory user")]
        email: String,
        #[arg(
            long,
            value_parser = clap::value_parser!(i64).range(1..=8760),
            help = "Token lifetime in hours; omit for a non-expiring token"
        )]
        ttl_hours: Option<i64>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::IssueToken { email, ttl_hours } => commands::issue_token::run(&email, ttl_hours),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
