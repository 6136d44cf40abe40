pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "mystyle",
    about = "MyStyle operator CLI",
    long_about = "Operate MyStyle migrations, demo data, signal refreshes, and readiness checks.",
    after_help = "Examples:\n  mystyle doctor --json\n  mystyle refresh --key weather --force\n  mystyle popularity basic-rain-coat"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Upsert the demo catalog; --reset empties the catalog first")]
    Seed {
        #[arg(long, help = "Delete every item (and its event buckets) before seeding")]
        reset: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity, and signal cache readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one refresh cycle for one signal key or every enabled key")]
    Refresh {
        #[arg(long, help = "Signal key to refresh (trends, weather, wiki)")]
        key: Option<String>,
        #[arg(long, help = "Fetch even when the cached entry is still fresh")]
        force: bool,
    },
    #[command(about = "List the cached status of every signal")]
    Signals,
    #[command(about = "Print the windowed popularity summary for one item")]
    Popularity {
        #[arg(help = "Catalog item id")]
        item_id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) =
        mystyle_core::config::AppConfig::load(mystyle_core::config::LoadOptions::default())
    {
        mystyle_server::logging::init_stderr_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { reset } => commands::seed::run(reset),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Refresh { key, force } => commands::refresh::run(key.as_deref(), force),
        Command::Signals => commands::signals::run(),
        Command::Popularity { item_id } => commands::popularity::run(&item_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
