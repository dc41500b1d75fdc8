pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::sync_memory::SyncOptions;
use crate::commands::{CommandResult, GlobalOptions};

#[derive(Debug, Parser)]
#[command(
    name = "advocado",
    about = "Advocado operator CLI",
    long_about = "Sync the knowledge memory, publish the agent pipe, inspect configuration and chat with the agent.",
    after_help = "Examples:\n  advocado sync-memory\n  advocado publish --dry-run\n  advocado doctor --json\n  advocado chat"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to an advocado.toml file (must exist when given)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Upload every manifest document to the configured memory")]
    SyncMemory {
        #[arg(long, help = "Manifest TOML file; defaults to the configured or built-in manifest")]
        manifest: Option<PathBuf>,
        #[arg(long, help = "Directory that relative manifest sources are resolved against")]
        root: Option<PathBuf>,
    },
    #[command(about = "Compose the agent configuration and publish it to the pipe host")]
    Publish {
        #[arg(long, help = "Print the composed pipe without publishing it")]
        dry_run: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, manifest sources and the tool schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Chat with the agent on stdin/stdout")]
    Chat,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let global = GlobalOptions { config_path: cli.config };
    logging::init(&global);

    let result = match cli.command {
        Command::SyncMemory { manifest, root } => {
            commands::sync_memory::run(&global, &SyncOptions { manifest, root })
        }
        Command::Publish { dry_run } => commands::publish::run(&global, dry_run),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run(&global) },
        Command::Doctor { json } => {
            CommandResult { exit_code: 0, output: commands::doctor::run(&global, json) }
        }
        Command::Chat => commands::chat::run(&global),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
