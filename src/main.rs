//! Campus Hub management CLI (gateway + scheduled maintenance commands).

use campus_hub_lib::{app::logging, commands};
use clap::{ArgAction, Parser, Subcommand};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "campus-hub", version, about = "Campus Hub LMS platform services")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// Listen port (defaults to the configured preferred port).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Cache program data from the catalog service.
    CachePrograms {
        /// Write data to the program cache.
        #[arg(short = 'c', long, action = ArgAction::SetTrue)]
        commit: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = campus_hub_lib::settings_fail_open();
    let _log_guard = logging::init(&settings.log_directives);
    logging::install_panic_hook();

    let result = match cli.command {
        Command::Serve { port } => commands::serve::run(port).await,
        Command::CachePrograms { commit } => commands::cache_programs::run_from_env(commit)
            .await
            .map(|_| ()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("command failed: {err}");
            ExitCode::FAILURE
        }
    }
}
