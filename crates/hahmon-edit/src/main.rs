//! Administrative tool for the home automation host monitor.
//!
//! Creates the activity store and edits the set of watched `(host, topic)`
//! records the monitor stamps:
//!
//! ```text
//! hahmon-edit create
//! hahmon-edit add oak --timeout 300
//! hahmon-edit add oak --topic /some/topic --timeout 500
//! hahmon-edit set-timeout oak 350
//! hahmon-edit list oak
//! hahmon-edit delete oak
//! ```
//!
//! Results go to standard output, diagnostics to standard error. The exit
//! codes are listed in [`exit_code`].

mod commands;
mod error;
mod exit_code;

use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind;
use hahmon_core::HahmonConfig;
use tracing_subscriber::EnvFilter;

use crate::commands::Context;
use crate::exit_code::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "hahmon-edit",
    version,
    about = "Manage the hosts watched by the home automation host monitor"
)]
struct Args {
    /// Activity store to work on [default: database.path from hahmon.yaml, else hahmon.db]
    #[arg(long, env = "HAHMON_DB", global = true)]
    db: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return parse_failure_code(&e);
        }
    };

    let config = match HahmonConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("hahmon-edit: {e}");
            return ExitCode::ConfigError;
        }
    };

    // Logs go to stderr so `list` output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut store = config.database.sqlite_config();
    if let Some(path) = args.db {
        store.path = path;
    }

    let mut out = std::io::stdout();
    let mut ctx = Context {
        store,
        default_timeout: config.registry.default_timeout_secs,
        out: &mut out,
    };

    match args.command.execute(&mut ctx).await {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("hahmon-edit: {e}");
            e.exit_code()
        }
    }
}

/// `--help` and `--version` succeed; anything else clap rejects is a usage
/// error.
fn parse_failure_code(err: &clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
        _ => ExitCode::Usage,
    }
}
