use std::io::Write;

use clap::Subcommand;
use hahmon_db::{ActivityDb, SqliteConfig};

use crate::error::CommandError;

pub mod add;
pub mod create;
pub mod delete;
pub mod list;
pub mod set_timeout;

/// Result of running one command.
pub type Result<T> = std::result::Result<T, CommandError>;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an empty activity store
    Create,
    /// Watch a host, or one topic of a host
    Add(add::Command),
    /// Stop watching a host, or one topic of a host
    Delete(delete::Command),
    /// Report the status of watched hosts
    List(list::Command),
    /// Change how long a host may stay silent before it is late
    SetTimeout(set_timeout::Command),
}

/// What every command needs besides its own arguments.
pub struct Context<'a> {
    /// Where the activity store lives.
    pub store: SqliteConfig,
    /// Timeout for records added without `--timeout`.
    pub default_timeout: u32,
    /// Where results are printed.
    pub out: &'a mut dyn Write,
}

impl Command {
    pub async fn execute(&self, ctx: &mut Context<'_>) -> Result<()> {
        match self {
            Self::Create => create::handle(ctx).await,
            Self::Add(o) => add::handle(o, ctx).await,
            Self::Delete(o) => delete::handle(o, ctx).await,
            Self::List(o) => list::handle(o, ctx).await,
            Self::SetTimeout(o) => set_timeout::handle(o, ctx).await,
        }
    }
}

/// Reject an empty or blank host before any store is opened.
fn host_name(value: &str) -> std::result::Result<String, String> {
    if value.trim().is_empty() {
        return Err("host must not be empty".to_owned());
    }
    Ok(value.to_owned())
}

/// Open the store for one unit of work.
async fn open(ctx: &Context<'_>) -> Result<ActivityDb> {
    Ok(ActivityDb::open(&ctx.store).await?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    use super::*;

    /// A freshly created store in a temporary directory.
    pub async fn store() -> (tempfile::TempDir, SqliteConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig::new(dir.path().join("test.db"));
        ActivityDb::initialize(&config).await.unwrap();
        (dir, config)
    }

    /// Run `command` against `config`, returning the result and stdout.
    pub async fn run(command: &Command, config: &SqliteConfig) -> (Result<()>, String) {
        let mut out = Vec::new();
        let mut ctx = Context {
            store: config.clone(),
            default_timeout: 300,
            out: &mut out,
        };
        let result = command.execute(&mut ctx).await;
        (result, String::from_utf8(out).unwrap())
    }
}
