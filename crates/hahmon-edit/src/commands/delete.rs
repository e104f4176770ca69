use std::io::Write;

use clap::Args;
use hahmon_types::{DeleteOutcome, topic_label};

use super::{Context, Result, host_name, open};
use crate::error::CommandError;

#[derive(Args, Debug)]
pub struct Command {
    /// Host name
    #[arg(value_parser = host_name)]
    host: String,

    /// Topic below the host; without it only the host-level record is removed
    #[arg(long)]
    topic: Option<String>,
}

pub async fn handle(command: &Command, ctx: &mut Context<'_>) -> Result<()> {
    let topic = command.topic.as_deref();

    let db = open(ctx).await?;
    let result = db.store().delete(&command.host, topic).await;
    db.close().await;

    match result? {
        DeleteOutcome::Deleted => {
            writeln!(ctx.out, "deleted {} {}", command.host, topic_label(topic))?;
            Ok(())
        }
        DeleteOutcome::NotFound => Err(CommandError::NotFound {
            host: command.host.clone(),
            topic: command.topic.clone(),
        }),
    }
}
