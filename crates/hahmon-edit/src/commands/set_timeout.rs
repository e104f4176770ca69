use std::io::Write;

use clap::Args;
use hahmon_types::{UpdateOutcome, topic_label};

use super::{Context, Result, host_name, open};
use crate::error::CommandError;

#[derive(Args, Debug)]
pub struct Command {
    /// Host name
    #[arg(value_parser = host_name)]
    host: String,

    /// New timeout in seconds
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    timeout: u32,

    /// Topic below the host; without it the host-level record is changed
    #[arg(long)]
    topic: Option<String>,
}

pub async fn handle(command: &Command, ctx: &mut Context<'_>) -> Result<()> {
    let topic = command.topic.as_deref();

    let db = open(ctx).await?;
    let result = db.store().set_timeout(&command.host, topic, command.timeout).await;
    db.close().await;

    match result? {
        UpdateOutcome::Updated => {
            writeln!(
                ctx.out,
                "updated {} {} timeout {}",
                command.host,
                topic_label(topic),
                command.timeout
            )?;
            Ok(())
        }
        UpdateOutcome::NotFound => Err(CommandError::NotFound {
            host: command.host.clone(),
            topic: command.topic.clone(),
        }),
    }
}
