use std::io::Write;

use clap::Args;
use hahmon_types::{InsertOutcome, topic_label};

use super::{Context, Result, host_name, open};
use crate::error::CommandError;

#[derive(Args, Debug)]
pub struct Command {
    /// Host name, as it appears in the second topic segment
    #[arg(value_parser = host_name)]
    host: String,

    /// Seconds of silence before the host is late [default: registry.default_timeout_secs]
    #[arg(long, short, value_parser = clap::value_parser!(u32).range(1..))]
    timeout: Option<u32>,

    /// Topic below the host, e.g. /master_bedroom/temp_humidity
    #[arg(long)]
    topic: Option<String>,
}

pub async fn handle(command: &Command, ctx: &mut Context<'_>) -> Result<()> {
    let timeout = command.timeout.unwrap_or(ctx.default_timeout);
    let topic = command.topic.as_deref();

    let db = open(ctx).await?;
    let result = db.store().insert(&command.host, topic, timeout).await;
    db.close().await;

    match result? {
        InsertOutcome::Created => {
            writeln!(
                ctx.out,
                "added {} {} timeout {timeout}",
                command.host,
                topic_label(topic)
            )?;
            Ok(())
        }
        InsertOutcome::Duplicate => Err(CommandError::Duplicate {
            host: command.host.clone(),
            topic: command.topic.clone(),
        }),
    }
}
