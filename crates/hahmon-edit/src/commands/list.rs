use std::io::Write;

use clap::Args;
use hahmon_types::Pattern;

use super::{Context, Result, open};

#[derive(Args, Debug)]
pub struct Command {
    /// Host name pattern in SQL LIKE syntax (`%`, `_`) [default: every host]
    host: Option<String>,

    /// Topic pattern in SQL LIKE syntax; a bare `%` also matches host-level records
    #[arg(long, conflicts_with = "host_only")]
    topic: Option<String>,

    /// Only list host-level records (no topic)
    #[arg(long)]
    host_only: bool,

    /// Print a JSON array instead of one line per record
    #[arg(long)]
    json: bool,
}

pub async fn handle(command: &Command, ctx: &mut Context<'_>) -> Result<()> {
    let host = Pattern::from_input(command.host.as_deref());
    let topic = if command.host_only {
        Pattern::HostOnly
    } else {
        Pattern::from_input(command.topic.as_deref())
    };

    let db = open(ctx).await?;
    let result = db.store().query(&host, &topic).await;
    db.close().await;
    let records = result?;

    if command.json {
        serde_json::to_writer_pretty(&mut *ctx.out, &records)?;
        writeln!(ctx.out)?;
    } else {
        for record in &records {
            writeln!(ctx.out, "{record}")?;
        }
    }
    Ok(())
}
