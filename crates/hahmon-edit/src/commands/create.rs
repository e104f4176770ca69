use std::io::Write;

use hahmon_db::ActivityDb;

use super::{Context, Result};

pub async fn handle(ctx: &mut Context<'_>) -> Result<()> {
    ActivityDb::initialize(&ctx.store).await?;
    writeln!(ctx.out, "created {}", ctx.store.path.display())?;
    Ok(())
}
