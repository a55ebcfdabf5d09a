use anyhow::Result;

use crate::Context;
use crate::render;
use crate::ui;

pub fn run(ctx: &Context, backends: &[String], json: bool) -> Result<()> {
    let registry = ctx.registry();
    let selected = registry.get_many(backends)?;
    if selected.is_empty() {
        ui::warn("No backends available");
        return Ok(());
    }

    let manifest = ctx.load_manifest()?;
    let mut engine = ctx.engine()?;
    let status = engine.list_status(&manifest, &selected)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", render::format_status(&status, ctx.config.compact_print));
    }
    Ok(())
}
