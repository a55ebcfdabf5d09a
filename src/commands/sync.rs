use anyhow::Result;

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, backends: &[String]) -> Result<()> {
    let registry = ctx.registry();
    let selected = registry.get_many(backends)?;
    if selected.is_empty() {
        ui::warn("No backends available");
        return Ok(());
    }

    let manifest = ctx.load_manifest()?;
    let mut engine = ctx.engine()?;
    let outcome = engine.sync(&manifest, &selected)?;
    super::report_outcome(&outcome);
    Ok(())
}
