use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let registry = ctx.registry();
    ui::header("Backends");

    if registry.is_empty() {
        ui::dim("No backends available");
        return Ok(());
    }

    for backend in registry.all() {
        println!(
            "  {} {}  {}",
            backend.icon(),
            backend.name().bold(),
            backend.short_desc().dimmed()
        );
        if ctx.verbose > 0 {
            ui::dim(backend.long_desc());
        }
    }
    Ok(())
}
