use anyhow::Result;

use crate::Context;
use crate::cli::RemoveArgs;
use crate::ui;

pub fn run(ctx: &Context, args: RemoveArgs) -> Result<()> {
    let registry = ctx.registry();
    let backend = registry.get(&args.backend)?;
    let kind = super::kind(args.dependency);

    let mut manifest = ctx.load_manifest()?;
    let mut engine = ctx.engine()?;
    let report = engine.remove(&mut manifest, &backend, &args.names, kind)?;
    ctx.save_manifest(&manifest)?;

    if report.removed.is_empty() {
        ui::info(&format!("No {} dropped for {}", kind.plural(), args.backend));
    } else {
        ui::success(&format!(
            "Dropped {} for {}: {}",
            kind.plural(),
            args.backend,
            report.removed.join(", ")
        ));
    }
    super::report_outcome(&report.outcome);
    Ok(())
}
