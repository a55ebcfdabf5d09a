use anyhow::Result;
use reconcile::InstallTarget;

use crate::Context;
use crate::cli::InstallArgs;
use crate::ui;

pub fn run(ctx: &Context, args: InstallArgs) -> Result<()> {
    let registry = ctx.registry();
    let backend = registry.get(&args.backend)?;
    let kind = super::kind(args.dependency);
    let target = match (args.host, args.group) {
        (true, _) => InstallTarget::Host,
        (false, Some(group)) => InstallTarget::Group(group),
        (false, None) => InstallTarget::Global,
    };

    let mut manifest = ctx.load_manifest()?;
    let mut engine = ctx.engine()?;
    let report = engine.install(&mut manifest, &backend, &args.names, kind, target)?;
    ctx.save_manifest(&manifest)?;

    if report.added.is_empty() {
        ui::info(&format!("No new {} declared for {}", kind.plural(), args.backend));
    } else {
        ui::success(&format!(
            "Declared {} for {}: {}",
            kind.plural(),
            args.backend,
            report.added.join(", ")
        ));
    }
    super::report_outcome(&report.outcome);
    Ok(())
}
