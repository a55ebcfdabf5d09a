use anyhow::Result;

use crate::Context;
use crate::cli::{CompleteAction, CompleteArgs};

pub fn run(ctx: &Context, args: CompleteArgs) -> Result<()> {
    // Completion output must stay clean; probe warnings are dropped.
    let (registry, _) = crate::backends::registry(&ctx.config);
    let backend = registry.get(&args.backend)?;
    let kind = super::kind(args.dependency);
    let engine = ctx.engine()?;

    let candidates = match args.action {
        CompleteAction::Install => engine.install_candidates(&backend, &args.partial, kind)?,
        CompleteAction::Remove => {
            let manifest = ctx.load_manifest()?;
            engine.remove_candidates(&manifest, &backend, &args.partial, kind)?
        }
    };

    for candidate in candidates {
        println!("{candidate}");
    }
    Ok(())
}
