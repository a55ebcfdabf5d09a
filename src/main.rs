mod backends;
mod cli;
mod commands;
mod config;
mod http;
mod paths;
mod render;
mod runner;
mod sudo;
mod ui;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use reconcile::{
    AutoConfirm, ConfirmCallback, Engine, EngineOptions, Manifest, PrivilegeCoordinator, Registry,
    Resolver,
};
use std::io;
use std::path::PathBuf;
use tracker::StateStore;

use config::Config;
use render::TerminalReporter;
use sudo::SudoProbe;
use ui::DialoguerConfirm;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub assume_yes: bool,
    pub config_dir: PathBuf,
    pub config: Config,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self> {
        let config_dir = paths::config_dir()?;
        let config = Config::load(&paths::config_file(&config_dir))?;
        Ok(Self {
            verbose: cli.verbose,
            quiet: cli.quiet,
            assume_yes: cli.assume_yes,
            config_dir,
            config,
        })
    }

    pub fn manifest_path(&self) -> PathBuf {
        paths::manifest_file(&self.config_dir)
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        Ok(Manifest::load(&self.manifest_path())?)
    }

    pub fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        Ok(manifest.save(&self.manifest_path())?)
    }

    /// Usable backends, warning about the ones left out
    pub fn registry(&self) -> Registry {
        let (registry, warnings) = backends::registry(&self.config);
        if !self.quiet {
            for warning in &warnings {
                ui::warn(warning);
            }
        }
        registry
    }

    /// Engine over the on-disk state store
    pub fn engine(&self) -> Result<Engine> {
        let state_file = paths::state_file(&self.config.data_dir()?);
        let store = StateStore::open(&state_file)
            .with_context(|| format!("Could not open state store {}", state_file.display()))?;

        let confirm: Box<dyn ConfirmCallback> = if self.assume_yes {
            Box::new(AutoConfirm)
        } else {
            Box::new(DialoguerConfirm)
        };

        Ok(Engine::new(
            store,
            Resolver::system(self.config.groups.clone()),
            PrivilegeCoordinator::new(Box::new(SudoProbe), self.assume_yes),
            confirm,
            Box::new(TerminalReporter::new(self.config.compact_print)),
        )
        .with_options(EngineOptions {
            assume_yes: self.assume_yes,
            rotations: self.config.rotations(),
        }))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "packward", &mut io::stdout());
        return Ok(());
    }

    let ctx = Context::load(&cli)?;

    match cli.command {
        Command::Install(args) => commands::install::run(&ctx, args),
        Command::Remove(args) => commands::remove::run(&ctx, args),
        Command::List(args) => commands::list::run(&ctx, &args.backends, args.json),
        Command::Sync(args) => commands::sync::run(&ctx, &args.backends),
        Command::Backends => commands::backends::run(&ctx),
        Command::Complete(args) => commands::complete::run(&ctx, args),
        Command::Completions { .. } => Ok(()),
    }
}
