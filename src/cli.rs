use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "packward")]
#[command(version)]
#[command(about = "Declarative package tracking across package managers", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Answer yes to every prompt
    #[arg(
        short = 'y',
        long = "yes",
        global = true,
        env = "PACKWARD_ASSUME_YES",
        value_parser = BoolishValueParser::new()
    )]
    pub assume_yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Declare packages (or dependencies) and install them
    Install(InstallArgs),

    /// Stop declaring packages (or dependencies) and uninstall them
    Remove(RemoveArgs),

    /// Show what is in sync, outdated, missing or removed
    List(ListArgs),

    /// Bring every selected backend in line with the manifest
    Sync(SelectArgs),

    /// Show registered backends
    Backends,

    /// Print argument candidates for shell completion
    #[command(hide = true)]
    Complete(CompleteArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct InstallArgs {
    /// Backend to install with (e.g. dnf, flatpak, git, github, go)
    pub backend: String,

    /// Packages or dependencies to declare
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Treat names as dependencies instead of packages
    #[arg(short, long)]
    pub dependency: bool,

    /// Declare for this host only
    #[arg(long, conflicts_with = "group")]
    pub host: bool,

    /// Declare for a group only
    #[arg(short, long)]
    pub group: Option<String>,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Backend to remove from
    pub backend: String,

    /// Packages or dependencies to drop
    #[arg(required = true)]
    pub names: Vec<String>,

    /// Treat names as dependencies instead of packages
    #[arg(short, long)]
    pub dependency: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Backends to list (default: all registered)
    pub backends: Vec<String>,

    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct SelectArgs {
    /// Backends to act on (default: all registered)
    pub backends: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CompleteAction {
    Install,
    Remove,
}

#[derive(Args)]
pub struct CompleteArgs {
    #[arg(value_enum)]
    pub action: CompleteAction,

    pub backend: String,

    /// Prefix typed so far
    #[arg(default_value = "")]
    pub partial: String,

    #[arg(short, long)]
    pub dependency: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install_group_dependency() {
        let cli = Cli::try_parse_from([
            "packward", "install", "dnf", "atim/lazygit", "-d", "--group", "work",
        ])
        .unwrap();

        let Command::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.backend, "dnf");
        assert_eq!(args.names, vec!["atim/lazygit"]);
        assert!(args.dependency);
        assert_eq!(args.group.as_deref(), Some("work"));
        assert!(!args.host);
    }

    #[test]
    fn test_host_conflicts_with_group() {
        let result = Cli::try_parse_from([
            "packward", "install", "dnf", "htop", "--host", "--group", "work",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_complete() {
        let cli = Cli::try_parse_from(["packward", "complete", "remove", "flatpak", "org."]).unwrap();
        let Command::Complete(args) = cli.command else {
            panic!("expected complete");
        };
        assert!(matches!(args.action, CompleteAction::Remove));
        assert_eq!(args.partial, "org.");
        assert!(!args.dependency);
    }

    #[test]
    fn test_sync_defaults_to_all_backends() {
        let cli = Cli::try_parse_from(["packward", "sync", "--yes"]).unwrap();
        assert!(cli.assume_yes);
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert!(args.backends.is_empty());
    }
}
