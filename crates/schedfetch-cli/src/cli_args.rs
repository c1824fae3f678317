use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use schedfetch_core::RunOptions;

/// Fetch schedule tables one topic at a time and build a combined page.
#[derive(Parser, Debug, Clone)]
#[command(name = "schedfetch", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Supported subcommands. No subcommand means `run`.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Fetch every topic, then build the aggregate page.
    Run(RunArgs),
    /// Render the page locally from existing CSV files (no API calls).
    Render,
    /// List catalog topics and whether their files exist.
    #[command(alias = "list")]
    Topics,
    /// Remove old files from the scratch directory.
    Cleanup,
    /// Show the effective configuration.
    Config,
}

/// Locations shared by every command.
#[derive(Debug, Clone, Args, Default)]
pub struct GlobalArgs {
    /// Base directory holding config/, prompt templates, output/, tmp/ and logs/.
    #[arg(long = "base-dir", global = true, value_hint = ValueHint::DirPath)]
    pub base_dir: Option<PathBuf>,

    /// Config file (defaults to <base>/config/config.json).
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Topic catalog (defaults to <base>/config/sports.json).
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub catalog: Option<PathBuf>,

    /// Log only to the log file, not stderr.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Args, Default)]
pub struct RunArgs {
    /// Skip the aggregate request.
    #[arg(long = "no-aggregate", action = ArgAction::SetTrue)]
    pub no_aggregate: bool,
}

impl Cli {
    /// Command to execute, treating a bare invocation as `run`.
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Run(RunArgs::default()))
    }

    pub fn run_options(&self, default_base: PathBuf) -> RunOptions {
        let mut options = RunOptions::new(self.global.base_dir.clone().unwrap_or(default_base));
        options.config_path = self.global.config.clone();
        options.catalog_path = self.global.catalog.clone();
        if let Command::Run(args) = self.command() {
            options.aggregate = !args.no_aggregate;
        }
        options
    }
}
