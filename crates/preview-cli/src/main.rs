mod cmd;
mod controller;
mod git;
mod output;
mod settings;
mod ssh;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use settings::{ControllerArgs, RemoteArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mr-controller",
    about = "Spawn, update and reap preview environments for open merge requests",
    version,
    propagate_version = true
)]
struct Cli {
    /// Controller config file (YAML)
    #[arg(long, global = true, env = "MR_CONTROLLER_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(flatten)]
    controller: ControllerArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile on a fixed interval until interrupted
    Run {
        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Run a single reconciliation pass and print what it did
    Once {
        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Show what the next pass would create and remove, without writing
    Plan {
        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// List environments in a local checkout of the config repository
    Environments {
        /// Root of the checkout
        #[arg(long, default_value = ".")]
        tree: PathBuf,
    },

    /// Inspect the controller configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } | Commands::Once { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = settings::load_config(cli.config.as_deref(), &cli.controller).and_then(|cfg| {
        match cli.command {
            Commands::Run { remote } => cmd::run::run(cfg, remote),
            Commands::Once { remote } => cmd::run::once(cfg, remote, cli.json),
            Commands::Plan { remote } => cmd::plan::run(cfg, remote, cli.json),
            Commands::Environments { tree } => cmd::environments::run(&cfg, &tree, cli.json),
            Commands::Config { subcommand } => cmd::config::run(&cfg, subcommand, cli.json),
        }
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
