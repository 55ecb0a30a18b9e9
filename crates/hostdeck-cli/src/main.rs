mod cron;
mod plugins;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use hostdeck_config::HostDeckConfig;
use hostdeck_core::{CoreContext, Invocation};
use hostdeck_plugins::PluginRegistry;

#[derive(Parser)]
#[command(name = "hostdeck", about = "Game-server admin dashboard core")]
struct Cli {
    /// Config file (defaults to $HOSTDECK_CONFIG or ~/.hostdeck/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scheduled task commands
    Cron {
        #[command(subcommand)]
        command: cron::CronCommand,
    },
    /// Plugin unit commands
    Plugins {
        #[command(subcommand)]
        command: plugins::PluginsCommand,
    },
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check system health
    Health,
}

/// Every plugin entry point compiled into this binary.
fn registry() -> PluginRegistry {
    PluginRegistry::new().with(
        hostdeck_plugin_login_audit::ENTRY,
        Box::new(hostdeck_plugin_login_audit::create_login_audit),
    )
}

fn init_tracing(config: &HostDeckConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Write default settings to `path`, or the default config location.
fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => hostdeck_config::config_file_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    hostdeck_config::save_config_to(&HostDeckConfig::default(), &path)?;
    println!("wrote {}", path.display());
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<HostDeckConfig> {
    let config = match path {
        Some(path) => hostdeck_config::load_config_from(path),
        None => hostdeck_config::load_config(),
    }
    .context("loading configuration")?;
    init_tracing(&config);
    Ok(config)
}

fn bootstrap(config: HostDeckConfig) -> anyhow::Result<CoreContext> {
    CoreContext::bootstrap(config, registry(), Invocation::Scheduler)
        .inspect_err(|e| tracing::error!("Bootstrap failed: {e}"))
        .context("bootstrapping hostdeck core")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Init { force } => init_config(cli.config.clone(), force)?,
        Commands::Cron { command } => cron::run(command, bootstrap(load_config(config_path)?)?)?,
        Commands::Plugins { command } => {
            plugins::run(command, bootstrap(load_config(config_path)?)?)?
        }
        Commands::Health => {
            let config = load_config(config_path)?;
            println!("hostdeck is healthy");
            println!("  plugin root: {}", config.paths.plugin_root.display());
            println!("  cache root: {}", config.paths.cache_root.display());
            match hostdeck_core::tasks::read_heartbeat(&config.paths.cache_root) {
                Some(at) => {
                    let age = chrono::Utc::now() - at;
                    println!("  last scheduler run: {at} ({}s ago)", age.num_seconds());
                }
                None => println!("  last scheduler run: never"),
            }
        }
    }

    Ok(())
}
