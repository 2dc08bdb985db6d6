//! pgprobed — run the pgprobe plugin from a terminal.
//!
//! # Usage
//!
//! ```text
//! pgprobed --config pgprobe.toml get pgsql.version tcp://db:5432 monitor
//! pgprobed watch pgsql.connections replica --every 30
//! pgprobed --config pgprobe.toml check-config
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pgprobe_plugin::{DEFAULT_GLOBAL_TIMEOUT, MetricKey, MetricValue, Plugin, PluginOptions};
use tracing::{error, info, warn};

const DEFAULT_FILTER: &str = "info,pgprobed=debug,pgprobe_plugin=debug,pgprobe_conn=debug";

#[derive(Parser)]
#[command(name = "pgprobed", about = "PostgreSQL metrics probe")]
struct Cli {
    /// Plugin configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Agent-wide timeout in seconds, used where the configuration sets none.
    #[arg(long, global = true, default_value_t = DEFAULT_GLOBAL_TIMEOUT)]
    timeout: u64,

    /// Print values as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export one metric and print its value.
    Get {
        /// Metric key, e.g. `pgsql.version`.
        key: String,
        /// Positional parameters: URI or session, User, Password, Database, ...
        params: Vec<String>,
    },
    /// Export a metric repeatedly until interrupted.
    Watch {
        key: String,
        params: Vec<String>,
        /// Seconds between exports.
        #[arg(long, default_value = "10")]
        every: u64,
    },
    /// Validate the configuration and exit.
    CheckConfig,
    /// List the supported metric keys.
    Metrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Get { ref key, ref params } => {
            let plugin = load_plugin(&cli)?;
            plugin.start().await;
            let result = plugin.export(key, params, None).await;
            plugin.stop().await;
            let value = result.with_context(|| format!("cannot export {key}"))?;
            println!("{}", render(&value, cli.json)?);
            Ok(())
        }
        Command::Watch {
            ref key,
            ref params,
            every,
        } => {
            let plugin = load_plugin(&cli)?;
            watch(&plugin, key, params, Duration::from_secs(every.max(1)), cli.json).await
        }
        Command::CheckConfig => {
            let options = load_options(cli.config.as_deref(), cli.timeout)?;
            options.validate()?;
            println!(
                "configuration ok: {} session(s), keep_alive {}s, custom queries {}",
                options.sessions.len(),
                options.keep_alive,
                if options.custom_queries_enabled { "enabled" } else { "disabled" },
            );
            Ok(())
        }
        Command::Metrics => {
            for key in MetricKey::ALL {
                println!("{:<28} {}", key.name(), key.description());
            }
            Ok(())
        }
    }
}

fn load_options(path: Option<&Path>, timeout: u64) -> anyhow::Result<PluginOptions> {
    let options = match path {
        Some(path) => PluginOptions::from_file(path)
            .with_context(|| format!("cannot load configuration {}", path.display()))?,
        None => PluginOptions::default(),
    };
    Ok(options.with_global_timeout(timeout))
}

fn load_plugin(cli: &Cli) -> anyhow::Result<Plugin> {
    let options = load_options(cli.config.as_deref(), cli.timeout)?;
    Plugin::new(options).context("invalid plugin configuration")
}

fn render(value: &MetricValue, json: bool) -> anyhow::Result<String> {
    if json {
        Ok(serde_json::to_string(value)?)
    } else {
        Ok(value.to_string())
    }
}

async fn watch(
    plugin: &Plugin,
    key: &str,
    params: &[String],
    every: Duration,
    json: bool,
) -> anyhow::Result<()> {
    plugin.start().await;
    info!(key, every = ?every, "watching");

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut hangup = Hangup::new()?;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match plugin.export(key, params, None).await {
                    Ok(value) => println!("{}", render(&value, json)?),
                    Err(e) => error!(key, error = %e, "export failed"),
                }
            }
            _ = hangup.recv() => {
                match plugin.reload_custom_queries().await {
                    Ok(count) => info!(count, "custom queries reloaded"),
                    Err(e) => warn!(error = %e, "custom query reload failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    plugin.stop().await;
    Ok(())
}

/// SIGHUP stream; never fires off unix.
struct Hangup {
    #[cfg(unix)]
    signal: tokio::signal::unix::Signal,
}

impl Hangup {
    #[cfg(unix)]
    fn new() -> anyhow::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        let signal = signal(SignalKind::hangup()).context("cannot install SIGHUP handler")?;
        Ok(Self { signal })
    }

    #[cfg(not(unix))]
    fn new() -> anyhow::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        if self.signal.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
