//! pcmd
//!
//! Wraps an ssh `ProxyCommand`, optionally keeping a single instance per
//! remote identity, and gives the wrapped command a grace period to clean
//! up once the connection is done.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcmd::app;
use pcmd::output::{print_error, print_notice, stop_message};
use pcmd_core::config;
use pcmd_core::error::ConfigError;
use pcmd_core::{spawn_signal_dispatcher, BuildInfo, ChildCommand, Identity, SessionConfig, Settings};

const BUILD_INFO: BuildInfo = BuildInfo::new(
    env!("CARGO_PKG_VERSION"),
    match option_env!("PCMD_BUILD") {
        Some(build) => build,
        None => "dev",
    },
);

#[derive(Parser)]
#[command(name = "pcmd")]
#[command(about = "Single-instance SSH ProxyCommand wrapper with graceful shutdown")]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Working directory for lock files and logs
    #[arg(long, value_name = "DIR")]
    workdir: Option<PathBuf>,

    /// Seconds the proxy command gets to clean up once proxying is complete
    #[arg(long, value_name = "SECS")]
    grace_period: Option<u64>,

    /// Allow only one instance per remote user, host and port
    #[arg(long)]
    lock: bool,

    /// Remote user (%r)
    #[arg(short = 'r', long = "user", value_name = "USER", default_value = "")]
    user: String,

    /// Remote host (%h)
    #[arg(short = 'h', long = "host", value_name = "HOST", default_value = "")]
    host: String,

    /// Remote port (%p)
    #[arg(short = 'p', long, value_name = "PORT", default_value_t = 22)]
    port: u16,

    /// If another instance holds the lock, wait for its SSH ControlMaster and connect through it
    #[arg(long)]
    wait_for_master: bool,

    /// Path to a settings file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Print version and exit
    #[arg(long)]
    version: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Proxy command and its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required_unless_present = "version"
    )]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            print_error(&format!("{:#}", e));
            1
        }
    };

    // stdin is read on a blocking thread that would hold up runtime shutdown.
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    if cli.version {
        println!("{}", BUILD_INFO);
        return Ok(());
    }

    let settings = load_settings(cli.config.as_deref())?;
    let config = session_config(&cli, &settings)?;
    config.validate()?;

    let grace = config.grace_period;
    let (stop, _dispatcher) = spawn_signal_dispatcher(move |reason| {
        tracing::info!(%reason, "Stop requested");
        print_notice(&stop_message(reason, grace.as_secs()));
    })
    .context("Failed to install signal handlers")?;

    tracing::debug!(version = %BUILD_INFO, mode = ?config.mode(), "Starting");
    app::run(&config, &stop).await
}

/// Settings from `--config`, or the default file when it exists
fn load_settings(path: Option<&Path>) -> Result<Settings> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let path = config::default_config_path();
    match config::load_config(&path) {
        Ok(settings) => Ok(settings),
        Err(ConfigError::NotFound(_)) => Ok(Settings::default()),
        Err(e) => Err(e).with_context(|| format!("Failed to load config from {:?}", path)),
    }
}

/// Merge flags over settings
fn session_config(cli: &Cli, settings: &Settings) -> Result<SessionConfig> {
    let command = ChildCommand::try_from(cli.command.clone())?;
    Ok(SessionConfig {
        work_dir: cli
            .workdir
            .clone()
            .unwrap_or_else(|| settings.work_dir.clone()),
        grace_period: cli
            .grace_period
            .map(Duration::from_secs)
            .unwrap_or(settings.grace_period),
        lock: cli.lock,
        wait_for_master: cli.wait_for_master,
        identity: Identity::new(cli.user.clone(), cli.host.clone(), cli.port),
        command,
        poll: settings.poll_settings(),
    })
}
