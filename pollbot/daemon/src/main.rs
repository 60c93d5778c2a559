//! Pollbot Daemon - Reaction Poll Command Server
//!
//! Entry point for the poll daemon. It owns the Discord client, the poll
//! registry and the chart renderer, and answers `poll` / `pollresults`
//! commands that front ends send over a Unix socket.
//!
//! The socket is the daemon's only entry point. It holds no gateway
//! connection and serves no interactions endpoint, so `/poll` invocations
//! reach it only through a front end that relays them as
//! `CommandPayload::Poll` requests. `--register-commands` installs the `/poll`
//! definition for such a deployment and exits without serving.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (token from POLLBOT_DISCORD_TOKEN)
//! pollbot-daemon
//!
//! # Custom socket path
//! pollbot-daemon --socket-path /tmp/pollbot.sock
//!
//! # With config file and a persistent poll store
//! pollbot-daemon --config ~/.config/pollbot/pollbot.toml --store ~/.local/share/pollbot/polls.json
//!
//! # Daemonize (run in background)
//! pollbot-daemon --daemonize
//!
//! # One-off: register /poll for a relaying front end (needs [discord].application_id)
//! pollbot-daemon --register-commands
//!
//! # Verbose logging
//! RUST_LOG=debug pollbot-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown
//! - `SIGHUP`: Logged; configuration is read once at startup

mod server;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use pollbot_core::transport::default_pid_path;
use pollbot_core::{
    default_config_path, load_config_from_path, ChannelId, ConfigOverrides, DiscordClient,
    JsonFileStore, PieChartRenderer, PollRegistry, PollService, PollbotConfig,
};

use server::{DaemonServer, ServerConfig};

/// Pollbot Daemon - reaction poll command server
#[derive(Parser, Debug)]
#[command(name = "pollbot-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Unix socket path for front-end connections
    #[arg(short = 's', long, env = "POLLBOT_SOCKET", value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "POLLBOT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run as daemon (fork to background)
    #[arg(short = 'd', long)]
    daemonize: bool,

    /// PID file path
    #[arg(long, env = "POLLBOT_PID_FILE", value_name = "PATH")]
    pid_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "POLLBOT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// JSON file to persist polls in (in-memory when unset)
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Channel id that receives a notice for every new poll
    #[arg(long, value_name = "CHANNEL_ID")]
    announce_channel: Option<u64>,

    /// Maximum simultaneous connections
    #[arg(long, value_name = "N")]
    max_connections: Option<usize>,

    /// Register the /poll slash command for a relaying front end, then exit
    #[arg(long)]
    register_commands: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref path) = self.socket_path {
            overrides = overrides.with_socket_path(path.clone());
        }
        if let Some(ref path) = self.store {
            overrides = overrides.with_store_path(path.clone());
        }
        if let Some(channel) = self.announce_channel {
            overrides = overrides.with_announcement_channel(ChannelId(channel));
        }
        if let Some(max) = self.max_connections {
            overrides = overrides.with_max_connections(max);
        }
        overrides
    }
}

/// Load file and environment config, then apply CLI flags on top
fn resolve_config(args: &Args) -> Result<PollbotConfig> {
    let path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Write PID file
fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create PID directory: {parent:?}"))?;
    }

    let pid = std::process::id();
    let mut file =
        fs::File::create(path).with_context(|| format!("Failed to create PID file: {path:?}"))?;
    writeln!(file, "{pid}")?;

    info!(pid = pid, path = ?path, "PID file created");
    Ok(())
}

/// Remove PID file
fn remove_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = ?path, "Failed to remove PID file");
        } else {
            info!(path = ?path, "PID file removed");
        }
    }
}

/// Refuse to start if the PID file names a live process
fn check_existing_daemon(pid_path: &Path) -> Result<()> {
    if !pid_path.exists() {
        return Ok(());
    }

    let pid_str = fs::read_to_string(pid_path)
        .with_context(|| format!("Failed to read PID file: {pid_path:?}"))?;

    let pid: i32 = pid_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid PID in {pid_path:?}"))?;

    // Signal 0 only checks that the process exists
    // SAFETY: kill with signal 0 sends nothing
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        anyhow::bail!(
            "Another pollbot-daemon is already running (PID: {pid}). \
             Stop it first or remove {pid_path:?} if it's stale."
        );
    }

    warn!(pid = pid, "Removing stale PID file");
    fs::remove_file(pid_path)?;
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "pollbot_daemon={level},pollbot_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Daemonize the process (fork to background)
///
/// Must run before the async runtime starts its worker threads.
fn daemonize() -> Result<()> {
    use nix::unistd::{fork, setsid, ForkResult};

    // SAFETY: no other threads exist yet
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => {}
        Err(e) => anyhow::bail!("First fork failed: {e}"),
    }

    setsid().context("setsid failed")?;

    // Second fork so the daemon can never reacquire a controlling terminal
    // SAFETY: still single-threaded
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => {}
        Err(e) => anyhow::bail!("Second fork failed: {e}"),
    }

    Ok(())
}

fn discord_client(config: &PollbotConfig) -> Result<DiscordClient> {
    let token = config.discord_token.clone().context(
        "No Discord token configured: set POLLBOT_DISCORD_TOKEN or [discord].token",
    )?;
    DiscordClient::new(token, &config.api_base, config.request_timeout)
        .context("Failed to create Discord client")
}

/// Install the `/poll` definition for the configured application
async fn register_commands(config: &PollbotConfig) -> Result<()> {
    let application_id = config.application_id.context(
        "No application id configured: set POLLBOT_APPLICATION_ID or [discord].application_id",
    )?;
    let discord = discord_client(config)?;
    discord
        .register_commands(application_id)
        .await
        .context("Slash command registration failed")
}

/// Build the poll service from configuration
///
/// Makes no platform calls; the first request to Discord is the first command.
async fn build_service(config: &PollbotConfig) -> Result<PollService> {
    let discord = discord_client(config)?;

    let registry = match config.store_path {
        Some(ref path) => {
            let store = JsonFileStore::open(path)
                .await
                .with_context(|| format!("Failed to open poll store: {path:?}"))?;
            PollRegistry::with_store(Arc::new(store))
        }
        None => PollRegistry::in_memory(),
    };
    info!(
        store = registry.store_name(),
        polls = registry.count().await.unwrap_or_default(),
        "Poll registry ready"
    );

    let chart = PieChartRenderer::new(config.chart_width, config.chart_height);

    Ok(PollService::new(registry, Arc::new(discord), Arc::new(chart))
        .with_announcement_channel(config.announcement_channel)
        .with_command_prefix(config.command_prefix.clone()))
}

/// Install signal handlers; returns the shutdown flag
fn install_signal_handlers() -> Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating shutdown");
                    flag.store(true, Ordering::SeqCst);
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating shutdown");
                    flag.store(true, Ordering::SeqCst);
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP; configuration is only read at startup, restart to apply changes");
                }
            }
        }
    });

    Ok(shutdown)
}

async fn serve(config: PollbotConfig) -> Result<()> {
    let service = build_service(&config).await?;
    let shutdown = install_signal_handlers()?;

    let server = DaemonServer::bind(
        ServerConfig {
            socket_path: config.socket_path.clone(),
            max_connections: config.max_connections,
        },
        service,
    )?;

    server.run(shutdown).await
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Pollbot Daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args)?;

    if args.register_commands {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        return runtime.block_on(register_commands(&config));
    }

    let pid_path = args.pid_file.clone().unwrap_or_else(default_pid_path);

    info!(config = ?config, "Configuration loaded");
    info!(pid_path = ?pid_path, "PID file path");

    check_existing_daemon(&pid_path)?;

    if args.daemonize {
        info!("Daemonizing...");
        daemonize()?;
        info!("Daemonized, new PID: {}", std::process::id());
    }

    write_pid_file(&pid_path)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(serve(config));

    info!("Shutting down...");
    remove_pid_file(&pid_path);

    match result {
        Ok(()) => {
            info!("Pollbot daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}
