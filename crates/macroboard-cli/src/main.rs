//! macroboard CLI: host, discover and drive network macro boards.

mod console;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use macroboard_board::MacroBoard;
use macroboard_registry::{
    open_device, DeviceContext, DeviceStateReport, DeviceStateSource, RegistryError,
};
use macroboard_remote::{setup, BoardHost, BoardListener, Config, HostIdentity};
use macroboard_types::BoardEvent;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::console::ConsoleBoard;

#[derive(Parser)]
#[command(
    name = "macroboard",
    about = "Share macro boards over the network",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host a console board that remote clients can drive.
    Host {
        /// Local address to accept control connections on.
        #[arg(long)]
        bind: Option<String>,

        /// TCP port, 0 lets the OS choose.
        #[arg(long)]
        port: Option<u16>,

        /// Device name advertised to listeners.
        #[arg(long)]
        name: Option<String>,
    },

    /// List board hosts on the network.
    Discover {
        /// How long to listen.
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },

    /// Open a board host and print its key events.
    Open {
        /// Only open a board whose name contains this text.
        #[arg(long)]
        name: Option<String>,

        /// Set the brightness after opening (0-100).
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        brightness: Option<u8>,

        /// Show the logo after opening.
        #[arg(long)]
        logo: bool,
    },

    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = setup::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    match cli.command {
        Commands::Host { bind, port, name } => run_host(config, bind, port, name).await,
        Commands::Discover { seconds } => run_discover(&config, Duration::from_secs(seconds)).await,
        Commands::Open {
            name,
            brightness,
            logo,
        } => run_open(&config, name, brightness, logo).await,
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run_host(
    mut config: Config,
    bind: Option<String>,
    port: Option<u16>,
    name: Option<String>,
) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.host.bind = bind;
    }
    if let Some(port) = port {
        config.host.port = port;
    }
    if let Some(name) = name {
        config.host.device_name = name;
    }

    let board = Arc::new(ConsoleBoard::new(config.layout.to_layout()?));
    let identity = HostIdentity {
        device_name: config.host.device_name.clone(),
        serial_number: setup::serial_number_or_generate(&config.host.serial_number),
        firmware_version: config.host.firmware_version.clone(),
    };
    let host = BoardHost::start(
        board.clone(),
        config.host.bind_addr()?,
        &config.discovery.to_discovery_config()?,
        &identity,
    )
    .await
    .context("failed to start board host")?;

    println!(
        "Hosting \"{}\" ({} keys) on {}",
        identity.device_name,
        board.keys().count(),
        host.local_addr()
    );
    println!("Type `press <key>` or `release <key>`, Ctrl-C to stop.");

    let lines = console::spawn_stdin_reader().context("failed to start stdin reader")?;
    let input = {
        let board = board.clone();
        tokio::spawn(async move { board.run_input(lines).await })
    };
    tokio::signal::ctrl_c().await?;

    input.abort();
    host.shutdown().await;
    board.shutdown().await;
    Ok(())
}

fn print_report(report: &DeviceStateReport) {
    let state = if report.connected { "connected" } else { "disconnected" };
    let new = if report.is_new_device { " (new)" } else { "" };
    println!(
        "{:<24} {:<28} {} keys  {state}{new}",
        report.device.name(),
        report.device.id(),
        report.device.keys().count()
    );
}

fn start_context(config: &Config) -> anyhow::Result<DeviceContext> {
    let listener = BoardListener::start(
        &config.discovery.to_discovery_config()?,
        config.client.to_options(),
    )
    .context("failed to start discovery")?;
    Ok(DeviceContext::new().with_source(Arc::new(listener), true))
}

async fn run_discover(config: &Config, duration: Duration) -> anyhow::Result<()> {
    let context = start_context(config)?;
    let subscription = context.subscribe(Arc::new(print_report));

    tokio::select! {
        () = tokio::time::sleep(duration) => {}
        result = tokio::signal::ctrl_c() => result?,
    }

    subscription.unsubscribe();
    let found = context.known_devices().len();
    context.close().await;
    println!("{found} board(s) seen");
    Ok(())
}

async fn run_open(
    config: &Config,
    name: Option<String>,
    brightness: Option<u8>,
    logo: bool,
) -> anyhow::Result<()> {
    let context = start_context(config)?;
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    println!("Waiting for a board...");
    let board = match open_device(
        &context,
        move |d| name.as_deref().map_or(true, |n| d.name().contains(n)),
        &cancel,
    )
    .await
    {
        Ok(board) => board,
        Err(RegistryError::Cancelled) => {
            context.close().await;
            return Ok(());
        }
        Err(e) => {
            context.close().await;
            return Err(e.into());
        }
    };
    println!("Opened board with {} keys, Ctrl-C to stop.", board.keys().count());

    if let Some(percent) = brightness {
        board.set_brightness(percent).await?;
    }
    if logo {
        board.show_logo().await?;
    }

    let mut events = board.events();
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(BoardEvent::Key(key)) => {
                println!("key {:>3} {}", key.key, if key.is_down { "down" } else { "up" });
            }
            Ok(BoardEvent::Connection(connected)) => {
                println!("{}", if connected { "connected" } else { "connection lost" });
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    board.shutdown().await;
    context.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_open_arguments() {
        let cli = Cli::parse_from(["macroboard", "open", "--name", "desk", "--brightness", "40", "--logo"]);
        match cli.command {
            Commands::Open {
                name,
                brightness,
                logo,
            } => {
                assert_eq!(name.as_deref(), Some("desk"));
                assert_eq!(brightness, Some(40));
                assert!(logo);
            }
            _ => panic!("expected open"),
        }
    }

    #[test]
    fn brightness_above_range_is_rejected() {
        assert!(Cli::try_parse_from(["macroboard", "open", "--brightness", "101"]).is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["macroboard", "discover", "--config", "/tmp/x.toml"]);
        assert_eq!(cli.config.as_deref(), Some("/tmp/x.toml"));
    }
}
