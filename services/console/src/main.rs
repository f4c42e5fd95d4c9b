//! DataLink console entry point
//!
//! Reads command lines from stdin and dispatches them to a single
//! `MessagingService`; link events are printed as they arrive.

use anyhow::{Context, Result};
use clap::Parser;
use datalink::{
    endpoint_from_settings, CommandOutcome, CommandRegistry, LinkEvent, MessagingService,
    ServiceConfig,
};
use datalink_config::DataLinkConfig;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::thread;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment overlay name (environments/<name>.toml)
    #[arg(long)]
    environment: Option<String>,

    /// Endpoint used by --connect, as <host>:<port>
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Connect attempt budget (0 = unlimited)
    #[arg(long)]
    retries: Option<u32>,

    /// Wire framing: raw or length_prefixed
    #[arg(long)]
    framing: Option<String>,

    /// Connect to the configured endpoint on startup
    #[arg(long)]
    connect: bool,

    /// Log filter, overridden by RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DataLinkConfig::load(args.config.as_deref(), args.environment.as_deref())
        .context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);
    config.expand_env_vars()?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Initialize tracing; stdout belongs to the console
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.console.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting DataLink console");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let service_config =
        ServiceConfig::try_from(&config.link).context("Invalid link configuration")?;
    let service = MessagingService::with_config(service_config);
    service.start().context("Failed to start messaging service")?;

    let events = service.subscribe();
    let printer = thread::Builder::new()
        .name("datalink-events".to_string())
        .spawn(move || {
            for event in events.iter() {
                print_event(&event);
            }
        })
        .context("Failed to spawn event printer")?;

    if args.connect || config.console.auto_connect {
        let endpoint = endpoint_from_settings(&config.link)?;
        service.connect(endpoint)?;
    }

    let registry = CommandRegistry::with_defaults();
    let prompt = config.console.prompt.clone();
    let mut lines = spawn_stdin_reader()?;
    show_prompt(&prompt);

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                let line = line.trim();

                if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
                    break;
                }
                if line.eq_ignore_ascii_case("status") {
                    print_status(&service);
                } else if !line.is_empty() {
                    match registry.dispatch_line(&service, line) {
                        Ok(CommandOutcome::Ignored) => {}
                        Ok(outcome) => println!("{}", outcome),
                        Err(e) => eprintln!("error: {}", e),
                    }
                }
                show_prompt(&prompt);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    service.stop();
    // Dropping the service closes every event channel
    drop(service);
    if printer.join().is_err() {
        error!("Event printer thread panicked");
    }

    info!("DataLink console stopped");
    Ok(())
}

/// Forward stdin lines from a plain thread so shutdown never waits on a read
fn spawn_stdin_reader() -> Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("datalink-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .context("Failed to spawn stdin reader")?;
    Ok(rx)
}

fn apply_overrides(config: &mut DataLinkConfig, args: &Args) {
    if let Some(endpoint) = &args.endpoint {
        config.link.endpoint = endpoint.clone();
    }
    if let Some(retries) = args.retries {
        config.link.max_retry_attempts = retries;
    }
    if let Some(framing) = &args.framing {
        config.link.framing = framing.clone();
    }
    if let Some(level) = &args.log_level {
        config.console.log_level = level.clone();
    }
}

fn show_prompt(prompt: &str) {
    print!("{}", prompt);
    let _ = std::io::stdout().flush();
}

fn print_event(event: &LinkEvent) {
    match event {
        LinkEvent::Connecting { endpoint, attempt } => {
            println!("[link] connecting to {} (attempt {})", endpoint, attempt)
        }
        LinkEvent::ConnectAttemptFailed {
            endpoint,
            attempt,
            error,
        } => println!("[link] attempt {} to {} failed: {}", attempt, endpoint, error),
        LinkEvent::Connected { endpoint, peer } => {
            println!("[link] connected to {} ({})", endpoint, peer)
        }
        LinkEvent::ConnectionFailed { endpoint, attempts } => {
            println!("[link] giving up on {} after {} attempts", endpoint, attempts)
        }
        LinkEvent::Disconnected { peer, reason } => {
            println!("[link] disconnected from {}: {}", peer, reason)
        }
        LinkEvent::PacketReceived(packet) => {
            println!("[recv] {}", String::from_utf8_lossy(packet.as_bytes()))
        }
        LinkEvent::PacketRejected { packet, reason } => {
            println!("[send] dropped {} byte packet: {}", packet.len(), reason)
        }
        LinkEvent::ReceiveError { error } => println!("[recv] error: {}", error),
    }
}

fn print_status(service: &MessagingService) {
    let metrics = service.metrics();
    println!("state:    {:?}", service.state());
    println!("pending:  {}", service.pending_count());
    println!(
        "sent:     {} packets / {} bytes",
        metrics.packets_sent, metrics.bytes_sent
    );
    println!(
        "received: {} packets / {} bytes",
        metrics.packets_received, metrics.bytes_received
    );
    println!(
        "connects: {} ok / {} failed / {} dropped",
        metrics.connections, metrics.connect_failures, metrics.disconnects
    );
}
