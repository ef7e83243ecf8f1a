//! NextGCore UPF (User Plane Function) - PFCP control plane
//!
//! The UPF side of the N4 interface:
//! - PFCP node association and heartbeat with the SMF
//! - Reliable PFCP transactions (retransmission, duplicate detection)
//! - Session establishment, modification, deletion and reporting
//! - Global UPF counters, optionally exposed over HTTP

pub mod config;
pub mod context;
pub mod event;
pub mod metrics;
pub mod n4_build;
pub mod n4_handler;
pub mod pfcp_path;
pub mod pfcp_sm;
pub mod timer;
pub mod upf_sm;


use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use ogs_metrics::{MetricsContext, MetricsServer};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Notify};

use config::{SockEntry, UpfConfig};
use context::UpfContext;
use event::{EventQueue, UpfEvent};
use metrics::{UpfMetrics, UPF_METR_GLOB_CTR_SM_N4SESSIONESTABREQ};
use pfcp_path::{pfcp_close, pfcp_open, pfcp_readable, pfcp_recv};

/// PFCP address used when neither the config file nor the command line
/// names one
const DEFAULT_PFCP_ADDR: &str = "127.0.0.4";

/// NextGCore UPF - User Plane Function
#[derive(Parser, Debug)]
#[command(name = "nextgcore-upfd")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "5G Core User Plane Function", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, default_value = "/etc/nextgcore/upf.yaml")]
    config: String,

    /// Log file path
    #[arg(short = 'l', long)]
    log_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'e', long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(short = 'm', long)]
    no_color: bool,

    /// Kill running instance
    #[arg(short = 'k', long)]
    kill: bool,

    /// PFCP server IPv4 address (replaces the configured servers)
    #[arg(long)]
    pfcp_addr: Option<String>,

    /// PFCP server IPv6 address (replaces the configured servers)
    #[arg(long)]
    pfcp_addr6: Option<String>,

    /// PFCP server port
    #[arg(long)]
    pfcp_port: Option<u16>,

    /// Maximum number of sessions
    #[arg(long)]
    max_sessions: Option<usize>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    log::info!("NextGCore UPF v{} starting...", env!("CARGO_PKG_VERSION"));

    if args.kill {
        log::info!("Kill flag set - would send SIGTERM to running instance");
        return Ok(());
    }

    let shutdown = Arc::new(Notify::new());
    setup_signal_handlers(shutdown.clone())?;

    let (mut config, metrics_config) = UpfConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config))?;
    apply_args(&args, &mut config);
    let servers = config
        .pfcp_servers()
        .context("Invalid PFCP server address")?;
    let peers = config.smf_peers().context("Invalid SMF address")?;

    let metrics =
        UpfMetrics::new(MetricsContext::new()).context("Failed to register UPF metrics")?;
    for addr in &metrics_config.servers {
        let server = MetricsServer::bind(*addr, metrics.context().clone())
            .await
            .with_context(|| format!("Failed to open metrics server {}", addr))?;
        tokio::spawn(server.run());
    }

    let pfcp_addr = servers
        .first()
        .map(SocketAddr::ip)
        .unwrap_or(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 4)));
    let mut ctx = UpfContext::new(config, metrics, pfcp_addr);

    let socks = pfcp_open(&servers).await.context("Failed to open PFCP path")?;
    let (queue, mut rx) = EventQueue::new(ctx.config.queue_size);

    let now = Instant::now();
    for peer in peers {
        let Some(idx) = servers.iter().position(|s| s.is_ipv4() == peer.is_ipv4()) else {
            log::warn!("No PFCP socket for SMF [{}]", peer);
            continue;
        };
        ctx.pfcp.nodes.add(peer, idx, true);
        upf_sm::pfcp_node_fsm_init(&mut ctx, &socks[..], peer, now);
    }

    log::info!("NextGCore UPF ready");

    run_event_loop(&mut ctx, &socks, &queue, &mut rx, &shutdown).await;

    log::info!("Shutting down...");
    pfcp_close(&mut ctx, socks, Instant::now());
    log::info!(
        "{} N4 session establishment request(s) served",
        ctx.metrics
            .value(UPF_METR_GLOB_CTR_SM_N4SESSIONESTABREQ)
            .unwrap_or_default()
    );

    log::info!("NextGCore UPF stopped");
    Ok(())
}

/// Initialize logging based on command line arguments
fn init_logging(args: &Args) -> Result<()> {
    let mut builder = env_logger::Builder::new();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    builder.filter_level(level);

    builder.format_timestamp_millis();

    if args.no_color {
        builder.write_style(env_logger::WriteStyle::Never);
    }

    if let Some(path) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file {}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
        builder.write_style(env_logger::WriteStyle::Never);
    }

    builder.init();

    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<Notify>) -> Result<()> {
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        shutdown.notify_one();
    })
    .context("Failed to set Ctrl+C handler")?;

    Ok(())
}

/// Command line values take precedence over the config file
fn apply_args(args: &Args, config: &mut UpfConfig) {
    let overrides: Vec<SockEntry> = [&args.pfcp_addr, &args.pfcp_addr6]
        .into_iter()
        .flatten()
        .map(|addr| SockEntry::new(addr.as_str(), args.pfcp_port))
        .collect();

    if !overrides.is_empty() {
        config.pfcp.server = overrides;
    } else if let Some(port) = args.pfcp_port {
        for entry in &mut config.pfcp.server {
            entry.port = Some(port);
        }
    }

    if config.pfcp.server.is_empty() {
        config
            .pfcp
            .server
            .push(SockEntry::new(DEFAULT_PFCP_ADDR, args.pfcp_port));
    }

    if let Some(max_sessions) = args.max_sessions {
        config.max.sessions = max_sessions;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// Single-threaded event loop: socket readiness, queued events and timer
/// expiry are each handled to completion before the next wait.
async fn run_event_loop(
    ctx: &mut UpfContext,
    socks: &[UdpSocket],
    queue: &EventQueue,
    rx: &mut mpsc::Receiver<UpfEvent>,
    shutdown: &Notify,
) {
    log::debug!("Entering event loop");

    loop {
        let deadline = ctx.pfcp.next_deadline();

        tokio::select! {
            _ = shutdown.notified() => break,

            ready = pfcp_readable(socks) => match ready {
                Ok(idx) => {
                    pfcp_recv(ctx, socks, idx, queue, Instant::now());
                }
                Err(e) => log::error!("poll_recv_ready() failed: {}", e),
            },

            Some(event) = rx.recv() => {
                upf_sm::dispatch(ctx, socks, event, Instant::now());
            }

            _ = sleep_until_deadline(deadline) => {
                let now = Instant::now();
                for timer in ctx.pfcp.expire(now) {
                    upf_sm::dispatch(ctx, socks, UpfEvent::N4Timer(timer), now);
                }
            }
        }
    }

    log::debug!("Exiting event loop");
}
