// HopChat node: TCP transport, console and flood-routing core in one process.

mod config;
mod console;
mod runtime;
mod transport;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hopchat_core::{HopNode, PeerId};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hopchat", version, about = "Peer-to-peer overlay chat node")]
struct Args {
    /// Config file (default: ~/.config/hopchat/config.toml, then /etc/hopchat/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// TCP port to accept neighbor links on.
    #[arg(long)]
    port: Option<u16>,
    /// Display name announced to neighbors.
    #[arg(long)]
    nick: Option<String>,
    /// Overlay id for this session (random when omitted).
    #[arg(long)]
    id: Option<String>,
    /// Neighbor address to dial at startup; repeatable.
    #[arg(long = "connect", value_name = "HOST:PORT")]
    connect: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        cfg.listen_port = port;
    }
    if args.nick.is_some() {
        cfg.nick = args.nick;
    }
    if args.id.is_some() {
        cfg.node_id = args.id;
    }
    cfg.peers.extend(args.connect);

    let local_id = match cfg.node_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => PeerId::from(id),
        _ => PeerId::generate(),
    };
    let node = match cfg.nick.as_deref().map(str::trim) {
        Some(nick) if !nick.is_empty() => {
            HopNode::with_nick(local_id.clone(), nick, cfg.protocol.clone())
        }
        _ => HopNode::new(local_id.clone(), cfg.protocol.clone()),
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.listen_port))
            .await
            .with_context(|| format!("cannot listen on port {}", cfg.listen_port))?;
        tracing::info!(id = %local_id, nick = node.display_name(), port = cfg.listen_port, "node started");
        println!("my id: {local_id} ({})", node.display_name());
        println!("{}", console::HELP);

        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = transport::Transport::new(local_id.clone(), events_tx.clone());
        let listen = transport.clone();
        tokio::spawn(async move {
            if let Err(e) = listen.listen(listener).await {
                tracing::error!(error = %e, "listener stopped");
            }
        });
        for addr in cfg.peers.iter().cloned() {
            transport.dial(addr);
        }
        tokio::spawn(console::run_console(events_tx));

        let liveness = Duration::from_secs(cfg.liveness_interval_secs);
        runtime::Runtime::new(node, transport)
            .run(events_rx, liveness, async {
                if let Err(e) = shutdown_signal().await {
                    tracing::warn!(error = %e, "signal handler failed");
                    std::future::pending::<()>().await;
                }
            })
            .await;
        Ok::<_, anyhow::Error>(())
    })?;
    // stdin reader may still be blocked on a read.
    rt.shutdown_timeout(Duration::from_millis(200));
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
