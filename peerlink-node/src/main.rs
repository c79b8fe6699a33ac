// PeerLink: serverless LAN chat and file transfer.

mod shell;

use std::path::PathBuf;

use anyhow::Context;
use peerlink_node::{config, Node};
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "\
usage: peerlink [--port N] [--nickname NAME] [--config PATH] [--no-discovery]
       peerlink --version";

#[derive(Debug, Default)]
struct Args {
    port: Option<u16>,
    nickname: Option<String>,
    config: Option<PathBuf>,
    no_discovery: bool,
}

fn parse_args(mut it: impl Iterator<Item = String>) -> anyhow::Result<Option<Args>> {
    let mut args = Args::default();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("peerlink {}", VERSION);
                return Ok(None);
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                return Ok(None);
            }
            "--port" | "-p" => {
                let v = it.next().context("--port needs a value")?;
                args.port = Some(v.parse().with_context(|| format!("invalid port: {}", v))?);
            }
            "--nickname" | "-n" => {
                args.nickname = Some(it.next().context("--nickname needs a value")?);
            }
            "--config" | "-c" => {
                args.config = Some(PathBuf::from(it.next().context("--config needs a value")?));
            }
            "--no-discovery" => args.no_discovery = true,
            other => anyhow::bail!("unknown argument: {}\n{}", other, USAGE),
        }
    }
    Ok(Some(args))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Some(args) = parse_args(std::env::args().skip(1))? else {
        return Ok(());
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,peerlink_node=info,peerlink=info")),
        )
        .init();

    let mut cfg = config::load(args.config.as_deref());
    if let Some(port) = args.port {
        cfg.listen_port = port;
    }
    if let Some(nickname) = args.nickname {
        cfg.nickname = nickname;
    }
    if args.no_discovery {
        cfg.discovery_enabled = false;
    }

    let (node, mut events) = Node::start(cfg).await?;
    let me = node.identity();
    println!(
        "peerlink {} | {} ({}) listening on {}:{}",
        VERSION, me.nickname, me.peer_id, me.ip, me.port
    );
    println!("type /help for commands");

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", event);
        }
    });

    tokio::select! {
        _ = shell::run(&node) => {}
        res = shutdown_signal() => res?,
    }
    info!("Exiting");
    node.shutdown().await;
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
