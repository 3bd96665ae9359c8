//! http2socks
//!
//! Runs either end of the tunnel:
//! - `client` accepts local SOCKS5 connections and relays each over the tunnel
//! - `server` accepts tunnels and proxies their streams to the destinations

#![deny(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::style)]
#![warn(clippy::complexity)]
#![warn(clippy::perf)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use http2socks::client::{TunnelClient, TunnelConnector};
use http2socks::config::Config;
use http2socks::server::{Socks5Backend, TunnelServer};
use http2socks::transport::{WsAcceptor, WsDialer};

#[derive(Parser, Debug)]
#[command(name = "http2socks")]
#[command(author, version, about = "SOCKS5 proxy over a multiplexed HTTP tunnel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Accept local SOCKS5 connections and relay them through the tunnel
    Client(ClientArgs),

    /// Accept tunnels and proxy their connections
    Server(ServerArgs),
}

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Local listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Tunnel server URL
    #[arg(short, long, env = "HTTP2SOCKS_SERVER")]
    server: Option<String>,

    /// Shared tunnel token
    #[arg(short, long, env = "HTTP2SOCKS_TOKEN")]
    token: Option<String>,

    /// Decode and log each SOCKS5 negotiation
    #[arg(long)]
    inspect: bool,
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Tunnel listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Shared tunnel token
    #[arg(short, long, env = "HTTP2SOCKS_TOKEN")]
    token: Option<String>,

    /// HTTP path of the tunnel endpoint
    #[arg(long)]
    path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Client(args) => run_client(args, config).await,
        Commands::Server(args) => run_server(args, config).await,
    }
}

async fn run_client(args: ClientArgs, config: Config) -> Result<()> {
    let listen = args.listen.unwrap_or(config.client.listen.clone());
    let server = args.server.unwrap_or(config.client.server.clone());
    let token = args.token.unwrap_or(config.client.token.clone());

    let mut options = config.client.options();
    options.inspect |= args.inspect;

    let dialer = WsDialer::new(&server, &token, &config.server.path)
        .with_context(|| format!("Invalid server address: {}", server))?;
    info!("Using tunnel {}", dialer.url());

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to listen on {}", listen))?;

    let client = TunnelClient::new(TunnelConnector::new(dialer, config.mux.to_mux_config()), options);

    tokio::select! {
        _ = client.run(listener) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to wait for Ctrl-C")?;
            info!("Shutting down");
        }
    }

    Ok(())
}

async fn run_server(args: ServerArgs, config: Config) -> Result<()> {
    let listen = args.listen.unwrap_or(config.server.listen.clone());
    let token = args.token.unwrap_or(config.server.token.clone());
    let path = args.path.unwrap_or(config.server.path.clone());

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to listen on {}", listen))?;

    let server = TunnelServer::new(
        WsAcceptor::new(&token, &path),
        Socks5Backend::new(config.server.connect_timeout()),
        config.mux.to_mux_config(),
    );

    tokio::select! {
        _ = server.run(listener) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to wait for Ctrl-C")?;
            info!("Shutting down");
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
