//! Tunnel server implementation.
//!
//! This module provides the server side of the proxy:
//! - [`TunnelServer`] - Accepts tunnel upgrades and serves each tunnel
//! - [`ProxyBackend`] - Terminates logical streams, [`Socks5Backend`] being
//!   the built-in one

mod backend;
mod session;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::mux::MuxConfig;
use crate::transport::WsAcceptor;

pub use backend::{ProxyBackend, Socks5Backend};
pub use session::serve_tunnel;

/// Accepts tunnels and dispatches their logical streams to a backend.
pub struct TunnelServer<B: ProxyBackend> {
    acceptor: WsAcceptor,
    backend: Arc<B>,
    mux_config: MuxConfig,
    accept_retry_delay: Duration,
}

impl<B: ProxyBackend> TunnelServer<B> {
    pub fn new(acceptor: WsAcceptor, backend: B, mux_config: MuxConfig) -> Self {
        Self {
            acceptor,
            backend: Arc::new(backend),
            mux_config,
            accept_retry_delay: Duration::from_secs(1),
        }
    }

    /// Serves `listener` until the task is dropped.
    pub async fn run(&self, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("Tunnel server listening on {}", addr),
            Err(e) => warn!("Tunnel server listening on unknown address: {}", e),
        }

        loop {
            let (conn, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(self.accept_retry_delay).await;
                    continue;
                }
            };

            let acceptor = self.acceptor.clone();
            let backend = self.backend.clone();
            let mux_config = self.mux_config.clone();
            tokio::spawn(async move {
                let tunnel = match acceptor.accept(conn).await {
                    Ok(tunnel) => tunnel,
                    Err(e) => {
                        warn!("{}: tunnel handshake failed: {}", peer, e);
                        return;
                    }
                };

                info!("Tunnel opened by {}", peer);
                serve_tunnel(tunnel, &mux_config, backend).await;
                debug!("Tunnel from {} closed", peer);
            });
        }
    }
}
