use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::inspect::inspect_handshake;
use super::session::{Connector, Session, SessionManager};
use crate::relay::relay;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Delay before accepting again after the listener fails
    pub accept_retry_delay: Duration,
    /// Decode and log each SOCKS5 negotiation before relaying
    pub inspect: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            accept_retry_delay: Duration::from_secs(5),
            inspect: false,
        }
    }
}

/// Source of local connections for [`TunnelClient::run`].
#[async_trait]
pub trait LocalListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl LocalListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Accepts local connections and relays each over its own logical stream.
pub struct TunnelClient<C: Connector> {
    sessions: Arc<SessionManager<C>>,
    options: ClientOptions,
}

impl<C> TunnelClient<C>
where
    C: Connector,
    <C::Session as Session>::Stream: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(connector: C, options: ClientOptions) -> Self {
        Self {
            sessions: Arc::new(SessionManager::new(connector)),
            options,
        }
    }

    /// Serves `listener` until the task is dropped.
    ///
    /// Accept errors are logged and retried after a fixed delay; a failure
    /// on one connection never stops the listener.
    pub async fn run<L: LocalListener>(&self, listener: L) {
        match listener.local_addr() {
            Ok(addr) => info!("Listening on {}", addr),
            Err(e) => warn!("Listening on unknown address: {}", e),
        }

        loop {
            let (conn, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(self.options.accept_retry_delay).await;
                    continue;
                }
            };

            debug!("Accepted {}", peer);
            let sessions = self.sessions.clone();
            let inspect = self.options.inspect;
            tokio::spawn(async move { serve(sessions, conn, peer, inspect).await });
        }
    }
}

async fn serve<C>(sessions: Arc<SessionManager<C>>, mut conn: TcpStream, peer: SocketAddr, inspect: bool)
where
    C: Connector,
    <C::Session as Session>::Stream: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = match sessions.open_stream().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("{}: {}", peer, e);
            return;
        }
    };

    if inspect {
        if let Err(e) = inspect_handshake(&mut conn, &mut stream).await {
            warn!("{}: negotiation failed: {}", peer, e);
            return;
        }
    }

    match relay(conn, stream).await {
        Ok((sent, received)) => debug!("{} closed ({} bytes up, {} bytes down)", peer, sent, received),
        Err(e) => debug!("{} closed with error: {}", peer, e),
    }
}
