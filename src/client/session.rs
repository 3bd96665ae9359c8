use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{DialError, MuxError, SessionError};
use crate::mux::{LogicalStream, MuxClient, MuxConfig};
use crate::transport::WsDialer;

/// One established tunnel together with its multiplexer.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    type Stream: Send + 'static;

    /// Opens a logical stream. Safe to call from many tasks at once.
    async fn open(&self) -> Result<Self::Stream, MuxError>;

    /// Tears down the multiplexer and the tunnel.
    async fn close(&self);
}

/// Creates new sessions on demand.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    async fn connect(&self) -> Result<Self::Session, DialError>;
}

/// Manages the single shared session of a client.
///
/// Creating and tearing down the session is serialized behind a lock.
/// Opening streams on an established session is not.
pub struct SessionManager<C: Connector> {
    connector: C,
    current: Mutex<Option<Arc<C::Session>>>,
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            current: Mutex::new(None),
        }
    }

    /// Opens a logical stream, creating the session first if there is none.
    ///
    /// A failed open tears the session down, so the next call reconnects.
    /// Hitting the stream limit only fails this one call.
    pub async fn open_stream(&self) -> Result<<C::Session as Session>::Stream, SessionError> {
        let session = self.session().await?;

        match session.open().await {
            Ok(stream) => Ok(stream),
            Err(e) if !e.is_fatal() => {
                warn!("Failed to open stream, keeping session: {}", e);
                Err(SessionError::StreamOpen(e))
            }
            Err(e) => {
                warn!("Failed to open stream, dropping session: {}", e);
                self.teardown(&session).await;
                Err(SessionError::StreamOpen(e))
            }
        }
    }

    /// Whether a session is currently established.
    pub async fn is_connected(&self) -> bool {
        self.current.lock().await.is_some()
    }

    async fn session(&self) -> Result<Arc<C::Session>, DialError> {
        let mut current = self.current.lock().await;

        if let Some(session) = current.as_ref() {
            return Ok(session.clone());
        }

        let session = Arc::new(self.connector.connect().await?);
        info!("Session established");
        *current = Some(session.clone());

        Ok(session)
    }

    async fn teardown(&self, failed: &Arc<C::Session>) {
        let mut current = self.current.lock().await;

        // Another caller may already have replaced the failed session
        if current.as_ref().is_some_and(|s| Arc::ptr_eq(s, failed)) {
            *current = None;
            debug!("Session cleared");
        }
        drop(current);

        failed.close().await;
    }
}

/// Dials the tunnel and starts a client multiplexer over it.
pub struct TunnelConnector {
    dialer: WsDialer,
    mux_config: MuxConfig,
}

impl TunnelConnector {
    pub fn new(dialer: WsDialer, mux_config: MuxConfig) -> Self {
        Self { dialer, mux_config }
    }
}

#[async_trait]
impl Connector for TunnelConnector {
    type Session = MuxClient;

    async fn connect(&self) -> Result<MuxClient, DialError> {
        let tunnel = self.dialer.dial().await?;
        Ok(MuxClient::new(tunnel, &self.mux_config))
    }
}

#[async_trait]
impl Session for MuxClient {
    type Stream = LogicalStream;

    async fn open(&self) -> Result<LogicalStream, MuxError> {
        MuxClient::open(self).await
    }

    async fn close(&self) {
        MuxClient::close(self)
    }
}
