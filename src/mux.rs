//! Stream multiplexing over a single tunnel using yamux.
//!
//! A yamux connection only makes progress while it is polled, so each one
//! is owned by a background driver task. The handles below talk to the
//! driver over channels:
//! - [`MuxClient`] opens outbound logical streams and may be cloned and
//!   used from many tasks at once
//! - [`MuxServer`] yields the logical streams opened by the remote side

use std::future::poll_fn;
use std::task::Poll;

use futures_util::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use tracing::debug;
use yamux::{Connection, ConnectionError, Mode};

use crate::error::MuxError;
use crate::transport::BoxedStream;

/// A logical stream, usable with tokio I/O.
pub type LogicalStream = Compat<yamux::Stream>;

#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Maximum number of concurrently open streams per tunnel
    pub max_streams: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self { max_streams: 65536 }
    }
}

/// Initial receive window yamux grants every stream.
const STREAM_WINDOW: usize = 256 * 1024;

impl MuxConfig {
    fn to_yamux(&self) -> yamux::Config {
        // yamux requires room for the initial window of every stream
        let max_streams = self.max_streams.clamp(1, usize::MAX / STREAM_WINDOW);
        let window = (max_streams * STREAM_WINDOW).max(1024 * 1024 * 1024);

        let mut config = yamux::Config::default();
        config.set_max_connection_receive_window(Some(window));
        config.set_max_num_streams(max_streams);
        config
    }
}

type OpenReply = oneshot::Sender<Result<yamux::Stream, ConnectionError>>;

enum Command {
    Open(OpenReply),
    Close,
}

/// Client role handle over a tunnel.
#[derive(Clone)]
pub struct MuxClient {
    commands: mpsc::UnboundedSender<Command>,
}

impl MuxClient {
    pub fn new(io: BoxedStream, config: &MuxConfig) -> Self {
        let connection = Connection::new(io.compat(), config.to_yamux(), Mode::Client);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(connection, commands_rx, None));

        Self { commands }
    }

    /// Opens a new logical stream.
    pub async fn open(&self) -> Result<LogicalStream, MuxError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Open(reply))
            .map_err(|_| MuxError::Closed)?;

        match response.await.map_err(|_| MuxError::Closed)? {
            Ok(stream) => Ok(stream.compat()),
            Err(ConnectionError::TooManyStreams) => Err(MuxError::StreamLimit),
            Err(e) => Err(e.into()),
        }
    }

    /// Closes the multiplexer and the tunnel beneath it.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

/// Server role handle over a tunnel.
pub struct MuxServer {
    commands: mpsc::UnboundedSender<Command>,
    inbound: mpsc::UnboundedReceiver<yamux::Stream>,
}

impl MuxServer {
    pub fn new(io: BoxedStream, config: &MuxConfig) -> Self {
        let connection = Connection::new(io.compat(), config.to_yamux(), Mode::Server);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        tokio::spawn(drive(connection, commands_rx, Some(inbound_tx)));

        Self { commands, inbound }
    }

    /// Waits for the remote side to open a logical stream.
    ///
    /// Fails once the remote closes the tunnel or the tunnel breaks.
    pub async fn accept_stream(&mut self) -> Result<LogicalStream, MuxError> {
        self.inbound
            .recv()
            .await
            .map(|stream| stream.compat())
            .ok_or(MuxError::Closed)
    }

    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

enum Exit {
    Local,
    Remote,
    Failed(ConnectionError),
}

async fn drive<T>(
    mut connection: Connection<T>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    inbound: Option<mpsc::UnboundedSender<yamux::Stream>>,
) where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut pending_open: Option<OpenReply> = None;

    let exit = poll_fn(|cx| {
        // Outbound opens are served one at a time, in request order
        loop {
            if pending_open.is_none() {
                match commands.poll_recv(cx) {
                    Poll::Ready(Some(Command::Open(reply))) => pending_open = Some(reply),
                    Poll::Ready(Some(Command::Close)) | Poll::Ready(None) => return Poll::Ready(Exit::Local),
                    Poll::Pending => break,
                }
            }

            let Some(reply) = pending_open.take() else {
                break;
            };
            match connection.poll_new_outbound(cx) {
                Poll::Ready(result) => {
                    let _ = reply.send(result);
                }
                Poll::Pending => {
                    pending_open = Some(reply);
                    break;
                }
            }
        }

        // Polling inbound is what drives the connection's I/O
        loop {
            match connection.poll_next_inbound(cx) {
                Poll::Ready(Some(Ok(stream))) => match &inbound {
                    Some(tx) => {
                        if tx.send(stream).is_err() {
                            return Poll::Ready(Exit::Local);
                        }
                    }
                    None => debug!("Dropping unexpected inbound stream"),
                },
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Exit::Failed(e)),
                Poll::Ready(None) => return Poll::Ready(Exit::Remote),
                Poll::Pending => return Poll::Pending,
            }
        }
    })
    .await;

    match exit {
        Exit::Local => {
            if let Err(e) = poll_fn(|cx| connection.poll_close(cx)).await {
                debug!("Error while closing multiplexer: {}", e);
            }
            debug!("Multiplexer closed");
        }
        Exit::Remote => debug!("Multiplexer closed by remote"),
        Exit::Failed(e) => debug!("Multiplexer connection failed: {}", e),
    }
}
