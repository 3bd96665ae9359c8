//! Tunnel transport between proxy client and proxy server.
//!
//! The tunnel is a WebSocket connection, so on the wire it looks like an
//! ordinary HTTP request that was upgraded. Both ends turn the socket into
//! a plain byte stream for the multiplexer to run over.

mod websocket;
mod ws_stream;

use tokio::io::{AsyncRead, AsyncWrite};

pub use websocket::{WsAcceptor, WsDialer};
pub use ws_stream::WsByteStream;

/// A duplex byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn AsyncStream>;
