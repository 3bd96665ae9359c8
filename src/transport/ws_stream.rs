use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Sink, Stream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// Presents a WebSocket as a plain byte stream.
///
/// Writes go out as binary messages. Reads concatenate message payloads
/// and report end-of-stream on a close frame or when the socket ends.
pub struct WsByteStream<S> {
    inner: WebSocketStream<S>,
    read_buffer: Vec<u8>,
    read_offset: usize,
    read_closed: bool,
}

impl<S> WsByteStream<S> {
    pub fn new(inner: WebSocketStream<S>) -> Self {
        Self {
            inner,
            read_buffer: Vec::new(),
            read_offset: 0,
            read_closed: false,
        }
    }

    fn drain_buffer(&mut self, buf: &mut ReadBuf<'_>) {
        let remaining = &self.read_buffer[self.read_offset..];
        let to_copy = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_copy]);
        self.read_offset += to_copy;

        if self.read_offset >= self.read_buffer.len() {
            self.read_buffer.clear();
            self.read_offset = 0;
        }
    }
}

fn to_io_error(e: WsError) -> io::Error {
    match e {
        WsError::Io(e) => e,
        WsError::ConnectionClosed | WsError::AlreadyClosed => io::Error::from(io::ErrorKind::BrokenPipe),
        other => io::Error::other(other),
    }
}

impl<S> AsyncRead for WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            if self.read_offset < self.read_buffer.len() {
                self.drain_buffer(buf);
                return Poll::Ready(Ok(()));
            }

            if self.read_closed {
                return Poll::Ready(Ok(()));
            }

            let data = match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(Message::Binary(data)))) => data,
                Poll::Ready(Some(Ok(Message::Text(text)))) => text.into_bytes(),
                Poll::Ready(Some(Ok(Message::Close(frame)))) => {
                    debug!("Tunnel close frame received: {:?}", frame);
                    self.read_closed = true;
                    continue;
                }
                // Control frames are answered by tungstenite itself
                Poll::Ready(Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)))) => continue,
                Poll::Ready(Some(Err(WsError::ConnectionClosed))) | Poll::Ready(None) => {
                    self.read_closed = true;
                    continue;
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(to_io_error(e))),
                Poll::Pending => return Poll::Pending,
            };

            if data.is_empty() {
                continue;
            }

            self.read_buffer = data;
            self.read_offset = 0;
        }
    }
}

impl<S> AsyncWrite for WsByteStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let mut inner = Pin::new(&mut self.inner);
        match inner.as_mut().poll_ready(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => return Poll::Ready(Err(to_io_error(e))),
            Poll::Pending => return Poll::Pending,
        }

        inner
            .start_send(Message::Binary(buf.to_vec()))
            .map_err(to_io_error)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx).map_err(to_io_error)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match Pin::new(&mut self.inner).poll_close(cx) {
            Poll::Ready(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => Poll::Ready(Ok(())),
            other => other.map_err(to_io_error),
        }
    }
}
