//! Bidirectional byte relay between two streams.

use std::io;
use std::pin::pin;

use futures_util::future::{self, Either};
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt};

/// Copies `a -> b` and `b -> a` concurrently and closes both streams when
/// the relay ends.
///
/// A direction that reaches end-of-stream half-closes its destination and
/// the other direction keeps draining. A direction that fails ends the
/// whole relay. Returns the bytes copied `(a -> b, b -> a)`.
pub async fn relay<A, B>(a: A, b: B) -> io::Result<(u64, u64)>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut a_read, mut a_write) = split(a);
    let (mut b_read, mut b_write) = split(b);

    let result = {
        let upstream = pin!(pipe(&mut a_read, &mut b_write));
        let downstream = pin!(pipe(&mut b_read, &mut a_write));

        match future::select(upstream, downstream).await {
            Either::Left((Ok(sent), downstream)) => downstream.await.map(|received| (sent, received)),
            Either::Right((Ok(received), upstream)) => upstream.await.map(|sent| (sent, received)),
            Either::Left((Err(e), _)) | Either::Right((Err(e), _)) => Err(e),
        }
    };

    let mut a = a_read.unsplit(a_write);
    let mut b = b_read.unsplit(b_write);
    let _ = a.shutdown().await;
    let _ = b.shutdown().await;

    result
}

async fn pipe<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(reader, writer).await?;
    writer.shutdown().await?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_relays_both_directions() {
        let (local, mut local_peer) = duplex(1024);
        let (remote, mut remote_peer) = duplex(1024);
        let handle = tokio::spawn(relay(local, remote));

        local_peer.write_all(b"request").await.unwrap();
        let mut buf = [0u8; 7];
        remote_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"request");

        remote_peer.write_all(b"response").await.unwrap();
        let mut buf = [0u8; 8];
        local_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"response");

        drop(local_peer);
        drop(remote_peer);

        let (sent, received) = handle.await.unwrap().unwrap();
        assert_eq!((sent, received), (7, 8));
    }

    #[tokio::test]
    async fn test_local_close_propagates_eof() {
        let (local, local_peer) = duplex(1024);
        let (remote, mut remote_peer) = duplex(1024);
        let handle = tokio::spawn(relay(local, remote));

        drop(local_peer);

        let mut buf = Vec::new();
        let read = timeout(Duration::from_secs(1), remote_peer.read_to_end(&mut buf)).await;
        assert_eq!(read.unwrap().unwrap(), 0);

        drop(remote_peer);
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_half_closed_side_still_drains() {
        let (local, mut local_peer) = duplex(1024);
        let (remote, mut remote_peer) = duplex(1024);
        let handle = tokio::spawn(relay(local, remote));

        local_peer.write_all(b"last words").await.unwrap();
        local_peer.shutdown().await.unwrap();

        let mut request = Vec::new();
        remote_peer.read_to_end(&mut request).await.unwrap();
        assert_eq!(request, b"last words");

        remote_peer.write_all(b"reply after eof").await.unwrap();
        drop(remote_peer);

        let mut response = Vec::new();
        local_peer.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"reply after eof");

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_read_error_ends_relay() {
        let local = tokio_test::io::Builder::new()
            .read_error(io::Error::from(io::ErrorKind::ConnectionReset))
            .build();
        let (remote, _remote_peer) = duplex(1024);

        let result = timeout(Duration::from_secs(1), relay(local, remote)).await.unwrap();

        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionReset);
    }
}
