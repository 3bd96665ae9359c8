use std::sync::Arc;

use tracing::{debug, trace};

use super::backend::ProxyBackend;
use crate::mux::{MuxConfig, MuxServer};
use crate::transport::BoxedStream;

/// Serves one accepted tunnel until the remote closes it or it breaks.
///
/// Every logical stream is handed to `backend` on its own task. Streams
/// still being served when the tunnel ends fail with it.
pub async fn serve_tunnel<B: ProxyBackend>(tunnel: BoxedStream, config: &MuxConfig, backend: Arc<B>) {
    let mut mux = MuxServer::new(tunnel, config);

    loop {
        let stream = match mux.accept_stream().await {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Tunnel ended: {}", e);
                break;
            }
        };

        trace!("Accepted logical stream");
        let backend = backend.clone();
        tokio::spawn(async move { backend.serve(Box::new(stream)).await });
    }

    mux.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::MuxClient;
    use async_trait::async_trait;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    /// Records everything received on a stream, then echoes it back.
    struct RecordingBackend {
        received: mpsc::UnboundedSender<Vec<u8>>,
    }

    #[async_trait]
    impl ProxyBackend for RecordingBackend {
        async fn serve(&self, mut stream: BoxedStream) {
            let mut buf = Vec::new();
            if stream.read_to_end(&mut buf).await.is_err() {
                return;
            }
            let _ = stream.write_all(&buf).await;
            let _ = stream.shutdown().await;
            let _ = self.received.send(buf);
        }
    }

    #[tokio::test]
    async fn test_streams_dispatched_to_backend() {
        let (client_io, server_io) = duplex(256 * 1024);
        let (received, mut records) = mpsc::unbounded_channel();
        let config = MuxConfig::default();

        let server = tokio::spawn(async move {
            serve_tunnel(Box::new(server_io), &MuxConfig::default(), Arc::new(RecordingBackend { received })).await
        });
        let client = MuxClient::new(Box::new(client_io), &config);

        for payload in [&b"first"[..], &b"second"[..]] {
            let mut stream = client.open().await.unwrap();
            stream.write_all(payload).await.unwrap();
            stream.shutdown().await.unwrap();

            let mut echoed = Vec::new();
            stream.read_to_end(&mut echoed).await.unwrap();
            assert_eq!(echoed, payload);
            assert_eq!(records.recv().await.unwrap(), payload);
        }

        client.close();
        server.await.unwrap();
    }
}
