use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::ProtocolError;
use crate::protocol::{
    Address, AddressSpec, AuthMethod, Command, ConnectionRequest, ConnectionResponse, HelloRequest, HelloResponse,
    Status,
};
use crate::relay::relay;
use crate::transport::BoxedStream;

/// Terminates a logical stream and proxies it to its destination.
#[async_trait]
pub trait ProxyBackend: Send + Sync + 'static {
    async fn serve(&self, stream: BoxedStream);
}

/// SOCKS5 server supporting unauthenticated TCP connect.
#[derive(Debug, Clone)]
pub struct Socks5Backend {
    connect_timeout: Duration,
}

impl Default for Socks5Backend {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Socks5Backend {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Runs the negotiation, returning the connected destination if the
    /// request was granted.
    async fn negotiate(&self, stream: &mut BoxedStream) -> Result<Option<(TcpStream, AddressSpec)>, ProtocolError> {
        let hello = HelloRequest::read_from(stream).await?;
        if !hello.offers(AuthMethod::NO_AUTH) {
            debug!("No acceptable auth method in {:?}", hello.methods);
            HelloResponse::new(AuthMethod::NO_ACCEPTABLE).write_to(stream).await?;
            return Ok(None);
        }
        HelloResponse::new(AuthMethod::NO_AUTH).write_to(stream).await?;

        let request = match ConnectionRequest::read_from(stream).await {
            Ok(request) => request,
            Err(e) => {
                let status = match e {
                    ProtocolError::UnknownCommand(_) => Some(Status::CommandNotSupported),
                    ProtocolError::UnknownAddressType(_) => Some(Status::AddressTypeNotSupported),
                    _ => None,
                };
                if let Some(status) = status {
                    let _ = ConnectionResponse::failure(status).write_to(stream).await;
                }
                return Err(e);
            }
        };

        if request.command != Command::TcpStream {
            debug!("Unsupported command {:?}", request.command);
            ConnectionResponse::failure(Status::CommandNotSupported)
                .write_to(stream)
                .await?;
            return Ok(None);
        }

        let destination = request.destination;
        let outbound = match self.connect(&destination).await {
            Ok(outbound) => outbound,
            Err(status) => {
                ConnectionResponse::failure(status).write_to(stream).await?;
                return Ok(None);
            }
        };

        let bound = outbound.local_addr()?;
        ConnectionResponse::new(Status::Granted, bound).write_to(stream).await?;

        Ok(Some((outbound, destination)))
    }

    async fn connect(&self, destination: &AddressSpec) -> Result<TcpStream, Status> {
        let port = destination.port;
        let connect = async {
            match &destination.address {
                Address::Ipv4(ip) => TcpStream::connect((*ip, port)).await,
                Address::Ipv6(ip) => TcpStream::connect((*ip, port)).await,
                Address::Domain(domain) => TcpStream::connect((domain.as_str(), port)).await,
            }
        };

        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => {
                debug!("Connect to {} failed: {}", destination, e);
                Err(Status::from(&e))
            }
            Err(_) => {
                debug!("Connect to {} timed out", destination);
                Err(Status::TtlExpired)
            }
        }
    }
}

#[async_trait]
impl ProxyBackend for Socks5Backend {
    async fn serve(&self, mut stream: BoxedStream) {
        let (outbound, destination) = match self.negotiate(&mut stream).await {
            Ok(Some(connected)) => connected,
            Ok(None) => return,
            Err(e) => {
                debug!("SOCKS5 negotiation failed: {}", e);
                return;
            }
        };

        info!("Proxying to {}", destination);
        match relay(stream, outbound).await {
            Ok((sent, received)) => debug!("{} closed ({} bytes up, {} bytes down)", destination, sent, received),
            Err(e) => debug!("{} closed with error: {}", destination, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::net::TcpListener;

    async fn spawn_echo() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut conn, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let (mut read, mut write) = conn.split();
                    let _ = tokio::io::copy(&mut read, &mut write).await;
                });
            }
        });
        addr
    }

    fn start_backend() -> DuplexStream {
        let (near, far) = duplex(4096);
        tokio::spawn(async move { Socks5Backend::default().serve(Box::new(far)).await });
        near
    }

    async fn greet(stream: &mut DuplexStream) {
        HelloRequest::new(vec![AuthMethod::NO_AUTH]).write_to(stream).await.unwrap();
        let hello = HelloResponse::read_from(stream).await.unwrap();
        assert_eq!(hello.method, AuthMethod::NO_AUTH);
    }

    #[tokio::test]
    async fn test_connect_and_relay() {
        let echo = spawn_echo().await;
        let mut stream = start_backend();

        greet(&mut stream).await;
        ConnectionRequest::new(Command::TcpStream, echo.into())
            .write_to(&mut stream)
            .await
            .unwrap();

        let response = ConnectionResponse::read_from(&mut stream).await.unwrap();
        assert_eq!(response.status, Status::Granted);
        assert_eq!(response.bound.ip(), Ipv4Addr::LOCALHOST);

        stream.write_all(b"through the proxy").await.unwrap();
        let mut buf = [0u8; 17];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"through the proxy");
    }

    #[tokio::test]
    async fn test_connect_by_domain() {
        let echo = spawn_echo().await;
        let mut stream = start_backend();

        greet(&mut stream).await;
        ConnectionRequest::new(Command::TcpStream, AddressSpec::domain("localhost", echo.port()))
            .write_to(&mut stream)
            .await
            .unwrap();

        let response = ConnectionResponse::read_from(&mut stream).await.unwrap();
        // localhost may resolve to ::1 first, where nothing listens
        assert!(matches!(response.status, Status::Granted | Status::ConnectionRefused));
    }

    #[tokio::test]
    async fn test_rejects_without_no_auth() {
        let mut stream = start_backend();

        HelloRequest::new(vec![AuthMethod::USERNAME_PASSWORD, AuthMethod::GSSAPI])
            .write_to(&mut stream)
            .await
            .unwrap();

        let hello = HelloResponse::read_from(&mut stream).await.unwrap();
        assert_eq!(hello.method, AuthMethod::NO_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_unsupported_command() {
        let mut stream = start_backend();

        greet(&mut stream).await;
        ConnectionRequest::new(Command::UdpBinding, AddressSpec::domain("example.com", 53))
            .write_to(&mut stream)
            .await
            .unwrap();

        let response = ConnectionResponse::read_from(&mut stream).await.unwrap();
        assert_eq!(response.status, Status::CommandNotSupported);
    }

    #[tokio::test]
    async fn test_unknown_address_type() {
        let mut stream = start_backend();

        greet(&mut stream).await;
        stream.write_all(&[5, 1, 0, 2]).await.unwrap();

        let response = ConnectionResponse::read_from(&mut stream).await.unwrap();
        assert_eq!(response.status, Status::AddressTypeNotSupported);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap();
        drop(listener);

        let mut stream = start_backend();
        greet(&mut stream).await;
        ConnectionRequest::new(Command::TcpStream, closed.into())
            .write_to(&mut stream)
            .await
            .unwrap();

        let response = ConnectionResponse::read_from(&mut stream).await.unwrap();
        assert_eq!(response.status, Status::ConnectionRefused);
        assert_eq!(response, ConnectionResponse::failure(Status::ConnectionRefused));
    }
}
