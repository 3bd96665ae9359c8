use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::error::ProtocolError;
use crate::protocol::{ConnectionRequest, ConnectionResponse, HelloRequest, HelloResponse};

/// Forwards one SOCKS5 negotiation between `local` and `remote`, decoding
/// and re-encoding each message on the way.
///
/// Every message is validated before it is passed on, so a malformed
/// negotiation from either side ends the connection here.
pub async fn inspect_handshake<L, R>(
    local: &mut L,
    remote: &mut R,
) -> Result<(ConnectionRequest, ConnectionResponse), ProtocolError>
where
    L: AsyncRead + AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    HelloRequest::read_from(local).await?.write_to(remote).await?;
    HelloResponse::read_from(remote).await?.write_to(local).await?;

    let request = ConnectionRequest::read_from(local).await?;
    request.write_to(remote).await?;

    let response = ConnectionResponse::read_from(remote).await?;
    response.write_to(local).await?;

    info!(
        "Connection: {:?} {} -> {:?} (bound {})",
        request.command, request.destination, response.status, response.bound
    );

    Ok((request, response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AddressSpec, AuthMethod, Command, Status};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_forwards_negotiation() {
        let (mut local, mut app) = duplex(1024);
        let (mut remote, mut backend) = duplex(1024);

        let backend_task = tokio::spawn(async move {
            let hello = HelloRequest::read_from(&mut backend).await.unwrap();
            assert!(hello.offers(AuthMethod::NO_AUTH));
            HelloResponse::new(AuthMethod::NO_AUTH).write_to(&mut backend).await.unwrap();

            let request = ConnectionRequest::read_from(&mut backend).await.unwrap();
            assert_eq!(request.destination, AddressSpec::domain("example.com", 443));
            let bound = "10.1.2.3:5555".parse().unwrap();
            ConnectionResponse::new(Status::Granted, bound).write_to(&mut backend).await.unwrap();
        });

        let app_task = tokio::spawn(async move {
            HelloRequest::new(vec![AuthMethod::NO_AUTH]).write_to(&mut app).await.unwrap();
            let hello = HelloResponse::read_from(&mut app).await.unwrap();
            assert_eq!(hello.method, AuthMethod::NO_AUTH);

            ConnectionRequest::new(Command::TcpStream, AddressSpec::domain("example.com", 443))
                .write_to(&mut app)
                .await
                .unwrap();
            ConnectionResponse::read_from(&mut app).await.unwrap()
        });

        let (request, response) = inspect_handshake(&mut local, &mut remote).await.unwrap();

        assert_eq!(request.command, Command::TcpStream);
        assert_eq!(response.status, Status::Granted);
        assert_eq!(app_task.await.unwrap(), response);
        backend_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_malformed_greeting() {
        let (mut local, mut app) = duplex(1024);
        let (mut remote, mut backend) = duplex(1024);

        app.write_all(&[4, 1, 0]).await.unwrap();

        let result = inspect_handshake(&mut local, &mut remote).await;
        assert!(matches!(result, Err(ProtocolError::VersionMismatch(4))));

        // Nothing reached the remote side
        drop(remote);
        let mut forwarded = Vec::new();
        backend.read_to_end(&mut forwarded).await.unwrap();
        assert!(forwarded.is_empty());
    }
}
