use http::{header, HeaderValue, StatusCode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, connect_async};
use tracing::{debug, info};
use url::Url;

use super::{BoxedStream, WsByteStream};
use crate::error::DialError;

/// Client side of the HTTP-disguised tunnel.
#[derive(Debug, Clone)]
pub struct WsDialer {
    url: Url,
    token: String,
}

impl WsDialer {
    /// Builds a dialer for `server`, which may be an `http(s)://` or
    /// `ws(s)://` URL. A URL without a path gets `default_path`.
    pub fn new(server: &str, token: &str, default_path: &str) -> Result<Self, DialError> {
        let url = tunnel_url(server, default_path)?;
        Ok(Self {
            url,
            token: token.to_string(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Opens a tunnel connection and performs the upgrade handshake.
    pub async fn dial(&self) -> Result<BoxedStream, DialError> {
        debug!("Dialing tunnel {}", self.url);

        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.token)).map_err(|e| {
            DialError::InvalidServer {
                address: self.url.to_string(),
                reason: format!("token is not a valid header value: {}", e),
            }
        })?;
        request.headers_mut().insert(header::AUTHORIZATION, bearer);

        let (ws_stream, response) = connect_async(request).await?;
        info!("Tunnel connected to {}, status: {}", self.url, response.status());

        Ok(Box::new(WsByteStream::new(ws_stream)))
    }
}

fn tunnel_url(server: &str, default_path: &str) -> Result<Url, DialError> {
    let invalid = |reason: String| DialError::InvalidServer {
        address: server.to_string(),
        reason,
    };

    let mut url = Url::parse(server).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {:?}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch scheme to {}", scheme)))?;

    if url.path().is_empty() || url.path() == "/" {
        url.set_path(default_path);
    }

    Ok(url)
}

/// Server side of the HTTP-disguised tunnel.
#[derive(Debug, Clone)]
pub struct WsAcceptor {
    token: String,
    path: String,
}

impl WsAcceptor {
    pub fn new(token: &str, path: &str) -> Self {
        Self {
            token: token.to_string(),
            path: path.to_string(),
        }
    }

    /// Performs the upgrade handshake on an inbound connection, rejecting
    /// requests with the wrong path or token.
    pub async fn accept(&self, stream: TcpStream) -> Result<BoxedStream, DialError> {
        let check = |request: &Request, response: Response| self.check_request(request, response);
        let ws_stream = accept_hdr_async(stream, check).await?;
        Ok(Box::new(WsByteStream::new(ws_stream)))
    }

    #[allow(clippy::result_large_err)]
    fn check_request(&self, request: &Request, response: Response) -> Result<Response, ErrorResponse> {
        if request.uri().path() != self.path {
            debug!("Rejecting tunnel request for path {}", request.uri().path());
            return Err(reject(StatusCode::NOT_FOUND));
        }

        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .is_some_and(|token| token == self.token);

        if !authorized {
            debug!("Rejecting tunnel request with invalid token");
            return Err(reject(StatusCode::UNAUTHORIZED));
        }

        Ok(response)
    }
}

/// Extracts the credentials of a `Bearer` authorization value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ').unwrap_or((value.trim(), ""));
    scheme.eq_ignore_ascii_case("Bearer").then(|| token.trim())
}

fn reject(status: StatusCode) -> ErrorResponse {
    let mut response = ErrorResponse::new(status.canonical_reason().map(str::to_string));
    *response.status_mut() = status;
    response
}
