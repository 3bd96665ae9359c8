use thiserror::Error;

/// Validation failures of the SOCKS5 wire codec.
///
/// A protocol error only ever aborts the exchange it was raised in.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported protocol version: {0}")]
    VersionMismatch(u8),

    #[error("auth method count out of range: {0}")]
    AuthCountOutOfRange(usize),

    #[error("unknown command: {0:#04x}")]
    UnknownCommand(u8),

    #[error("reserved byte is not zero: {0:#04x}")]
    ReservedByteNonzero(u8),

    #[error("unknown address type: {0:#04x}")]
    UnknownAddressType(u8),

    #[error("invalid domain length: {0}")]
    DomainLengthInvalid(usize),

    #[error("domain name is not ASCII")]
    DomainNotAscii,

    #[error("unknown reply status: {0:#04x}")]
    UnknownStatus(u8),
}

/// Failures reported by the stream multiplexer.
#[derive(Error, Debug)]
pub enum MuxError {
    #[error("multiplexer is closed")]
    Closed,

    #[error("too many open streams on this tunnel")]
    StreamLimit,

    #[error("multiplexer connection error: {0}")]
    Connection(#[from] yamux::ConnectionError),
}

impl MuxError {
    /// Whether the tunnel beneath the multiplexer should be considered dead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MuxError::StreamLimit)
    }
}

/// Failures while establishing the tunnel and its multiplexer.
#[derive(Error, Debug)]
pub enum DialError {
    #[error("invalid server address {address:?}: {reason}")]
    InvalidServer { address: String, reason: String },

    #[error("tunnel handshake failed: {0}")]
    Handshake(#[from] Box<tokio_tungstenite::tungstenite::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for DialError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        DialError::Handshake(Box::new(e))
    }
}

/// Errors surfaced by the client session when a caller asks for a stream.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to establish session: {0}")]
    Dial(#[from] DialError),

    #[error("failed to open stream: {0}")]
    StreamOpen(#[source] MuxError),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
