use std::io::{Error, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::address::{encode_socket_addr, read_socket_addr, AddressSpec};
use super::VERSION;
use crate::error::{ProtocolError, Result};

/// Upper bound on the number of methods a client may offer.
pub const MAX_AUTH_METHODS: usize = 16;

/// Authentication method identifier offered in a [`HelloRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuthMethod(pub u8);

impl AuthMethod {
    pub const NO_AUTH: AuthMethod = AuthMethod(0x00);
    pub const GSSAPI: AuthMethod = AuthMethod(0x01);
    pub const USERNAME_PASSWORD: AuthMethod = AuthMethod(0x02);
    pub const NO_ACCEPTABLE: AuthMethod = AuthMethod(0xFF);
}

/// Client greeting: `VER NMETHODS METHODS...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloRequest {
    pub methods: Vec<AuthMethod>,
}

/// Server method selection: `VER METHOD`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloResponse {
    pub method: AuthMethod,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TcpStream = 0x01,
    TcpBinding = 0x02,
    UdpBinding = 0x03,
}

impl Command {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::TcpStream),
            0x02 => Some(Self::TcpBinding),
            0x03 => Some(Self::UdpBinding),
            _ => None,
        }
    }
}

/// Connection request: `VER CMD RSV ATYP DST.ADDR DST.PORT`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub command: Command,
    pub destination: AddressSpec,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Granted = 0x00,
    GeneralFailure = 0x01,
    NotAllowedByRuleset = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

impl Status {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Granted),
            0x01 => Some(Self::GeneralFailure),
            0x02 => Some(Self::NotAllowedByRuleset),
            0x03 => Some(Self::NetworkUnreachable),
            0x04 => Some(Self::HostUnreachable),
            0x05 => Some(Self::ConnectionRefused),
            0x06 => Some(Self::TtlExpired),
            0x07 => Some(Self::CommandNotSupported),
            0x08 => Some(Self::AddressTypeNotSupported),
            _ => None,
        }
    }
}

impl From<&Error> for Status {
    fn from(value: &Error) -> Self {
        match value.kind() {
            ErrorKind::ConnectionAborted | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                Status::ConnectionRefused
            }
            ErrorKind::NotConnected => Status::NetworkUnreachable,
            ErrorKind::PermissionDenied => Status::NotAllowedByRuleset,
            ErrorKind::TimedOut => Status::HostUnreachable,
            ErrorKind::AddrNotAvailable | ErrorKind::Unsupported => Status::AddressTypeNotSupported,
            _ => Status::GeneralFailure,
        }
    }
}

/// Connection reply: `VER REP RSV ATYP BND.ADDR BND.PORT`
///
/// The bound address is always an IP address; domain replies are not
/// representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionResponse {
    pub status: Status,
    pub bound: SocketAddr,
}

impl HelloRequest {
    pub fn new(methods: Vec<AuthMethod>) -> Self {
        Self { methods }
    }

    pub fn offers(&self, method: AuthMethod) -> bool {
        self.methods.contains(&method)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = self.methods.len();
        if count == 0 || count > MAX_AUTH_METHODS {
            return Err(ProtocolError::AuthCountOutOfRange(count));
        }

        let mut buf = Vec::with_capacity(2 + count);
        buf.push(VERSION);
        buf.push(count as u8);
        buf.extend(self.methods.iter().map(|m| m.0));
        Ok(buf)
    }

    pub async fn read_from<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Self> {
        read_version(reader).await?;

        let count = reader.read_u8().await? as usize;
        if count == 0 || count > MAX_AUTH_METHODS {
            return Err(ProtocolError::AuthCountOutOfRange(count));
        }

        let mut methods = vec![0u8; count];
        reader.read_exact(&mut methods).await?;

        Ok(Self {
            methods: methods.into_iter().map(AuthMethod).collect(),
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin + ?Sized>(&self, writer: &mut W) -> Result<()> {
        write_frame(writer, self.encode()?).await
    }
}

impl HelloResponse {
    pub fn new(method: AuthMethod) -> Self {
        Self { method }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(vec![VERSION, self.method.0])
    }

    pub async fn read_from<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Self> {
        read_version(reader).await?;
        let method = AuthMethod(reader.read_u8().await?);
        Ok(Self { method })
    }

    pub async fn write_to<W: AsyncWrite + Unpin + ?Sized>(&self, writer: &mut W) -> Result<()> {
        write_frame(writer, self.encode()?).await
    }
}

impl ConnectionRequest {
    pub fn new(command: Command, destination: AddressSpec) -> Self {
        Self { command, destination }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(4 + 1 + 255 + 2);
        buf.extend_from_slice(&[VERSION, self.command as u8, 0x00]);
        self.destination.encode_into(&mut buf)?;
        Ok(buf)
    }

    pub async fn read_from<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Self> {
        read_version(reader).await?;

        let cmd = reader.read_u8().await?;
        let command = Command::from_u8(cmd).ok_or(ProtocolError::UnknownCommand(cmd))?;

        read_reserved(reader).await?;
        let destination = AddressSpec::read_from(reader).await?;

        Ok(Self { command, destination })
    }

    pub async fn write_to<W: AsyncWrite + Unpin + ?Sized>(&self, writer: &mut W) -> Result<()> {
        write_frame(writer, self.encode()?).await
    }
}

impl ConnectionResponse {
    pub fn new(status: Status, bound: SocketAddr) -> Self {
        Self { status, bound }
    }

    /// A failure reply carrying the unspecified address `0.0.0.0:0`.
    pub fn failure(status: Status) -> Self {
        Self::new(status, SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(4 + 16 + 2);
        buf.extend_from_slice(&[VERSION, self.status as u8, 0x00]);
        encode_socket_addr(&self.bound, &mut buf);
        Ok(buf)
    }

    pub async fn read_from<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Self> {
        read_version(reader).await?;

        let rep = reader.read_u8().await?;
        let status = Status::from_u8(rep).ok_or(ProtocolError::UnknownStatus(rep))?;

        read_reserved(reader).await?;
        let bound = read_socket_addr(reader).await?;

        Ok(Self { status, bound })
    }

    pub async fn write_to<W: AsyncWrite + Unpin + ?Sized>(&self, writer: &mut W) -> Result<()> {
        write_frame(writer, self.encode()?).await
    }
}

async fn read_version<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<()> {
    match reader.read_u8().await? {
        VERSION => Ok(()),
        other => Err(ProtocolError::VersionMismatch(other)),
    }
}

async fn read_reserved<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<()> {
    match reader.read_u8().await? {
        0 => Ok(()),
        other => Err(ProtocolError::ReservedByteNonzero(other)),
    }
}

async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, frame: Vec<u8>) -> Result<()> {
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
