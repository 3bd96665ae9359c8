//! Address encoding shared by connection requests and responses.
//!
//! On the wire an address is a type tag followed by the value and a
//! big-endian port:
//! - `0x01` IPv4, 4 bytes
//! - `0x03` domain name, 1-byte length prefix then 1..=255 ASCII bytes
//! - `0x04` IPv6, 16 bytes

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, Result};

pub const MAX_DOMAIN_LEN: usize = 255;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Ipv4 = 0x01,
    Domain = 0x03,
    Ipv6 = 0x04,
}

impl AddressType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Ipv4),
            0x03 => Some(Self::Domain),
            0x04 => Some(Self::Ipv6),
            _ => None,
        }
    }

    pub async fn read_from<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Self> {
        let atyp = reader.read_u8().await?;
        Self::from_u8(atyp).ok_or(ProtocolError::UnknownAddressType(atyp))
    }
}

/// Destination host as carried by a connection request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

impl Address {
    pub fn address_type(&self) -> AddressType {
        match self {
            Address::Ipv4(_) => AddressType::Ipv4,
            Address::Ipv6(_) => AddressType::Ipv6,
            Address::Domain(_) => AddressType::Domain,
        }
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Address::Ipv4(v4),
            IpAddr::V6(v6) => Address::Ipv6(v6),
        }
    }
}

/// An [`Address`] together with its port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressSpec {
    pub address: Address,
    pub port: u16,
}

impl AddressSpec {
    pub fn new(address: Address, port: u16) -> Self {
        Self { address, port }
    }

    pub fn domain(domain: impl Into<String>, port: u16) -> Self {
        Self::new(Address::Domain(domain.into()), port)
    }

    /// Appends the tagged address and port to `buf`.
    ///
    /// Nothing is appended when the address cannot be represented.
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        if let Address::Domain(domain) = &self.address {
            validate_domain(domain)?;
        }

        buf.push(self.address.address_type() as u8);
        match &self.address {
            Address::Ipv4(ip) => buf.extend_from_slice(&ip.octets()),
            Address::Ipv6(ip) => buf.extend_from_slice(&ip.octets()),
            Address::Domain(domain) => {
                buf.push(domain.len() as u8);
                buf.extend_from_slice(domain.as_bytes());
            }
        }

        buf.extend_from_slice(&self.port.to_be_bytes());
        Ok(())
    }

    pub(crate) async fn read_from<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Self> {
        let address = match AddressType::read_from(reader).await? {
            AddressType::Ipv4 => Address::Ipv4(read_ipv4(reader).await?),
            AddressType::Ipv6 => Address::Ipv6(read_ipv6(reader).await?),
            AddressType::Domain => Address::Domain(read_domain(reader).await?),
        };
        let port = reader.read_u16().await?;

        Ok(Self { address, port })
    }
}

impl From<SocketAddr> for AddressSpec {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().into(), addr.port())
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Address::Ipv4(ip) => write!(f, "{}:{}", ip, self.port),
            Address::Ipv6(ip) => write!(f, "[{}]:{}", ip, self.port),
            Address::Domain(domain) => write!(f, "{}:{}", domain, self.port),
        }
    }
}

/// Appends an IP-only address, as used by connection responses.
pub(crate) fn encode_socket_addr(addr: &SocketAddr, buf: &mut Vec<u8>) {
    match addr {
        SocketAddr::V4(v4) => {
            buf.push(AddressType::Ipv4 as u8);
            buf.extend_from_slice(&v4.ip().octets());
        }
        SocketAddr::V6(v6) => {
            buf.push(AddressType::Ipv6 as u8);
            buf.extend_from_slice(&v6.ip().octets());
        }
    }

    buf.extend_from_slice(&addr.port().to_be_bytes());
}

/// Reads an IP-only address. A domain tag is treated as an unknown type.
pub(crate) async fn read_socket_addr<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<SocketAddr> {
    let ip = match AddressType::read_from(reader).await? {
        AddressType::Ipv4 => IpAddr::V4(read_ipv4(reader).await?),
        AddressType::Ipv6 => IpAddr::V6(read_ipv6(reader).await?),
        AddressType::Domain => return Err(ProtocolError::UnknownAddressType(AddressType::Domain as u8)),
    };
    let port = reader.read_u16().await?;

    Ok(SocketAddr::new(ip, port))
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return Err(ProtocolError::DomainLengthInvalid(domain.len()));
    }

    if !domain.is_ascii() {
        return Err(ProtocolError::DomainNotAscii);
    }

    Ok(())
}

async fn read_ipv4<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Ipv4Addr> {
    let mut octets = [0u8; 4];
    reader.read_exact(&mut octets).await?;
    Ok(octets.into())
}

async fn read_ipv6<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<Ipv6Addr> {
    let mut octets = [0u8; 16];
    reader.read_exact(&mut octets).await?;
    Ok(octets.into())
}

async fn read_domain<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> Result<String> {
    let len = reader.read_u8().await? as usize;
    if len == 0 {
        return Err(ProtocolError::DomainLengthInvalid(len));
    }

    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes).await?;

    if !bytes.is_ascii() {
        return Err(ProtocolError::DomainNotAscii);
    }

    String::from_utf8(bytes).map_err(|_| ProtocolError::DomainNotAscii)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let v4 = AddressSpec::from("10.0.0.1:80".parse::<SocketAddr>().unwrap());
        let v6 = AddressSpec::from("[::1]:443".parse::<SocketAddr>().unwrap());
        let domain = AddressSpec::domain("example.com", 8080);

        assert_eq!(v4.to_string(), "10.0.0.1:80");
        assert_eq!(v6.to_string(), "[::1]:443");
        assert_eq!(domain.to_string(), "example.com:8080");
    }

    #[test]
    fn test_encode_domain() {
        let mut buf = Vec::new();
        AddressSpec::domain("a.io", 0x1F90).encode_into(&mut buf).unwrap();

        assert_eq!(buf, [0x03, 4, b'a', b'.', b'i', b'o', 0x1F, 0x90]);
    }

    #[test]
    fn test_encode_tags_match_address_type() {
        for spec in [
            AddressSpec::from("10.0.0.1:80".parse::<SocketAddr>().unwrap()),
            AddressSpec::from("[::1]:443".parse::<SocketAddr>().unwrap()),
            AddressSpec::domain("example.com", 8080),
        ] {
            let mut buf = Vec::new();
            spec.encode_into(&mut buf).unwrap();
            assert_eq!(AddressType::from_u8(buf[0]), Some(spec.address.address_type()));
        }

        let mut buf = Vec::new();
        AddressSpec::from("[::1]:443".parse::<SocketAddr>().unwrap())
            .encode_into(&mut buf)
            .unwrap();
        assert_eq!(buf.len(), 1 + 16 + 2);
        assert_eq!(buf[0], 0x04);
    }

    #[test]
    fn test_encode_rejects_bad_domains() {
        let mut buf = Vec::new();

        let empty = AddressSpec::domain("", 80).encode_into(&mut buf);
        assert!(matches!(empty, Err(ProtocolError::DomainLengthInvalid(0))));

        let unicode = AddressSpec::domain("bücher.de", 80).encode_into(&mut buf);
        assert!(matches!(unicode, Err(ProtocolError::DomainNotAscii)));

        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_read_domain_rejects_zero_length() {
        let bytes = [0x03, 0x00];
        let result = AddressSpec::read_from(&mut &bytes[..]).await;

        assert!(matches!(result, Err(ProtocolError::DomainLengthInvalid(0))));
    }

    #[tokio::test]
    async fn test_read_socket_addr_rejects_domain() {
        let bytes = [0x03, 0x01, b'a', 0x00, 0x50];
        let result = read_socket_addr(&mut &bytes[..]).await;

        assert!(matches!(result, Err(ProtocolError::UnknownAddressType(0x03))));
    }

    #[tokio::test]
    async fn test_read_truncated_address() {
        let bytes = [0x01, 127, 0];
        let result = AddressSpec::read_from(&mut &bytes[..]).await;

        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }
}
