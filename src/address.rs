use crate::error::SessionError;
use crate::protocol::AddressType;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Host is the DST.ADDR of a request in one of its three encodings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Ipv4(Ipv4Addr),
    Domain(String),
    Ipv6(Ipv6Addr),
}

/// DestinationAddress is the decoded (host, port) pair a client asked
/// the proxy to reach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationAddress {
    pub host: Host,
    pub port: u16,
}

/// DestinationAddress implementation block
impl DestinationAddress {
    /// address_type returns the ATYP this destination was encoded with
    pub fn address_type(&self) -> AddressType {
        match self.host {
            Host::Ipv4(_) => AddressType::IPv4,
            Host::Domain(_) => AddressType::DomainName,
            Host::Ipv6(_) => AddressType::IPv6,
        }
    }

    /// socket_addr returns a dialable address for IP hosts. Domain names
    /// are never resolved here
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match &self.host {
            Host::Ipv4(ip) => Some(SocketAddr::V4(SocketAddrV4::new(*ip, self.port))),
            Host::Ipv6(ip) => Some(SocketAddr::V6(SocketAddrV6::new(*ip, self.port, 0, 0))),
            Host::Domain(_) => None,
        }
    }
}

impl fmt::Display for DestinationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ipv4(ip) => write!(f, "{ip}:{}", self.port),
            Host::Domain(name) => write!(f, "{name}:{}", self.port),
            Host::Ipv6(ip) => write!(f, "[{ip}]:{}", self.port),
        }
    }
}

/// read_destination decodes DST.ADDR and DST.PORT from the stream once the
/// request header (and with it the ATYP byte) has been consumed
pub async fn read_destination<R>(
    reader: &mut R,
    addr_type: AddressType,
) -> Result<DestinationAddress, SessionError>
where
    R: AsyncRead + Unpin,
{
    let host = match addr_type {
        AddressType::IPv4 => {
            let mut addr = [0u8; 4];
            reader
                .read_exact(&mut addr)
                .await
                .map_err(SessionError::TransportRead)?;
            Host::Ipv4(Ipv4Addr::from(addr))
        }
        AddressType::DomainName => {
            // First octet holds the number of name octets to follow,
            // there is no terminating NUL
            let mut len = [0u8; 1];
            reader
                .read_exact(&mut len)
                .await
                .map_err(SessionError::TransportRead)?;

            if len[0] == 0 {
                return Err(SessionError::MalformedAddress("empty domain name"));
            }

            let mut name = vec![0u8; len[0] as usize];
            reader
                .read_exact(&mut name)
                .await
                .map_err(SessionError::TransportRead)?;

            let name = String::from_utf8(name)
                .map_err(|_| SessionError::MalformedAddress("domain name is not UTF-8"))?;
            Host::Domain(name)
        }
        AddressType::IPv6 => {
            let mut addr = [0u8; 16];
            reader
                .read_exact(&mut addr)
                .await
                .map_err(SessionError::TransportRead)?;
            Host::Ipv6(Ipv6Addr::from(addr))
        }
    };

    // Port -> BigEndian (network order)
    let mut port_buf = [0u8; 2];
    reader
        .read_exact(&mut port_buf)
        .await
        .map_err(SessionError::TransportRead)?;
    let port = u16::from_be_bytes(port_buf);

    Ok(DestinationAddress { host, port })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_ipv4_destination() {
        let mut data: &[u8] = &[192, 168, 1, 1, 0x1F, 0x90];
        let dest = read_destination(&mut data, AddressType::IPv4)
            .await
            .unwrap();

        assert_eq!(dest.host, Host::Ipv4(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(dest.port, 8080);
        assert_eq!(dest.to_string(), "192.168.1.1:8080");
        assert_eq!(
            dest.socket_addr(),
            Some("192.168.1.1:8080".parse::<SocketAddr>().unwrap())
        );
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn reads_domain_destination_with_port() {
        let mut frame = vec![11u8];
        frame.extend_from_slice(b"example.com");
        frame.extend_from_slice(&443u16.to_be_bytes());
        let mut data = frame.as_slice();

        let dest = read_destination(&mut data, AddressType::DomainName)
            .await
            .unwrap();

        assert_eq!(dest.host, Host::Domain("example.com".into()));
        assert_eq!(dest.port, 443);
        assert_eq!(dest.address_type(), AddressType::DomainName);
        assert_eq!(dest.socket_addr(), None);
        assert_eq!(dest.to_string(), "example.com:443");
    }

    #[tokio::test]
    async fn reads_ipv6_destination() {
        let mut frame = Ipv6Addr::LOCALHOST.octets().to_vec();
        frame.extend_from_slice(&[0x00, 0x50]);
        let mut data = frame.as_slice();

        let dest = read_destination(&mut data, AddressType::IPv6)
            .await
            .unwrap();

        assert_eq!(dest.host, Host::Ipv6(Ipv6Addr::LOCALHOST));
        assert_eq!(dest.port, 80);
        assert_eq!(dest.to_string(), "[::1]:80");
    }

    #[tokio::test]
    async fn rejects_empty_domain() {
        let mut data: &[u8] = &[0x00, 0x00, 0x50];
        let err = read_destination(&mut data, AddressType::DomainName)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MalformedAddress(_)));
    }

    #[tokio::test]
    async fn rejects_non_utf8_domain() {
        let mut data: &[u8] = &[0x02, 0xFF, 0xFE, 0x00, 0x50];
        let err = read_destination(&mut data, AddressType::DomainName)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::MalformedAddress(_)));
    }

    #[tokio::test]
    async fn short_read_is_a_transport_error() {
        let mut data: &[u8] = &[127, 0, 0];
        let err = read_destination(&mut data, AddressType::IPv4)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TransportRead(_)));
    }
}
