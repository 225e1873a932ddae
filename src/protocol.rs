use std::io;

// RSV: Fields marked RESERVED (RSV) must be set to X'00'.
pub const RSV: u8 = 0x00;

/// Version represents available SOCKS proxy versions.
/// Only SOCKS5 is served
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    SOCKS5 = 0x05,
}

/// AuthMethod represents the SOCKS5 authentication methods this
/// server knows how to answer with
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    NoAuth = 0x00,
    // 0x01 GSSAPI, 0x02 USERNAME/PASSWORD: not served
    // 0x03 - 0x7f: IANA reserved
    // 0x80 - 0xFE: private methods
    NoAcceptable = 0xFF,
}

/// AddressType represents the SOCKS5 address types:
/// IPv4, Domain Name, IPv6
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    IPv4 = 0x01,
    DomainName = 0x03,
    IPv6 = 0x04,
}

/// AddressType implementation block
impl AddressType {
    /// from_byte converts a byte to its related network address type
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(AddressType::IPv4),
            0x03 => Some(AddressType::DomainName),
            0x04 => Some(AddressType::IPv6),
            _ => None,
        }
    }
}

/// Command represents SOCKS5 protocol commands
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

/// Command implementation block
impl Command {
    /// from_byte converts a byte to its related SOCKS5 protocol command
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Command::Connect),
            0x02 => Some(Command::Bind),
            0x03 => Some(Command::UdpAssociate),
            _ => None,
        }
    }
}

/// ReplyCode is the REP field of a SOCKS5 reply
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCode {
    Succeeded = 0x00,
    ServerFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddrTypeUnsupported = 0x08,
    // 0x09 - 0xFF: unassigned
}

/// ReplyCode implementation block
impl ReplyCode {
    /// from_io_error_kind picks the reply code for a failed outbound connect
    pub fn from_io_error_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::HostUnreachable | io::ErrorKind::TimedOut => ReplyCode::HostUnreachable,
            io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
            io::ErrorKind::PermissionDenied => ReplyCode::ConnectionNotAllowed,
            _ => ReplyCode::ServerFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_type_from_byte() {
        assert_eq!(AddressType::from_byte(0x01), Some(AddressType::IPv4));
        assert_eq!(AddressType::from_byte(0x03), Some(AddressType::DomainName));
        assert_eq!(AddressType::from_byte(0x04), Some(AddressType::IPv6));
        assert_eq!(AddressType::from_byte(0x02), None);
        assert_eq!(AddressType::from_byte(0x05), None);
    }

    #[test]
    fn command_from_byte() {
        assert_eq!(Command::from_byte(0x01), Some(Command::Connect));
        assert_eq!(Command::from_byte(0x02), Some(Command::Bind));
        assert_eq!(Command::from_byte(0x03), Some(Command::UdpAssociate));
        assert_eq!(Command::from_byte(0x00), None);
        assert_eq!(Command::from_byte(0x04), None);
    }

    #[test]
    fn dial_errors_map_to_reply_codes() {
        use io::ErrorKind::*;

        assert_eq!(
            ReplyCode::from_io_error_kind(ConnectionRefused),
            ReplyCode::ConnectionRefused
        );
        assert_eq!(
            ReplyCode::from_io_error_kind(HostUnreachable),
            ReplyCode::HostUnreachable
        );
        assert_eq!(
            ReplyCode::from_io_error_kind(TimedOut),
            ReplyCode::HostUnreachable
        );
        assert_eq!(
            ReplyCode::from_io_error_kind(NetworkUnreachable),
            ReplyCode::NetworkUnreachable
        );
        assert_eq!(
            ReplyCode::from_io_error_kind(PermissionDenied),
            ReplyCode::ConnectionNotAllowed
        );
        assert_eq!(
            ReplyCode::from_io_error_kind(Other),
            ReplyCode::ServerFailure
        );
    }
}
