use crate::protocol::{AddressType, ReplyCode};
use std::io;
use thiserror::Error;

/// SessionError classifies every way a single client session can fail.
/// None of these are fatal to the server; they end one session only.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Handshake VER byte was not 0x05
    #[error("protocol mismatch: expected SOCKS5, got version 0x{0:02x}")]
    ProtocolMismatch(u8),

    /// Request VER byte was not 0x05
    #[error("unsupported request: version 0x{0:02x}")]
    UnsupportedVersion(u8),

    /// BIND, UDP ASSOCIATE or an unknown command
    #[error("unsupported request: command 0x{0:02x}")]
    UnsupportedCommand(u8),

    #[error("address type 0x{0:02x} not supported")]
    AddressTypeUnsupported(u8),

    #[error("malformed destination address: {0}")]
    MalformedAddress(&'static str),

    #[error("client offered no acceptable authentication method")]
    NoAcceptableMethods,

    /// Destination decoded but this server does not dial it
    #[error("{0:?} destinations are not implemented")]
    NotImplemented(AddressType),

    #[error("read failed: {0}")]
    TransportRead(#[source] io::Error),

    #[error("write failed: {0}")]
    TransportWrite(#[source] io::Error),

    #[error("failed to connect to {target}: {source}")]
    DialFailure {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out during {0}")]
    Timeout(&'static str),
}

/// SessionError implementation block
impl SessionError {
    /// reply_code returns the REP byte owed to the client for errors raised
    /// once a request header has been read. Handshake and transport errors
    /// return None: the connection is simply closed.
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            SessionError::UnsupportedVersion(_) => Some(ReplyCode::ServerFailure),
            SessionError::UnsupportedCommand(_) => Some(ReplyCode::CommandNotSupported),
            SessionError::AddressTypeUnsupported(_) | SessionError::NotImplemented(_) => {
                Some(ReplyCode::AddrTypeUnsupported)
            }
            SessionError::MalformedAddress(_) => Some(ReplyCode::ServerFailure),
            SessionError::DialFailure { source, .. } => {
                Some(ReplyCode::from_io_error_kind(source.kind()))
            }
            _ => None,
        }
    }
}
