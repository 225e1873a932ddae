use crate::address::{DestinationAddress, Host, read_destination};
use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::protocol::{AddressType, Command, RSV, ReplyCode, Version};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Reply is a SOCKS5 reply frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub code: ReplyCode,
    pub bound: SocketAddr,
}

/// Reply implementation block
impl Reply {
    /// success carries the local address of the outbound socket
    pub fn success(bound: SocketAddr) -> Self {
        Self {
            code: ReplyCode::Succeeded,
            bound,
        }
    }

    /// failure carries an unspecified bound address
    pub fn failure(code: ReplyCode) -> Self {
        Self {
            code,
            bound: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
        }
    }

    /// to_bytes encodes the reply
    pub fn to_bytes(&self) -> Vec<u8> {
        // SOCKS5 reply format
        // +----+-----+-------+------+----------+----------+
        // |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
        // +----+-----+-------+------+----------+----------+
        // | 1  |  1  | X'00' |  1   | Variable |    2     |
        // +----+-----+-------+------+----------+----------+
        let mut reply = vec![Version::SOCKS5 as u8, self.code as u8, RSV];

        match self.bound {
            SocketAddr::V4(addr) => {
                reply.push(AddressType::IPv4 as u8);
                reply.extend_from_slice(&addr.ip().octets());
                reply.extend_from_slice(&addr.port().to_be_bytes());
            }
            SocketAddr::V6(addr) => {
                reply.push(AddressType::IPv6 as u8);
                reply.extend_from_slice(&addr.ip().octets());
                reply.extend_from_slice(&addr.port().to_be_bytes());
            }
        }

        reply
    }
}

/// send_reply writes the whole reply frame to the client
pub async fn send_reply<S>(stream: &mut S, reply: Reply) -> Result<(), SessionError>
where
    S: AsyncWrite + Unpin,
{
    // write_all keeps going from the last written offset on short writes
    stream
        .write_all(&reply.to_bytes())
        .await
        .map_err(SessionError::TransportWrite)
}

/// handle_request reads the client's request, dials the destination and
/// answers the client. Returns the outbound stream only when the success
/// reply has been fully written. Any failure after the header was read
/// is answered with a best-effort error reply.
///
/// When a deadline is given, reading the request must finish before it and
/// the dial gets whatever time is left, so a dial cut short by the deadline
/// is still answered with HOST UNREACHABLE
pub async fn handle_request<S>(
    stream: &mut S,
    config: &ServerConfig,
    deadline: Option<Instant>,
) -> Result<TcpStream, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = connect_request(stream, config, deadline).await;

    if let Err(e) = &result {
        if let Some(code) = e.reply_code() {
            if let Err(reply_err) = send_reply(stream, Reply::failure(code)).await {
                warn!("could not send error reply {code:?}: {reply_err}");
            }
        }
    }

    result
}

async fn connect_request<S>(
    stream: &mut S,
    config: &ServerConfig,
    deadline: Option<Instant>,
) -> Result<TcpStream, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let destination = match deadline {
        Some(at) => tokio::time::timeout_at(at, read_request(stream))
            .await
            .map_err(|_| SessionError::Timeout("request"))??,
        None => read_request(stream).await?,
    };

    let target = dialable_target(&destination)?;
    let outbound = dial(target, dial_limit(config.connect_timeout, deadline)).await?;

    let bound = outbound
        .local_addr()
        .map_err(|source| SessionError::DialFailure {
            target: target.to_string(),
            source,
        })?;

    send_reply(stream, Reply::success(bound)).await?;

    info!("connected to {target} via {bound}");
    Ok(outbound)
}

/// read_request consumes the request header and the destination it names
async fn read_request<S>(stream: &mut S) -> Result<DestinationAddress, SessionError>
where
    S: AsyncRead + Unpin,
{
    // SOCKS5 request format
    // +----+-----+-------+------+----------+----------+
    // |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
    // +----+-----+-------+------+----------+----------+
    // | 1  |  1  | X'00' |  1   | Variable |    2     |
    // +----+-----+-------+------+----------+----------+
    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .map_err(SessionError::TransportRead)?;

    // RSV is not checked
    let [version, command, _, atyp] = header;

    if version != Version::SOCKS5 as u8 {
        return Err(SessionError::UnsupportedVersion(version));
    }

    match Command::from_byte(command) {
        Some(Command::Connect) => (),
        _ => return Err(SessionError::UnsupportedCommand(command)),
    }

    let addr_type =
        AddressType::from_byte(atyp).ok_or(SessionError::AddressTypeUnsupported(atyp))?;

    let destination = read_destination(stream, addr_type).await?;
    debug!("CONNECT {destination} ({addr_type:?})");

    Ok(destination)
}

/// dialable_target only lets IPv4 destinations through. Domain names and
/// IPv6 are decoded but never dialed
fn dialable_target(destination: &DestinationAddress) -> Result<SocketAddr, SessionError> {
    match (&destination.host, destination.socket_addr()) {
        (Host::Ipv4(_), Some(target)) => Ok(target),
        _ => Err(SessionError::NotImplemented(destination.address_type())),
    }
}

/// dial_limit is the tighter of the connect timeout and the time left
/// before the deadline
fn dial_limit(connect_timeout: Option<Duration>, deadline: Option<Instant>) -> Option<Duration> {
    let remaining = deadline.map(|at| at.saturating_duration_since(Instant::now()));

    match (connect_timeout, remaining) {
        (Some(limit), Some(left)) => Some(limit.min(left)),
        (limit, left) => limit.or(left),
    }
}

/// dial opens the outbound connection, bounded by the connect timeout
/// when one is configured
async fn dial(target: SocketAddr, timeout: Option<Duration>) -> Result<TcpStream, SessionError> {
    let connect = TcpStream::connect(target);

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, connect).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no answer within {limit:?}"),
            )),
        },
        None => connect.await,
    };

    result.map_err(|source| SessionError::DialFailure {
        target: target.to_string(),
        source,
    })
}
