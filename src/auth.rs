use crate::config::MethodPolicy;
use crate::error::SessionError;
use crate::protocol::{AuthMethod, Version};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// negotiate_auth handles method negotiation between the SOCKS server and client.
/// A wrong version byte aborts before anything is written back
pub async fn negotiate_auth<S>(
    stream: &mut S,
    policy: MethodPolicy,
) -> Result<AuthMethod, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // ClientHello format
    // +----+----------+----------+
    // |VER | NMETHODS | METHODS  |
    // +----+----------+----------+
    // | 1  |    1     | 1 to 255 |
    // +----+----------+----------+

    // Instantiate handshake buffer & read
    let mut buf = [0u8; 2];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(SessionError::TransportRead)?;

    // Parse version and client methods from handshake
    let version = buf[0];
    let n_methods = buf[1];

    // Ensure version is 0x05 -> SOCKS5
    if version != Version::SOCKS5 as u8 {
        return Err(SessionError::ProtocolMismatch(version));
    }

    let mut methods = vec![0u8; n_methods as usize];
    stream
        .read_exact(&mut methods)
        .await
        .map_err(SessionError::TransportRead)?;

    debug!("client offered methods: {methods:?}");

    let method = select_auth_method(&methods, policy);

    // ServerChoice method selection reply format
    // +----+--------+
    // |VER | METHOD |
    // +----+--------+
    // | 1  |   1    |
    // +----+--------+
    stream
        .write_all(&[Version::SOCKS5 as u8, method as u8])
        .await
        .map_err(SessionError::TransportWrite)?;

    match method {
        AuthMethod::NoAuth => Ok(method),
        // Client must close after 0xFF; we close from our side too
        AuthMethod::NoAcceptable => Err(SessionError::NoAcceptableMethods),
    }
}

/// select_auth_method picks the reply method. Only NO AUTH is ever served,
/// so under the default policy the offer is not inspected at all
fn select_auth_method(client_methods: &[u8], policy: MethodPolicy) -> AuthMethod {
    match policy {
        MethodPolicy::AlwaysNoAuth => AuthMethod::NoAuth,
        MethodPolicy::Strict if client_methods.contains(&(AuthMethod::NoAuth as u8)) => {
            AuthMethod::NoAuth
        }
        MethodPolicy::Strict => AuthMethod::NoAcceptable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    async fn negotiate(
        hello: &[u8],
        policy: MethodPolicy,
    ) -> (Result<AuthMethod, SessionError>, Vec<u8>) {
        let (mut client, mut server) = duplex(64);
        client.write_all(hello).await.unwrap();
        client.shutdown().await.unwrap();

        let result = negotiate_auth(&mut server, policy).await;
        drop(server);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        (result, reply)
    }

    #[tokio::test]
    async fn replies_no_auth() {
        let (result, reply) = negotiate(&[0x05, 0x01, 0x00], MethodPolicy::AlwaysNoAuth).await;
        assert_eq!(result.unwrap(), AuthMethod::NoAuth);
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn replies_no_auth_regardless_of_offer() {
        // Only USER/PASS and GSSAPI offered
        let (result, reply) =
            negotiate(&[0x05, 0x02, 0x02, 0x01], MethodPolicy::AlwaysNoAuth).await;
        assert_eq!(result.unwrap(), AuthMethod::NoAuth);
        assert_eq!(reply, [0x05, 0x00]);

        // Empty method list
        let (result, reply) = negotiate(&[0x05, 0x00], MethodPolicy::AlwaysNoAuth).await;
        assert_eq!(result.unwrap(), AuthMethod::NoAuth);
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn wrong_version_sends_nothing() {
        let (result, reply) = negotiate(&[0x04, 0x01, 0x00], MethodPolicy::AlwaysNoAuth).await;
        assert!(matches!(result, Err(SessionError::ProtocolMismatch(0x04))));
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn truncated_method_list_is_a_read_error() {
        let (result, reply) = negotiate(&[0x05, 0x03, 0x00], MethodPolicy::AlwaysNoAuth).await;
        assert!(matches!(result, Err(SessionError::TransportRead(_))));
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn strict_policy_rejects_missing_no_auth() {
        let (result, reply) = negotiate(&[0x05, 0x01, 0x02], MethodPolicy::Strict).await;
        assert!(matches!(result, Err(SessionError::NoAcceptableMethods)));
        assert_eq!(reply, [0x05, 0xFF]);
    }

    #[tokio::test]
    async fn strict_policy_accepts_offered_no_auth() {
        let (result, reply) = negotiate(&[0x05, 0x02, 0x02, 0x00], MethodPolicy::Strict).await;
        assert_eq!(result.unwrap(), AuthMethod::NoAuth);
        assert_eq!(reply, [0x05, 0x00]);
    }
}
