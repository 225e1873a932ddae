use crate::auth::negotiate_auth;
use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::relay::{RelayStats, relay};
use crate::request::handle_request;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// SessionState tracks where a session is in the SOCKS5 exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitHandshake,
    Negotiated,
    AwaitRequest,
    Connected,
    Relaying,
    Closed,
    Aborted,
}

/// SessionState implementation block
impl SessionState {
    /// is_terminal reports whether the session has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Aborted)
    }
}

/// Session drives one accepted client connection from the first handshake
/// byte to the end of the relay. Connection handles are moved through the
/// stages, so each is dropped exactly once whichever way the session ends
pub struct Session {
    id: u64,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    state: SessionState,
}

/// Session implementation block
impl Session {
    pub fn new(id: u64, peer: SocketAddr, config: Arc<ServerConfig>) -> Self {
        Self {
            id,
            peer,
            config,
            state: SessionState::AwaitHandshake,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// run negotiates, connects and relays for the given inbound stream
    pub async fn run(&mut self, mut inbound: TcpStream) -> Result<RelayStats, SessionError> {
        if let Err(e) = inbound.set_nodelay(true) {
            warn!("could not set TCP_NODELAY for {}: {e}", self.peer);
        }

        // Handshake, request and dial share one deadline when configured
        let deadline = self
            .config
            .handshake_timeout
            .map(|limit| Instant::now() + limit);

        let outbound = match self.establish(&mut inbound, deadline).await {
            Ok(outbound) => outbound,
            Err(e) => {
                self.transition(SessionState::Aborted);
                return Err(e);
            }
        };

        self.transition(SessionState::Relaying);

        match relay(inbound, outbound, self.config.relay_buffer_size).await {
            Ok(stats) => {
                self.transition(SessionState::Closed);
                info!(
                    "connection closed: {} bytes from client, {} bytes from server",
                    stats.client_to_target, stats.target_to_client
                );
                Ok(stats)
            }
            Err(e) => {
                self.transition(SessionState::Aborted);
                Err(e)
            }
        }
    }

    /// establish runs negotiation and request handling. The outbound stream
    /// only exists once both have succeeded
    async fn establish(
        &mut self,
        inbound: &mut TcpStream,
        deadline: Option<Instant>,
    ) -> Result<TcpStream, SessionError> {
        let negotiation = negotiate_auth(&mut *inbound, self.config.method_policy);
        let method = match deadline {
            Some(at) => tokio::time::timeout_at(at, negotiation)
                .await
                .map_err(|_| SessionError::Timeout("method negotiation"))??,
            None => negotiation.await?,
        };
        debug!("selected method {method:?}");
        self.transition(SessionState::Negotiated);

        self.transition(SessionState::AwaitRequest);
        let outbound = handle_request(inbound, &self.config, deadline).await?;
        self.transition(SessionState::Connected);

        Ok(outbound)
    }

    fn transition(&mut self, next: SessionState) {
        debug!("session {}: {:?} -> {next:?}", self.id, self.state);
        self.state = next;
    }
}
