use crate::config::ServerConfig;
use crate::session::Session;
use anyhow::{Result, anyhow, bail};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};

// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Socks5Server represents a SOCKS5 server and houses related
/// configuration data. Sessions never reference the server
pub struct Socks5Server {
    pub listen_addr: String,
    config: Arc<ServerConfig>,
    listener: Option<TcpListener>,
    shutdown: CancellationToken,
    next_session: u64,
}

/// Socks5Server implementation block
impl Socks5Server {
    /// new is a constructor for the Socks5Server type
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            config: Arc::new(ServerConfig::default()),
            listener: None,
            shutdown: CancellationToken::new(),
            next_session: 0,
        }
    }

    /// with_config applies the per-session configuration
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        // Arc allows every session to share one copy
        self.config = Arc::new(config);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// bind to the listen address. Binding twice is an error
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        if self.listener.is_some() {
            bail!("[ERR] {} is already bound", self.listen_addr);
        }

        // Instantiate tokio listener
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .map_err(|e| anyhow!("[ERR] failed to bind {}: {e}", self.listen_addr))?;
        let addr = listener.local_addr()?;

        info!("SOCKS5 proxy listening on {addr}");

        self.listener = Some(listener);
        Ok(addr)
    }

    /// shutdown_token returns a handle that stops `run` when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// stop ends the accept loop. Sessions already running finish on their own
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// run binds if needed and accepts connections until stopped. A failing
    /// session never ends the loop
    pub async fn run(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow!("[ERR] no listener after bind"))?;

        // Listen for connections to proxy
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("SOCKS5 proxy on {} stopped", self.listen_addr);
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            let (inbound, peer_addr) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!("accept failed: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            self.next_session += 1;
            let id = self.next_session;
            let config = Arc::clone(&self.config);
            let span = info_span!("session", id, peer = %peer_addr);

            // Spawn async task
            tokio::spawn(
                async move {
                    info!("new client");

                    let mut session = Session::new(id, peer_addr, config);
                    if let Err(e) = session.run(inbound).await {
                        error!("connection error: {e}");
                    }
                }
                .instrument(span),
            );
        }
    }
}
