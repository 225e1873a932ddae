use anyhow::Result;
use clap::Parser;
use ss5::{MethodPolicy, ServerConfig, Socks5Server};
use std::time::Duration;
use tracing::{error, info};

// Try it with: curl --socks5 127.0.0.1:1080 http://example.com
#[derive(Parser, Debug)]
#[command(author, version, about = "A lightweight SOCKS5 proxy", long_about = None)]
struct Args {
    /// Listener address
    #[arg(short, long, default_value = "0.0.0.0:1080")]
    listen: String,

    /// Seconds a client has to finish negotiation and its request
    #[arg(long, value_name = "SECS")]
    handshake_timeout: Option<u64>,

    /// Seconds to wait for the destination to accept
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Relay buffer per direction, in bytes
    #[arg(long, default_value_t = ss5::config::DEFAULT_RELAY_BUFFER)]
    buffer_size: usize,

    /// Answer 0xFF to clients that do not offer "no authentication"
    #[arg(long)]
    strict_auth: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let policy = if self.strict_auth {
            MethodPolicy::Strict
        } else {
            MethodPolicy::AlwaysNoAuth
        };

        ServerConfig::default()
            .with_handshake_timeout(self.handshake_timeout.map(Duration::from_secs))
            .with_connect_timeout(self.connect_timeout.map(Duration::from_secs))
            .with_relay_buffer_size(self.buffer_size)
            .with_method_policy(policy)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    // Instantiate server
    let mut server = Socks5Server::new(args.listen.clone()).with_config(args.server_config());
    info!(
        "Starting SOCKS5 proxy: {} ({:?})",
        server.listen_addr,
        server.config()
    );

    // Stop accepting on Ctrl-C
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => error!("unable to listen for interrupt: {e}"),
        }
        shutdown.cancel();
    });

    // Run it
    server.run().await
}
