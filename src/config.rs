use std::time::Duration;

/// Default per-direction relay buffer
pub const DEFAULT_RELAY_BUFFER: usize = 8 * 1024;

/// MethodPolicy decides how the method-selection reply is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodPolicy {
    /// Always answer NO AUTHENTICATION REQUIRED, whatever the client offered
    #[default]
    AlwaysNoAuth,
    /// Answer NO ACCEPTABLE METHODS (0xFF) unless 0x00 was offered
    Strict,
}

/// ServerConfig holds the per-session knobs shared by every connection a
/// server accepts
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Deadline covering negotiation, the request and the dial
    pub handshake_timeout: Option<Duration>,
    /// Deadline for the outbound connect
    pub connect_timeout: Option<Duration>,
    /// Bounded buffer used by each relay direction
    pub relay_buffer_size: usize,
    pub method_policy: MethodPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: None,
            connect_timeout: None,
            relay_buffer_size: DEFAULT_RELAY_BUFFER,
            method_policy: MethodPolicy::default(),
        }
    }
}

/// ServerConfig implementation block
impl ServerConfig {
    /// with_handshake_timeout bounds how long a client may take to finish
    /// negotiation and send its request, and how long the dial may run
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// with_connect_timeout bounds the outbound connect
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// with_relay_buffer_size sets the relay buffer, never below one byte
    pub fn with_relay_buffer_size(mut self, size: usize) -> Self {
        self.relay_buffer_size = size.max(1);
        self
    }

    pub fn with_method_policy(mut self, policy: MethodPolicy) -> Self {
        self.method_policy = policy;
        self
    }
}
