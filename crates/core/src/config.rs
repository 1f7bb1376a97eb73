use crate::error::Result;
use crate::session::TransportMode;

/// Default number of packets the protocol library may buffer per read.
pub const DEFAULT_READ_BUFFER_COUNT: usize = 2048;

/// Configuration read by the pull and push drivers.
///
/// The bridge never loads or persists this; the embedding engine builds it
/// from whatever configuration source it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Transport for pull sessions. `None` alternates TCP and UDP across
    /// reconnect attempts, starting with TCP.
    pub pull_transport: Option<TransportMode>,
    /// Transport for push sessions, same semantics as `pull_transport`.
    pub push_transport: Option<TransportMode>,
    /// Inbound read-buffer sizing handed to the protocol library.
    pub read_buffer_count: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pull_transport: None,
            push_transport: None,
            read_buffer_count: DEFAULT_READ_BUFFER_COUNT,
        }
    }
}

impl BridgeConfig {
    /// Set the pull transport from its string form (`"tcp"`, `"udp"`, `""`).
    pub fn with_pull_protocol(mut self, protocol: &str) -> Result<Self> {
        self.pull_transport = TransportMode::parse_preference(protocol)?;
        Ok(self)
    }

    /// Set the push transport from its string form (`"tcp"`, `"udp"`, `""`).
    pub fn with_push_protocol(mut self, protocol: &str) -> Result<Self> {
        self.push_transport = TransportMode::parse_preference(protocol)?;
        Ok(self)
    }

    pub fn with_read_buffer_count(mut self, count: usize) -> Self {
        self.read_buffer_count = count;
        self
    }
}
