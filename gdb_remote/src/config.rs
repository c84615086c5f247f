/// Largest packet payload accepted or produced, advertised as `PacketSize=2000`.
pub const MAX_PACKET_SIZE: usize = 0x2000;

pub const DEFAULT_PORT: u16 = 1234;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubConfig {
    /// TCP port the stub listens on (loopback only).
    pub port: u16,
    /// Consecutive checksum mismatches tolerated before the session is dropped.
    /// `None` retries forever.
    pub max_checksum_retries: Option<usize>,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_checksum_retries: None,
        }
    }
}
