use std::time::Duration;

/// Default wait for the modem's local ACK/NAK.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(3);
/// Default wait for a remote device's direct ACK/NAK.
pub const DEFAULT_DIRECT_ACK_TIMEOUT: Duration = Duration::from_secs(3);
/// Default minimum spacing between distinct broadcast events.
pub const DEFAULT_DEDUP_INTERVAL: Duration = Duration::from_millis(700);
/// Default depth of waiter, subscriber and unhandled channels.
pub const DEFAULT_CHANNEL_DEPTH: usize = 64;

/// Configuration for the correlation engine.
#[derive(Debug, Clone)]
pub struct ModemConfig {
    /// Timeout for the local ACK/NAK echo. Default: 3 s.
    pub ack_timeout: Duration,
    /// Timeout for a direct ACK/NAK from the addressed device. Default: 3 s.
    pub direct_ack_timeout: Duration,
    /// Repeated broadcasts closer together than this (with no increase in
    /// hops left) are the same event. Default: 700 ms.
    pub dedup_interval: Duration,
    /// Buffer depth of each consumer channel. Default: 64.
    pub channel_depth: usize,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            direct_ack_timeout: DEFAULT_DIRECT_ACK_TIMEOUT,
            dedup_interval: DEFAULT_DEDUP_INTERVAL,
            channel_depth: DEFAULT_CHANNEL_DEPTH,
        }
    }
}
