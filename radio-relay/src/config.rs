use std::time::Duration;

/// Timing and retry parameters of a node.
///
/// The defaults match the settling requirements of the power-detect circuit of
/// nRF24-class transceivers. Tests and simulations shrink them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Number of passes over the own channels when looking for a free channel.
    pub scan_passes: u32,
    /// Wait after tuning before the busy flag or the RX FIFO can be trusted.
    pub settle: Duration,
    /// Maximum time spent listening on one channel while hunting.
    pub dwell: Duration,
    /// Sleep between two polls of the RX FIFO while collecting frames.
    pub poll_interval: Duration,
    /// Silence tolerated mid-transfer before going back to hunting.
    pub silence_timeout: Duration,
    /// Consecutive digest mismatches tolerated before going back to hunting.
    pub failure_threshold: u32,
    /// Sleep between two looks at the storage for content to transmit.
    pub media_poll: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            scan_passes: 10,
            settle: Duration::from_millis(200),
            dwell: Duration::from_millis(200),
            poll_interval: Duration::from_millis(5),
            silence_timeout: Duration::from_secs(3),
            failure_threshold: 50,
            media_poll: Duration::from_secs(1),
        }
    }
}

/// Duration as whole milliseconds for `DelayMs`, saturating.
pub(crate) fn millis(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}
