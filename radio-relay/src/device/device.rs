use embedded_hal::blocking::delay::DelayMs;
use std::fmt::Debug;

use crate::channels::Channel;

/// Largest frame the transceiver carries (tag byte included).
pub const MAX_RADIO_PAYLOAD: usize = 32;

/// Minimal transceiver surface required by the relay protocol.
///
/// All nodes share a single broadcast address; the transceiver runs without
/// auto-acknowledgement nor retransmission. Every call is blocking and the
/// handle is owned by one node at a time.
pub trait Transceiver: DelayMs<u32> {
    type Error: Debug;

    /// Switches the active frequency.
    fn tune(&mut self, channel: Channel) -> Result<(), Self::Error>;

    /// Arms the receiver so incoming frames land in the RX FIFO.
    fn enable_receive_mode(&mut self) -> Result<(), Self::Error>;

    /// Received-power-detect flag of the currently tuned channel.
    fn is_busy_signal(&mut self) -> Result<bool, Self::Error>;

    /// Non-blocking poll of the RX FIFO.
    fn has_incoming_frame(&mut self) -> Result<bool, Self::Error>;

    /// Pops exactly one frame (tag byte and payload, at most [MAX_RADIO_PAYLOAD] bytes).
    fn read_frame(&mut self) -> Result<Vec<u8>, Self::Error>;

    /// Best-effort broadcast, no acknowledgement.
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error>;

    fn power_down(&mut self) -> Result<(), Self::Error>;
}
