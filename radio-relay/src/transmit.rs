//! Transmitting side: the framed content is broadcast in a loop on the least
//! busy own channel. Nothing acknowledges frames, so repetition is the only
//! way for late or unlucky receivers to complete the transfer.
use log::{debug, info};
use std::convert::Infallible;

use crate::channels::Channel;
use crate::config::RelayConfig;
use crate::device::frame::{encode, Frame};
use crate::device::Transceiver;
use crate::error::RelayError;
use crate::scan::select_free_channel;
use crate::shutdown::Shutdown;

/// Broadcasts one content over and over.
pub struct Transmitter<'a, T: Transceiver> {
    radio: &'a mut T,
    /// Encoded frames, header first.
    cycle: Vec<Vec<u8>>,
    shutdown: &'a Shutdown,
}

impl<'a, T: Transceiver> Transmitter<'a, T> {
    /// Frames `content`; fails when it does not fit in the index space.
    pub fn new(
        radio: &'a mut T,
        content: &[u8],
        shutdown: &'a Shutdown,
    ) -> Result<Self, RelayError<T::Error>> {
        let frames = encode(content)?;
        debug!(
            "Cycle of {} frames for {}B: {:02X?}",
            frames.len(),
            content.len(),
            frames.first().map(Frame::to_bytes)
        );
        Ok(Self {
            radio,
            cycle: frames.iter().map(Frame::to_bytes).collect(),
            shutdown,
        })
    }

    /// Number of frames in one cycle, header included.
    pub fn cycle_len(&self) -> usize {
        self.cycle.len()
    }

    /// Picks the least busy own channel and tunes to it.
    pub fn select_channel(
        &mut self,
        own: &[Channel],
        config: &RelayConfig,
    ) -> Result<Channel, RelayError<T::Error>> {
        let channel = select_free_channel(&mut *self.radio, own, config, self.shutdown)?;
        self.radio
            .tune(channel)
            .map_err(RelayError::InternalRadioError)?;
        Ok(channel)
    }

    /// Sends the header then every data frame once, on the current channel.
    pub fn send_cycle(&mut self) -> Result<(), RelayError<T::Error>> {
        for frame in &self.cycle {
            self.shutdown.check()?;
            self.radio
                .send_frame(frame)
                .map_err(RelayError::InternalRadioError)?;
        }
        Ok(())
    }

    /// Sends cycles until interrupted, calling `after_cycle` with the number of
    /// completed cycles after each one.
    pub fn run<F>(&mut self, mut after_cycle: F) -> Result<Infallible, RelayError<T::Error>>
    where
        F: FnMut(u64),
    {
        let mut cycles: u64 = 0;
        loop {
            self.send_cycle()?;
            cycles += 1;
            after_cycle(cycles);
        }
    }
}

/// Selects a free own channel once, then broadcasts `content` forever.
pub fn transmit_forever<T, F>(
    radio: &mut T,
    content: &[u8],
    own: &[Channel],
    config: &RelayConfig,
    shutdown: &Shutdown,
    after_cycle: F,
) -> Result<Infallible, RelayError<T::Error>>
where
    T: Transceiver,
    F: FnMut(u64),
{
    let mut transmitter = Transmitter::new(radio, content, shutdown)?;
    let channel = transmitter.select_channel(own, config)?;
    info!(
        "Transmitting {}B on channel {} ({} frames per cycle)",
        content.len(),
        channel,
        transmitter.cycle_len()
    );
    transmitter.run(after_cycle)
}
