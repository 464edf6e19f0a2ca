//! Scripted transceiver for unit tests.
use embedded_hal::blocking::delay::DelayMs;
use std::collections::{HashMap, VecDeque};

use super::device::Transceiver;
use crate::channels::Channel;
use crate::shutdown::Shutdown;

#[derive(Debug, PartialEq, Eq)]
pub struct MockError;

/// Plays back busy flags and incoming frames per channel and records what the
/// protocol did with the radio.
#[derive(Debug, Default)]
pub struct MockRadio {
    pub channel: Option<Channel>,
    pub listening: bool,
    pub powered_down: bool,
    /// Busy flags returned, in order, for each channel. Idle once exhausted.
    pub busy: HashMap<Channel, VecDeque<bool>>,
    /// Frames waiting to be received on each channel.
    pub incoming: HashMap<Channel, VecDeque<Vec<u8>>>,
    pub tuned: Vec<Channel>,
    pub sent: Vec<(Channel, Vec<u8>)>,
    pub slept_ms: u64,
    /// Raises the shutdown flag once that many frames were sent.
    pub stop_after: Option<(usize, Shutdown)>,
    /// Fails every radio call once that many tunes happened.
    pub fail_after_tunes: Option<usize>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_busy(mut self, channel: Channel, flags: &[bool]) -> Self {
        self.busy.insert(channel, flags.iter().copied().collect());
        self
    }

    pub fn queue_frames(mut self, channel: Channel, frames: Vec<Vec<u8>>) -> Self {
        self.incoming.entry(channel).or_default().extend(frames);
        self
    }

    fn check(&self) -> Result<(), MockError> {
        match self.fail_after_tunes {
            Some(n) if self.tuned.len() > n => Err(MockError),
            _ => Ok(()),
        }
    }

    fn current(&self) -> Channel {
        self.channel.unwrap_or_default()
    }
}

impl DelayMs<u32> for MockRadio {
    fn delay_ms(&mut self, ms: u32) {
        self.slept_ms += ms as u64;
    }
}

impl Transceiver for MockRadio {
    type Error = MockError;

    fn tune(&mut self, channel: Channel) -> Result<(), Self::Error> {
        self.tuned.push(channel);
        self.check()?;
        self.channel = Some(channel);
        Ok(())
    }

    fn enable_receive_mode(&mut self) -> Result<(), Self::Error> {
        self.check()?;
        self.listening = true;
        Ok(())
    }

    fn is_busy_signal(&mut self) -> Result<bool, Self::Error> {
        self.check()?;
        let channel = self.current();
        Ok(self
            .busy
            .get_mut(&channel)
            .and_then(|flags| flags.pop_front())
            .unwrap_or(false))
    }

    fn has_incoming_frame(&mut self) -> Result<bool, Self::Error> {
        self.check()?;
        let channel = self.current();
        Ok(self.listening
            && self
                .incoming
                .get(&channel)
                .map_or(false, |frames| !frames.is_empty()))
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, Self::Error> {
        self.check()?;
        let channel = self.current();
        self.incoming
            .get_mut(&channel)
            .and_then(|frames| frames.pop_front())
            .ok_or(MockError)
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        self.check()?;
        self.listening = false;
        let channel = self.current();
        self.sent.push((channel, frame.to_vec()));
        if let Some((n, shutdown)) = &self.stop_after {
            if self.sent.len() >= *n {
                shutdown.trigger();
            }
        }
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), Self::Error> {
        self.powered_down = true;
        self.listening = false;
        Ok(())
    }
}
