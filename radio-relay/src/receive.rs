//! Receiving side of a transfer.
//!
//! The receiver alternates between two states:
//!
//! - **scanning**: [hunt_for_signal] over the listening channels until one of
//!   them carries a frame;
//! - **collecting**: every frame is fed to a fresh [Session]. The session
//!   stores the data frames by index and checks the digest each time the last
//!   index comes around.
//!
//! A verified transfer ends reception. Too many digest mismatches in a row, or
//! too long a silence, send the receiver back to scanning from the next
//! channel with a brand new session.
use log::{debug, info, trace, warn};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::channels::Channel;
use crate::config::{millis, RelayConfig};
use crate::device::frame::{self, Digest, Frame, Header};
use crate::device::Transceiver;
use crate::error::RelayError;
use crate::scan::hunt_for_signal;
use crate::shutdown::Shutdown;

/// What a frame did to the [Session].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Data frame with an index beyond the announced count.
    Ignored,
    /// Header or data frame recorded.
    Stored,
    /// Content reassembled and digest verified.
    Verified(Vec<u8>),
    /// Reassembled content does not match the digest.
    Mismatch { failures: u32 },
    /// Mismatch budget spent, the session is worthless.
    Exhausted,
}

/// Reassembly state of one transfer attempt.
///
/// Chunks are keyed by their frame index only. The digest is checked when the
/// last index arrives, and once more when the final empty slot gets filled,
/// so frames can be fed in any order.
#[derive(Debug, Clone)]
pub struct Session {
    digest: Option<Digest>,
    expected_frames: usize,
    /// Allocated by the first header only, so repeated headers keep the chunks.
    slots: Option<Vec<Option<Vec<u8>>>>,
    /// Data frames seen before any header.
    early: BTreeMap<u8, Vec<u8>>,
    failures: u32,
    failure_threshold: u32,
}

impl Session {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            digest: None,
            expected_frames: 0,
            slots: None,
            early: BTreeMap::new(),
            failures: 0,
            failure_threshold,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Number of data frames announced by the last header, if any was received.
    pub fn expected_frames(&self) -> Option<usize> {
        self.digest.map(|_| self.expected_frames)
    }

    /// Chunk stored at `index`, `None` while the slot is empty.
    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        self.slots
            .as_ref()
            .and_then(|slots| slots.get(index))
            .and_then(Option::as_deref)
    }

    pub fn accept(&mut self, frame: Frame) -> Step {
        match frame {
            Frame::Header(header) => self.accept_header(header),
            Frame::Data { index, chunk } => self.accept_data(index, chunk),
        }
    }

    fn accept_header(&mut self, header: Header) -> Step {
        self.digest = Some(header.digest);
        self.expected_frames = header.expected_frames();
        if self.slots.is_some() {
            return Step::Stored;
        }
        debug!(
            "New transfer: {}B in {} frames",
            header.length, self.expected_frames
        );
        let mut slots = vec![None; self.expected_frames];
        for (index, chunk) in std::mem::take(&mut self.early) {
            if let Some(slot) = slots.get_mut(index as usize) {
                *slot = Some(chunk);
            }
        }
        let complete = slots.iter().all(Option::is_some);
        self.slots = Some(slots);
        // An empty transfer has no last data frame to wait for.
        if complete {
            return self.verify();
        }
        Step::Stored
    }

    fn accept_data(&mut self, index: u8, chunk: Vec<u8>) -> Step {
        let Some(slots) = self.slots.as_mut() else {
            trace!("Frame {} kept until a header shows up", index);
            self.early.insert(index, chunk);
            return Step::Stored;
        };
        let Some(slot) = slots.get_mut(index as usize) else {
            debug!("Frame {} ignored: out of the {} slots", index, slots.len());
            return Step::Ignored;
        };
        let filled_a_hole = slot.replace(chunk).is_none();
        let last = index as usize + 1 == self.expected_frames;
        if last || (filled_a_hole && slots.iter().all(Option::is_some)) {
            return self.verify();
        }
        Step::Stored
    }

    fn verify(&mut self) -> Step {
        let content = self.assemble();
        if Some(frame::digest(&content)) == self.digest {
            return Step::Verified(content);
        }
        self.failures += 1;
        if self.failures >= self.failure_threshold {
            Step::Exhausted
        } else {
            Step::Mismatch {
                failures: self.failures,
            }
        }
    }

    fn assemble(&self) -> Vec<u8> {
        self.slots
            .as_deref()
            .unwrap_or_default()
            .iter()
            .flatten()
            .flatten()
            .copied()
            .collect()
    }
}

/// Receive state machine bound to one radio and its listening channels.
pub struct Receiver<'a, T: Transceiver> {
    radio: &'a mut T,
    other: &'a [Channel],
    config: &'a RelayConfig,
    shutdown: &'a Shutdown,
    hunt_index: usize,
}

impl<'a, T: Transceiver> Receiver<'a, T> {
    pub fn new(
        radio: &'a mut T,
        other: &'a [Channel],
        config: &'a RelayConfig,
        shutdown: &'a Shutdown,
    ) -> Self {
        Self {
            radio,
            other,
            config,
            shutdown,
            hunt_index: 0,
        }
    }

    /// Blocks until a transfer is verified and returns its content.
    pub fn receive(&mut self) -> Result<Vec<u8>, RelayError<T::Error>> {
        loop {
            let (channel, index) = hunt_for_signal(
                &mut *self.radio,
                self.other,
                self.hunt_index,
                self.config,
                self.shutdown,
            )?;
            self.hunt_index = index;
            if let Some(content) = self.collect(channel)? {
                return Ok(content);
            }
            self.hunt_index = self.hunt_index.wrapping_add(1);
        }
    }

    /// Collects frames on `channel` with a fresh session. `None` means the
    /// channel was given up and hunting must resume.
    fn collect(&mut self, channel: Channel) -> Result<Option<Vec<u8>>, RelayError<T::Error>> {
        self.radio
            .tune(channel)
            .map_err(RelayError::InternalRadioError)?;
        let mut session = Session::new(self.config.failure_threshold);
        let mut last_activity = Instant::now();
        loop {
            self.shutdown.check()?;
            if !self
                .radio
                .has_incoming_frame()
                .map_err(RelayError::InternalRadioError)?
            {
                if last_activity.elapsed() > self.config.silence_timeout {
                    warn!(
                        "No frame on channel {} for {:?}, hunting again",
                        channel, self.config.silence_timeout
                    );
                    return Ok(None);
                }
                self.radio.delay_ms(millis(self.config.poll_interval));
                continue;
            }

            let bytes = self
                .radio
                .read_frame()
                .map_err(RelayError::InternalRadioError)?;
            last_activity = Instant::now();
            let frame = match Frame::try_from_bytes(&bytes) {
                Ok(frame) => frame,
                Err(err) => {
                    debug!("Dropping frame: {}", err);
                    continue;
                }
            };
            match session.accept(frame) {
                Step::Verified(content) => {
                    info!("Transfer of {}B verified on channel {}", content.len(), channel);
                    return Ok(Some(content));
                }
                Step::Mismatch { failures } => {
                    warn!(
                        "Digest mismatch on channel {} ({}/{})",
                        channel, failures, self.config.failure_threshold
                    );
                }
                Step::Exhausted => {
                    warn!(
                        "Giving up channel {} after {} digest mismatches",
                        channel,
                        session.failures()
                    );
                    return Ok(None);
                }
                Step::Stored | Step::Ignored => {}
            }
        }
    }
}
