//! # Simulated radio medium
//!
//! In-process stand-in for a mesh of transceivers, used to run several nodes
//! on one host without hardware.
//!
//! - **Ether**: the shared medium. A frame sent on a channel is copied to the
//!   RX FIFO of every other radio tuned to that channel and in receive mode.
//! - **SimRadio**: one node's handle on the ether, implementing [Transceiver].
//!
//! The RX FIFO is 3 frames deep and drops new frames when full, like the
//! nRF24. A channel reads busy while a frame was sent on it within the last
//! [EtherConfig::busy_window]. Frames can be dropped at random to exercise the
//! retransmission cycle.
use embedded_hal::blocking::delay::DelayMs;
use log::trace;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::device::{Transceiver, MAX_RADIO_PAYLOAD};
use crate::channels::Channel;

const RX_FIFO_DEPTH: usize = 3;

#[derive(Debug, Copy, Clone)]
pub struct EtherConfig {
    /// Time on air of one frame; `send_frame` blocks for that long.
    pub airtime: Duration,
    /// How long a transmission keeps its channel busy.
    pub busy_window: Duration,
    /// Probability for each receiver to miss a frame.
    pub loss: f64,
}

impl Default for EtherConfig {
    fn default() -> Self {
        Self {
            airtime: Duration::from_millis(1),
            busy_window: Duration::from_millis(20),
            loss: 0.0,
        }
    }
}

#[derive(Debug)]
struct Station {
    channel: Channel,
    listening: bool,
    powered: bool,
    fifo: VecDeque<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Medium {
    stations: Vec<Station>,
    last_activity: HashMap<Channel, Instant>,
}

/// Shared radio medium.
#[derive(Debug, Clone)]
pub struct Ether {
    config: EtherConfig,
    medium: Arc<Mutex<Medium>>,
}

impl Ether {
    pub fn new(config: EtherConfig) -> Self {
        Self {
            config,
            medium: Arc::new(Mutex::new(Medium::default())),
        }
    }

    /// Plugs a new powered radio, idle on channel 0.
    pub fn attach(&self) -> SimRadio {
        let mut medium = lock(&self.medium);
        medium.stations.push(Station {
            channel: 0,
            listening: false,
            powered: true,
            fifo: VecDeque::with_capacity(RX_FIFO_DEPTH),
        });
        SimRadio {
            ether: self.clone(),
            station: medium.stations.len() - 1,
        }
    }

    fn broadcast(&self, from: usize, frame: &[u8]) {
        let mut medium = lock(&self.medium);
        let channel = medium.stations[from].channel;
        medium.last_activity.insert(channel, Instant::now());
        let mut rng = rand::thread_rng();
        for (i, station) in medium.stations.iter_mut().enumerate() {
            if i == from || !station.powered || !station.listening || station.channel != channel {
                continue;
            }
            if self.config.loss > 0.0 && rng.gen_bool(self.config.loss.min(1.0)) {
                trace!("Frame lost on channel {} for station {}", channel, i);
                continue;
            }
            if station.fifo.len() < RX_FIFO_DEPTH {
                station.fifo.push_back(frame.to_vec());
            }
        }
    }
}

fn lock(medium: &Mutex<Medium>) -> MutexGuard<'_, Medium> {
    // Poisoned by a panicking node thread; the medium itself stays consistent.
    medium.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One node's handle on the [Ether].
#[derive(Debug)]
pub struct SimRadio {
    ether: Ether,
    station: usize,
}

impl SimRadio {
    fn with_station<R>(
        &mut self,
        f: impl FnOnce(&mut Station, &HashMap<Channel, Instant>) -> R,
    ) -> Result<R, SimError> {
        let mut medium = lock(&self.ether.medium);
        let medium = &mut *medium;
        let station = &mut medium.stations[self.station];
        if !station.powered {
            return Err(SimError::PoweredDown);
        }
        Ok(f(station, &medium.last_activity))
    }
}

impl DelayMs<u32> for SimRadio {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

impl Transceiver for SimRadio {
    type Error = SimError;

    fn tune(&mut self, channel: Channel) -> Result<(), Self::Error> {
        self.with_station(|station, _| station.channel = channel)
    }

    fn enable_receive_mode(&mut self) -> Result<(), Self::Error> {
        self.with_station(|station, _| station.listening = true)
    }

    fn is_busy_signal(&mut self) -> Result<bool, Self::Error> {
        let window = self.ether.config.busy_window;
        self.with_station(|station, activity| {
            activity
                .get(&station.channel)
                .map_or(false, |last| last.elapsed() < window)
        })
    }

    fn has_incoming_frame(&mut self) -> Result<bool, Self::Error> {
        self.with_station(|station, _| !station.fifo.is_empty())
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, Self::Error> {
        self.with_station(|station, _| station.fifo.pop_front())?
            .ok_or(SimError::EmptyFifo)
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        if frame.len() > MAX_RADIO_PAYLOAD {
            return Err(SimError::Oversized { size: frame.len() });
        }
        self.with_station(|station, _| station.listening = false)?;
        self.ether.broadcast(self.station, frame);
        std::thread::sleep(self.ether.config.airtime);
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), Self::Error> {
        self.with_station(|station, _| {
            station.powered = false;
            station.listening = false;
            station.fifo.clear();
        })
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SimError {
    #[error("Radio is powered down.")]
    PoweredDown,

    #[error("RX FIFO is empty.")]
    EmptyFifo,

    #[error("Frame of {}B exceeds the {}B radio payload.", .size, MAX_RADIO_PAYLOAD)]
    Oversized { size: usize },
}
