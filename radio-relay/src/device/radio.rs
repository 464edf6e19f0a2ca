use embedded_hal::blocking::delay::DelayMs;
use log::trace;
use radio::{RadioState, Receive, Rssi, State, Transmit};
use std::fmt::Debug;
use std::time::{Duration, Instant};

use super::device::{Transceiver, MAX_RADIO_PAYLOAD};
use crate::channels::Channel;

/// Received power, in dBm, above which a channel is considered busy.
///
/// This is the fixed threshold of the nRF24 received-power-detector.
pub const BUSY_RSSI_THRESHOLD: i16 = -64;

/// Longest wait for the end of a transmission before reporting a stuck radio.
const TRANSMIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Radio physical device representation, as a set of radio HAL traits sharing
/// one error type.
pub trait Radio<E>:
    Transmit<Error = E>
    + Receive<Error = E>
    + radio::Channel<Channel = Channel, Error = E>
    + Rssi<Error = E>
    + State<Error = E>
    + DelayMs<u32>
{
}

impl<
        E: Debug,
        T: Transmit<Error = E>
            + Receive<Error = E>
            + radio::Channel<Channel = Channel, Error = E>
            + Rssi<Error = E>
            + State<Error = E>
            + DelayMs<u32>,
    > Radio<E> for T
{
}

/// [Transceiver] backed by any radio HAL driver.
pub struct HalTransceiver<T, E>
where
    T: Radio<E>,
    E: Debug,
{
    radio: T,
    busy_threshold: i16,
    phantom: std::marker::PhantomData<E>,
}

impl<T, E> HalTransceiver<T, E>
where
    T: Radio<E>,
    E: Debug,
{
    pub fn new(radio: T) -> Self {
        Self {
            radio,
            busy_threshold: BUSY_RSSI_THRESHOLD,
            phantom: std::marker::PhantomData,
        }
    }

    /// Overrides the busy threshold, for radios without a fixed power detector.
    pub fn with_busy_threshold(mut self, dbm: i16) -> Self {
        self.busy_threshold = dbm;
        self
    }

    pub fn into_inner(self) -> T {
        self.radio
    }
}

impl<T, E> DelayMs<u32> for HalTransceiver<T, E>
where
    T: Radio<E>,
    E: Debug,
{
    fn delay_ms(&mut self, ms: u32) {
        self.radio.delay_ms(ms)
    }
}

impl<T, E> Transceiver for HalTransceiver<T, E>
where
    T: Radio<E>,
    E: Debug,
{
    type Error = HalError<E>;

    fn tune(&mut self, channel: Channel) -> Result<(), Self::Error> {
        self.radio.set_channel(&channel).map_err(HalError::Radio)
    }

    fn enable_receive_mode(&mut self) -> Result<(), Self::Error> {
        self.radio.start_receive().map_err(HalError::Radio)
    }

    fn is_busy_signal(&mut self) -> Result<bool, Self::Error> {
        let rssi = self.radio.poll_rssi().map_err(HalError::Radio)?;
        Ok(rssi >= self.busy_threshold)
    }

    fn has_incoming_frame(&mut self) -> Result<bool, Self::Error> {
        self.radio.check_receive(true).map_err(HalError::Radio)
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, Self::Error> {
        let mut buf = [0u8; MAX_RADIO_PAYLOAD];
        let (size, _info) = self.radio.get_received(&mut buf).map_err(HalError::Radio)?;
        Ok(buf[..size.min(MAX_RADIO_PAYLOAD)].to_vec())
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        self.radio.start_transmit(frame).map_err(HalError::Radio)?;
        let start = Instant::now();
        while !self.radio.check_transmit().map_err(HalError::Radio)? {
            if start.elapsed() > TRANSMIT_TIMEOUT {
                return Err(HalError::TransmitTimeout);
            }
            trace!("Transmission check");
            self.radio.delay_ms(1);
        }
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), Self::Error> {
        self.radio
            .set_state(<T as State>::State::sleep())
            .map_err(HalError::Radio)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum HalError<E>
where
    E: Debug,
{
    #[error("Transmission did not complete within {:?}.", TRANSMIT_TIMEOUT)]
    TransmitTimeout,

    #[error("Internal radio error: {:?}", .0)]
    Radio(E),
}

#[cfg(test)]
mod tests {
    use super::*;
    use radio::BasicInfo;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum FakeState {
        Idle,
        Sleep,
    }

    impl RadioState for FakeState {
        fn idle() -> Self {
            FakeState::Idle
        }

        fn sleep() -> Self {
            FakeState::Sleep
        }
    }

    /// Radio HAL driver answering from fixed values.
    #[derive(Debug)]
    struct FakeHal {
        channel: Channel,
        rssi: i16,
        rx: Option<Vec<u8>>,
        sent: Vec<Vec<u8>>,
        polls_before_sent: usize,
        state: FakeState,
    }

    impl FakeHal {
        fn new() -> Self {
            Self {
                channel: 0,
                rssi: -90,
                rx: None,
                sent: Vec::new(),
                polls_before_sent: 0,
                state: FakeState::Idle,
            }
        }
    }

    impl Transmit for FakeHal {
        type Error = ();

        fn start_transmit(&mut self, data: &[u8]) -> Result<(), ()> {
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn check_transmit(&mut self) -> Result<bool, ()> {
            if self.polls_before_sent == usize::MAX {
                return Ok(false);
            }
            if self.polls_before_sent > 0 {
                self.polls_before_sent -= 1;
                return Ok(false);
            }
            Ok(true)
        }
    }

    impl Receive for FakeHal {
        type Error = ();
        type Info = BasicInfo;

        fn start_receive(&mut self) -> Result<(), ()> {
            Ok(())
        }

        fn check_receive(&mut self, _restart: bool) -> Result<bool, ()> {
            Ok(self.rx.is_some())
        }

        fn get_received(&mut self, buff: &mut [u8]) -> Result<(usize, BasicInfo), ()> {
            let frame = self.rx.take().ok_or(())?;
            buff[..frame.len()].copy_from_slice(&frame);
            Ok((frame.len(), BasicInfo::default()))
        }
    }

    impl radio::Channel for FakeHal {
        type Channel = Channel;
        type Error = ();

        fn set_channel(&mut self, channel: &Channel) -> Result<(), ()> {
            self.channel = *channel;
            Ok(())
        }
    }

    impl Rssi for FakeHal {
        type Error = ();

        fn poll_rssi(&mut self) -> Result<i16, ()> {
            Ok(self.rssi)
        }
    }

    impl State for FakeHal {
        type State = FakeState;
        type Error = ();

        fn set_state(&mut self, state: FakeState) -> Result<(), ()> {
            self.state = state;
            Ok(())
        }

        fn get_state(&mut self) -> Result<FakeState, ()> {
            Ok(self.state)
        }
    }

    impl DelayMs<u32> for FakeHal {
        fn delay_ms(&mut self, _ms: u32) {}
    }

    #[test]
    fn busy_flag_follows_the_power_detector_threshold() {
        let mut radio = HalTransceiver::new(FakeHal::new());
        radio.tune(35).unwrap();
        assert!(!radio.is_busy_signal().unwrap());

        let mut hal = radio.into_inner();
        assert_eq!(hal.channel, 35);
        hal.rssi = BUSY_RSSI_THRESHOLD;
        let mut radio = HalTransceiver::new(hal);
        assert!(radio.is_busy_signal().unwrap());

        let mut radio = radio.with_busy_threshold(-40);
        assert!(!radio.is_busy_signal().unwrap());
    }

    #[test]
    fn frames_go_through_the_driver() {
        let mut hal = FakeHal::new();
        hal.rx = Some(vec![0xFF, 0, 3]);
        hal.polls_before_sent = 2;
        let mut radio = HalTransceiver::new(hal);

        assert!(radio.has_incoming_frame().unwrap());
        assert_eq!(radio.read_frame().unwrap(), vec![0xFF, 0, 3]);
        assert!(!radio.has_incoming_frame().unwrap());

        radio.send_frame(&[1, 2]).unwrap();
        radio.power_down().unwrap();
        let hal = radio.into_inner();
        assert_eq!(hal.sent, vec![vec![1, 2]]);
        assert_eq!(hal.state, FakeState::Sleep);
    }

    #[test]
    fn stuck_transmission_times_out() {
        let mut hal = FakeHal::new();
        hal.polls_before_sent = usize::MAX;
        let mut radio = HalTransceiver::new(hal);
        assert!(matches!(
            radio.send_frame(&[1]),
            Err(HalError::TransmitTimeout)
        ));
    }
}
