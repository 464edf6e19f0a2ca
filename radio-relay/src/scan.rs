//! Channel selection: the least busy own channel to transmit on, and the first
//! active other channel to listen on.
use log::{debug, info};
use std::time::Instant;

use crate::channels::Channel;
use crate::config::{millis, RelayConfig};
use crate::device::Transceiver;
use crate::error::RelayError;
use crate::shutdown::Shutdown;

/// Picks the own channel with the fewest busy samples over
/// [RelayConfig::scan_passes] passes. Ties go to the first channel of `own`.
///
/// Never fails for lack of a free channel: with every channel saturated the
/// least bad one is still returned.
///
/// # Panics
///
/// Panics if `own` is empty. [ChannelPartition](crate::ChannelPartition)
/// never hands out an empty slice.
pub fn select_free_channel<T: Transceiver>(
    radio: &mut T,
    own: &[Channel],
    config: &RelayConfig,
    shutdown: &Shutdown,
) -> Result<Channel, RelayError<T::Error>> {
    assert!(!own.is_empty(), "No own channel declared!");
    radio
        .enable_receive_mode()
        .map_err(RelayError::InternalRadioError)?;

    info!("Looking for a free channel among {:?}", own);
    let mut occupancy = vec![0u32; own.len()];
    for _ in 0..config.scan_passes {
        for (i, channel) in own.iter().enumerate() {
            shutdown.check()?;
            radio
                .tune(*channel)
                .map_err(RelayError::InternalRadioError)?;
            radio.delay_ms(millis(config.settle));
            if radio
                .is_busy_signal()
                .map_err(RelayError::InternalRadioError)?
            {
                occupancy[i] += 1;
            }
        }
    }

    let mut selected = own[0];
    let mut best = u32::MAX;
    for (busy, channel) in occupancy.iter().zip(own) {
        if *busy < best {
            selected = *channel;
            best = *busy;
        }
    }
    info!(
        "Selected channel {} (busy {}/{} samples)",
        selected, best, config.scan_passes
    );
    Ok(selected)
}

/// Round-robins through `other` from `start_index` until a channel carries
/// an incoming frame, dwelling at most [RelayConfig::dwell] on each.
///
/// Returns the channel together with the running index it was found at, so
/// that the next hunt can resume from `index + 1`. Blocks until a signal is
/// found or the node is interrupted.
///
/// # Panics
///
/// Panics if `other` is empty.
pub fn hunt_for_signal<T: Transceiver>(
    radio: &mut T,
    other: &[Channel],
    start_index: usize,
    config: &RelayConfig,
    shutdown: &Shutdown,
) -> Result<(Channel, usize), RelayError<T::Error>> {
    assert!(!other.is_empty(), "No channel to listen on!");
    radio
        .enable_receive_mode()
        .map_err(RelayError::InternalRadioError)?;

    info!("Hunting for a transmitter");
    let mut index = start_index;
    loop {
        let channel = other[index % other.len()];
        debug!("Listening on channel {}", channel);
        let start = Instant::now();
        loop {
            shutdown.check()?;
            radio
                .tune(channel)
                .map_err(RelayError::InternalRadioError)?;
            radio.delay_ms(millis(config.settle));
            if radio
                .has_incoming_frame()
                .map_err(RelayError::InternalRadioError)?
            {
                info!("Signal found on channel {}", channel);
                return Ok((channel, index));
            }
            if start.elapsed() >= config.dwell {
                break;
            }
        }
        index = index.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::{MockError, MockRadio};
    use std::time::Duration;

    fn config(passes: u32) -> RelayConfig {
        RelayConfig {
            scan_passes: passes,
            settle: Duration::from_millis(200),
            dwell: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn picks_the_least_busy_channel() {
        let mut radio = MockRadio::new()
            .script_busy(10, &[true, true, false])
            .script_busy(20, &[false, true, false])
            .script_busy(30, &[true, true, true]);
        let channel =
            select_free_channel(&mut radio, &[10, 20, 30], &config(3), &Shutdown::new()).unwrap();
        assert_eq!(channel, 20);
        assert_eq!(radio.tuned, vec![10, 20, 30, 10, 20, 30, 10, 20, 30]);
        assert_eq!(radio.slept_ms, 9 * 200);
    }

    #[test]
    fn ties_go_to_the_first_channel() {
        let mut radio = MockRadio::new()
            .script_busy(10, &[true, false])
            .script_busy(20, &[false, false])
            .script_busy(30, &[false, false])
            .script_busy(40, &[true, true]);
        let channel =
            select_free_channel(&mut radio, &[10, 20, 30, 40], &config(2), &Shutdown::new())
                .unwrap();
        assert_eq!(channel, 20);
    }

    #[test]
    fn saturated_channels_still_yield_one() {
        let mut radio = MockRadio::new()
            .script_busy(10, &[true; 4])
            .script_busy(20, &[true; 4]);
        let channel =
            select_free_channel(&mut radio, &[10, 20], &config(4), &Shutdown::new()).unwrap();
        assert_eq!(channel, 10);
    }

    #[test]
    fn radio_failure_is_fatal() {
        let mut radio = MockRadio::new();
        radio.fail_after_tunes = Some(2);
        let res = select_free_channel(&mut radio, &[10, 20], &config(4), &Shutdown::new());
        assert!(matches!(res, Err(RelayError::InternalRadioError(MockError))));
    }

    #[test]
    fn hunt_resumes_from_start_index_and_wraps() {
        let mut radio = MockRadio::new().queue_frames(5, vec![vec![0xFF]]);
        let (channel, index) =
            hunt_for_signal(&mut radio, &[5, 10, 15], 4, &config(1), &Shutdown::new()).unwrap();
        // 4 % 3 = 1 -> 10, then 15, then 5.
        assert_eq!(channel, 5);
        assert_eq!(index, 6);
        assert_eq!(radio.tuned, vec![10, 15, 5]);
        assert!(radio.listening);
    }

    #[test]
    fn hunt_dwells_until_the_timeout() {
        let mut radio = MockRadio::new().queue_frames(15, vec![vec![0]]);
        let config = RelayConfig {
            settle: Duration::ZERO,
            dwell: Duration::from_millis(5),
            ..Default::default()
        };
        let (channel, index) =
            hunt_for_signal(&mut radio, &[5, 10, 15], 0, &config, &Shutdown::new()).unwrap();
        assert_eq!((channel, index), (15, 2));
        // Several polls on each silent channel before moving on.
        assert!(radio.tuned.iter().filter(|ch| **ch == 5).count() > 1);
    }

    #[test]
    #[should_panic(expected = "No own channel declared!")]
    fn selecting_among_no_channel_panics() {
        let _ = select_free_channel(&mut MockRadio::new(), &[], &config(1), &Shutdown::new());
    }

    #[test]
    #[should_panic(expected = "No channel to listen on!")]
    fn hunting_on_no_channel_panics() {
        let _ = hunt_for_signal(&mut MockRadio::new(), &[], 0, &config(1), &Shutdown::new());
    }

    #[test]
    fn hunt_stops_on_interrupt() {
        let mut radio = MockRadio::new();
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let res = hunt_for_signal(&mut radio, &[5, 10], 0, &config(1), &shutdown);
        assert!(matches!(res, Err(RelayError::Interrupted)));
    }
}
