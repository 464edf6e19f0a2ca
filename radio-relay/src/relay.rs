//! Node run loop: an origin broadcasts the content found on its storage, a
//! relay receives it first, stores it and then broadcasts it in turn.
use log::{error, info, warn};
use std::convert::Infallible;
use std::io;
use std::path::PathBuf;

use crate::channels::ChannelPartition;
use crate::config::{millis, RelayConfig};
use crate::device::Transceiver;
use crate::error::RelayError;
use crate::receive::Receiver;
use crate::shutdown::Shutdown;
use crate::transmit::transmit_forever;

/// Whether the node starts with the content or has to receive it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Origin,
    Relay,
}

/// Outcome of a persistence attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    Stored(PathBuf),
    /// The backing medium is not available yet; try again later.
    Deferred,
}

/// Where content comes from and where received content goes.
pub trait Storage {
    /// Content to broadcast, if any is available right now.
    fn locate_content(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Stores received content.
    fn persist(&mut self, content: &[u8]) -> io::Result<Persistence>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn locate_content(&mut self) -> io::Result<Option<Vec<u8>>> {
        (**self).locate_content()
    }

    fn persist(&mut self, content: &[u8]) -> io::Result<Persistence> {
        (**self).persist(content)
    }
}

/// Latched persistence of the received content.
#[derive(Debug, Default)]
struct PendingPersist {
    done: bool,
}

impl PendingPersist {
    fn attempt<S: Storage>(&mut self, storage: &mut S, content: &[u8]) {
        if self.done {
            return;
        }
        match storage.persist(content) {
            Ok(Persistence::Stored(path)) => {
                info!("Received content stored at {}", path.display());
                self.done = true;
            }
            Ok(Persistence::Deferred) => {}
            Err(err) => warn!("Failed to store the received content: {}", err),
        }
    }
}

/// One node of the mesh: its radio, its channels and its timings.
pub struct Node<T: Transceiver> {
    radio: T,
    partition: ChannelPartition,
    config: RelayConfig,
    shutdown: Shutdown,
}

impl<T: Transceiver> Node<T> {
    pub fn new(radio: T, partition: ChannelPartition, config: RelayConfig, shutdown: Shutdown) -> Self {
        Self {
            radio,
            partition,
            config,
            shutdown,
        }
    }

    pub fn partition(&self) -> &ChannelPartition {
        &self.partition
    }

    /// Runs the node in `role` until interrupted or the radio fails.
    pub fn run<S: Storage>(
        &mut self,
        role: Role,
        storage: &mut S,
    ) -> Result<Infallible, RelayError<T::Error>> {
        match role {
            Role::Origin => self.run_origin(storage),
            Role::Relay => self.run_relay(storage),
        }
    }

    /// Waits for content on the storage, then broadcasts it forever.
    pub fn run_origin<S: Storage>(
        &mut self,
        storage: &mut S,
    ) -> Result<Infallible, RelayError<T::Error>> {
        info!("Acting as origin");
        let content = self.wait_for_content(storage)?;
        info!("Content of {}B found", content.len());
        transmit_forever(
            &mut self.radio,
            &content,
            self.partition.own(),
            &self.config,
            &self.shutdown,
            |_| {},
        )
    }

    /// Receives the content, stores it and broadcasts it forever.
    ///
    /// Content already present on the storage is broadcast directly. Storing is
    /// retried after every cycle until the medium accepts it.
    pub fn run_relay<S: Storage>(
        &mut self,
        storage: &mut S,
    ) -> Result<Infallible, RelayError<T::Error>> {
        let preloaded = storage.locate_content().unwrap_or_else(|err| {
            warn!("Failed to look for content on storage: {}", err);
            None
        });
        if let Some(content) = preloaded {
            info!("Content of {}B already on storage, acting as origin", content.len());
            return transmit_forever(
                &mut self.radio,
                &content,
                self.partition.own(),
                &self.config,
                &self.shutdown,
                |_| {},
            );
        }

        info!("Acting as relay");
        let content = Receiver::new(
            &mut self.radio,
            self.partition.other(),
            &self.config,
            &self.shutdown,
        )
        .receive()?;

        let mut pending = PendingPersist::default();
        pending.attempt(storage, &content);
        if !pending.done {
            info!("No medium to store the content yet, will retry while transmitting");
        }
        transmit_forever(
            &mut self.radio,
            &content,
            self.partition.own(),
            &self.config,
            &self.shutdown,
            |_| pending.attempt(storage, &content),
        )
    }

    /// Releases the radio. Errors are logged, the node is going away anyway.
    pub fn power_down(&mut self) {
        if let Err(err) = self.radio.power_down() {
            error!("Radio power down failed: {:?}", err);
        }
    }

    pub fn into_radio(self) -> T {
        self.radio
    }

    fn wait_for_content<S: Storage>(
        &mut self,
        storage: &mut S,
    ) -> Result<Vec<u8>, RelayError<T::Error>> {
        let mut waiting = WaitReason::default();
        loop {
            self.shutdown.check()?;
            match storage.locate_content() {
                Ok(Some(content)) => return Ok(content),
                Ok(None) => {
                    if waiting.update(WaitReason::NoContent) {
                        info!("Waiting for content to transmit...");
                    }
                }
                Err(err) => {
                    if waiting.update(WaitReason::Unreadable(err.kind())) {
                        warn!("Storage unreadable, waiting for it: {}", err);
                    }
                }
            }
            self.radio.delay_ms(millis(self.config.media_poll));
        }
    }
}

/// Why the origin has nothing to transmit yet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
enum WaitReason {
    #[default]
    Starting,
    NoContent,
    Unreadable(io::ErrorKind),
}

impl WaitReason {
    /// Records `next`, true when it differs from the previous reason.
    fn update(&mut self, next: WaitReason) -> bool {
        if *self == next {
            return false;
        }
        *self = next;
        true
    }
}
