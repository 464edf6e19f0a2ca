//! Store-and-forward file relay over low-power packet radios.
//!
//! Every node owns a disjoint slice of the channel table to transmit on and
//! listens on all the other channels. A file is framed into a header frame
//! (length and SHAKE-256 digest) followed by indexed data frames, repeated
//! forever by the transmitter since the radios offer no acknowledgement.
//! A relay reassembles the frames, verifies the digest and starts
//! transmitting the file on its own channels.
pub mod channels;
pub mod config;
pub mod device;
pub mod error;
pub mod receive;
pub mod relay;
pub mod scan;
pub mod shutdown;
pub mod transmit;

pub use channels::{Channel, ChannelPartition, ChannelTable, NodeId};
pub use config::RelayConfig;
pub use error::RelayError;
pub use relay::{Node, Persistence, Role, Storage};
pub use shutdown::Shutdown;
