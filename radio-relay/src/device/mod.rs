//! Everything needed to move frames through the physical radio module.

pub mod device;
pub mod frame;
pub mod radio;
pub mod sim;

#[cfg(test)]
pub(crate) mod mock;

pub use device::*;
