use std::fmt::Debug;

use crate::channels::ChannelError;
use crate::device::frame::FrameError;

#[derive(thiserror::Error, Debug)]
pub enum RelayError<R>
where
    R: Debug,
{
    #[error("Bad frame: {0}")]
    FrameError(#[from] FrameError),

    #[error("Channel configuration error: {0}")]
    ChannelError(#[from] ChannelError),

    #[error("Underlying I/O Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Interrupted by the operator.")]
    Interrupted,

    #[error("Internal radio error: {:?}", .0)]
    InternalRadioError(R),
}

impl<R: Debug> RelayError<R> {
    pub fn is_interrupt(&self) -> bool {
        matches!(self, RelayError::Interrupted)
    }
}
