//! Wire format of a transfer.
//!
//! A transfer of `L` bytes of content is made of one header frame followed by
//! `ceil(L / 31)` data frames:
//!
//! ```text
//! header: 0xFF | length (u16, big-endian) | SHAKE-256(content)[..29]   (32 bytes)
//! data:   index (0..=253) | chunk (<= 31 bytes)
//! ```
//!
//! Frames carry no sequence number besides the index: the transmitter repeats
//! the same cycle forever, and the receiver keys every chunk by its index.
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::Shake256;

use super::device::MAX_RADIO_PAYLOAD;

/// Tag byte of the header frame.
pub const HEADER_TAG: u8 = 0xFF;
/// Reserved tag, never produced by the framer.
pub const RESERVED_TAG: u8 = 0xFE;
/// Content bytes carried by a data frame.
pub const CHUNK_SIZE: usize = MAX_RADIO_PAYLOAD - 1;
/// Length of the truncated SHAKE-256 digest.
pub const DIGEST_LENGTH: usize = 29;
/// Header frame size on air.
pub const HEADER_LENGTH: usize = 1 + 2 + DIGEST_LENGTH;
/// Number of data frames addressable with a one-byte index (0..=253).
pub const MAX_DATA_FRAMES: usize = RESERVED_TAG as usize;
/// Largest content that can be framed.
pub const MAX_CONTENT_LENGTH: usize = MAX_DATA_FRAMES * CHUNK_SIZE;

/// Trait to calculate size on frame for every component on frame.
pub trait FrameSize {
    /// Calculate component size on frame (meaning encoded) in bytes.
    fn size(&self) -> usize;
}

pub type Digest = [u8; DIGEST_LENGTH];

/// SHAKE-256 of `content`, read to [DIGEST_LENGTH] bytes.
pub fn digest(content: &[u8]) -> Digest {
    let mut hasher = Shake256::default();
    hasher.update(content);
    let mut reader = hasher.finalize_xof();
    let mut out = [0u8; DIGEST_LENGTH];
    reader.read(&mut out);
    out
}

/// Number of data frames announced by a header of `length` bytes.
pub fn expected_frames(length: u16) -> usize {
    (length as usize + CHUNK_SIZE - 1) / CHUNK_SIZE
}

/// Control frame announcing the transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Content length in bytes.
    pub length: u16,
    /// Digest of the whole content.
    pub digest: Digest,
}

impl Header {
    pub fn for_content(content: &[u8]) -> Result<Self, FrameError> {
        if content.len() > MAX_CONTENT_LENGTH {
            return Err(FrameError::ContentTooLarge {
                size: content.len(),
            });
        }
        Ok(Header {
            length: content.len() as u16,
            digest: digest(content),
        })
    }

    pub fn expected_frames(&self) -> usize {
        expected_frames(self.length)
    }
}

/// One radio frame of a transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Header(Header),
    Data { index: u8, chunk: Vec<u8> },
}

impl Frame {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size());
        match self {
            Frame::Header(header) => {
                bytes.push(HEADER_TAG);
                bytes.extend_from_slice(&header.length.to_be_bytes());
                bytes.extend_from_slice(&header.digest);
            }
            Frame::Data { index, chunk } => {
                bytes.push(*index);
                bytes.extend_from_slice(chunk);
            }
        }
        bytes
    }

    pub fn try_from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        match bytes.split_first() {
            None => Err(FrameError::Empty),
            Some((&HEADER_TAG, rest)) => {
                if rest.len() < HEADER_LENGTH - 1 {
                    return Err(FrameError::InvalidHeader {
                        context: Some(format!(
                            "Header frame is too small ({} bytes).",
                            bytes.len()
                        )),
                    });
                }
                let length = u16::from_be_bytes([rest[0], rest[1]]);
                let mut digest = [0u8; DIGEST_LENGTH];
                digest.copy_from_slice(&rest[2..2 + DIGEST_LENGTH]);
                Ok(Frame::Header(Header { length, digest }))
            }
            Some((&index, chunk)) => {
                if chunk.len() > CHUNK_SIZE {
                    return Err(FrameError::OversizedChunk {
                        index,
                        size: chunk.len(),
                    });
                }
                Ok(Frame::Data {
                    index,
                    chunk: chunk.to_vec(),
                })
            }
        }
    }
}

impl FrameSize for Header {
    fn size(&self) -> usize {
        HEADER_LENGTH
    }
}

impl FrameSize for Frame {
    fn size(&self) -> usize {
        match self {
            Frame::Header(header) => header.size(),
            Frame::Data { chunk, .. } => 1 + chunk.len(),
        }
    }
}

/// Frames the content: the header first, then the data frames by ascending index.
pub fn encode(content: &[u8]) -> Result<Vec<Frame>, FrameError> {
    let header = Header::for_content(content)?;
    let mut frames = Vec::with_capacity(1 + header.expected_frames());
    frames.push(Frame::Header(header));
    frames.extend(
        content
            .chunks(CHUNK_SIZE)
            .enumerate()
            .map(|(index, chunk)| Frame::Data {
                index: index as u8,
                chunk: chunk.to_vec(),
            }),
    );
    Ok(frames)
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Empty frame.")]
    Empty,

    #[error("Invalid header. Context: {}", .context.as_deref().unwrap_or("<none>"))]
    InvalidHeader { context: Option<String> },

    #[error("Data frame {} carries {}B (max: {}B).", .index, .size, CHUNK_SIZE)]
    OversizedChunk { index: u8, size: usize },

    #[error("Content is too big to be framed (is: {}B, max: {}B)!", .size, MAX_CONTENT_LENGTH)]
    ContentTooLarge { size: usize },
}
