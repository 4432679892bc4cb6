//! Fixed-length serial frame: `[head: 4][type: 1][payload: n][crc8: 1]`.
//!
//! The head is the configured `u32` magic in little-endian byte order and the
//! CRC covers every byte before it.

use core::fmt;

use crate::utils::math::crc::crc8;

pub const HEAD_LEN: usize = 4;
pub const TYPE_OFFSET: usize = 4;
pub const PAYLOAD_OFFSET: usize = 5;
/// Head, type and CRC bytes.
pub const FRAME_OVERHEAD: usize = 6;
/// Capacity of the link buffers.
pub const MAX_FRAME_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    LengthMismatch { expected: usize, actual: usize },
    HeadMismatch,
    CrcMismatch { expected: u8, actual: u8 },
}

impl fmt::Display for FrameError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::LengthMismatch { expected, actual } => {
                write!(f, "frame length {actual}, expected {expected}")
            }
            Self::HeadMismatch => write!(f, "frame head mismatch"),
            Self::CrcMismatch { expected, actual } => {
                write!(f, "frame crc {actual:#04x}, expected {expected:#04x}")
            }
        }
    }
}

/// Payload bytes carried by a frame of `frame_len` bytes.
pub const fn payload_len(frame_len: usize) -> usize {
    frame_len.saturating_sub(FRAME_OVERHEAD)
}

pub fn write_head(
    buf: &mut [u8],
    head: u32,
) {
    if let Some(h) = buf.get_mut(..HEAD_LEN) {
        h.copy_from_slice(&head.to_le_bytes());
    }
}

/// Write head and type into `buf`, then append the CRC as its last byte.
///
/// The payload region `buf[PAYLOAD_OFFSET..len - 1]` must already be filled.
pub fn seal(
    buf: &mut [u8],
    head: u32,
    packet_type: u8,
) -> Result<(), FrameError> {
    let len = buf.len();
    if len < FRAME_OVERHEAD {
        return Err(FrameError::LengthMismatch {
            expected: FRAME_OVERHEAD,
            actual: len,
        });
    }

    write_head(buf, head);
    buf[TYPE_OFFSET] = packet_type;
    buf[len - 1] = crc8(&buf[..len - 1]);
    Ok(())
}

/// Check head and CRC of a complete frame.
///
/// Returns the packet type and a view of the payload bytes.
pub fn validate(
    buf: &[u8],
    head: u32,
) -> Result<(u8, &[u8]), FrameError> {
    let len = buf.len();
    if len < FRAME_OVERHEAD {
        return Err(FrameError::LengthMismatch {
            expected: FRAME_OVERHEAD,
            actual: len,
        });
    }

    if buf[..HEAD_LEN] != head.to_le_bytes() {
        return Err(FrameError::HeadMismatch);
    }

    let expected = crc8(&buf[..len - 1]);
    let actual = buf[len - 1];
    if expected != actual {
        return Err(FrameError::CrcMismatch { expected, actual });
    }

    Ok((buf[TYPE_OFFSET], &buf[PAYLOAD_OFFSET..len - 1]))
}
