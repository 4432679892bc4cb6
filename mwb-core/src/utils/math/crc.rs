//! CRC-8 checksum used to seal serial link frames.
//!
//! Reflected polynomial 0x8C (0x31 in normal form), initial value 0xFF and no
//! final XOR, matching the host-side implementation.

const POLY_REFLECTED: u8 = 0x8C;
const INIT: u8 = 0xFF;

/// Compute the CRC-8 over `bytes`.
pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(INIT, |crc, &b| update(crc, b))
}

#[inline]
fn update(
    mut crc: u8,
    byte: u8,
) -> u8 {
    crc ^= byte;
    for _ in 0..8 {
        crc = if crc & 0x01 != 0 {
            (crc >> 1) ^ POLY_REFLECTED
        } else {
            crc >> 1
        };
    }
    crc
}
