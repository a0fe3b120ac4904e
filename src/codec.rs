//! Request-code parity, checksum, and header/frame assembly.

use crate::constants::{CHECKSUM_OFFSET, PARITY_MASK, SYNC};
use crate::error::{Error, Result};

/// Computes the two parity bits over a 14-bit request id and returns the
/// full 16-bit request code with the parity bits in positions 14-15.
///
/// `P1` is the XOR of all 14 id bits; `P2` is the XOR of the odd-indexed
/// bits (1, 3, 5, ..., 13).
pub fn request_code(id14: u16) -> Result<u16> {
    if id14 > PARITY_MASK {
        return Err(Error::InvalidRequest(id14 as u32));
    }
    let p1 = (0..14).fold(0u16, |acc, bit| acc ^ ((id14 >> bit) & 1));
    let p2 = (1..14).step_by(2).fold(0u16, |acc, bit| acc ^ ((id14 >> bit) & 1));
    Ok(((p1 << 1 | p2) << 14) | id14)
}

/// Checksum over a payload: `(0xA3 + sum(bytes) + len(bytes)) mod 256`.
///
/// Order-insensitive by construction — this is a known weakness of the
/// wire format, not a bug.
pub fn data_checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    (CHECKSUM_OFFSET as u32)
        .wrapping_add(sum)
        .wrapping_add(data.len() as u32) as u8
}

/// Builds the three-byte header: `[SYNC, hi(request_code), lo(request_code)]`.
pub fn create_header(id14: u16) -> Result<[u8; 3]> {
    let code = request_code(id14)?;
    Ok([SYNC, (code >> 8) as u8, (code & 0xff) as u8])
}

/// Builds a complete frame: header, length byte, payload, and checksum.
///
/// `checksum` overrides the computed checksum when given, letting callers
/// construct intentionally-corrupt frames for transport/sniffer tests.
pub fn create_frame(id14: u16, data: &[u8], checksum: Option<u8>) -> Result<Vec<u8>> {
    let header = create_header(id14)?;
    let mut frame = Vec::with_capacity(header.len() + 2 + data.len());
    frame.extend_from_slice(&header);
    frame.push(data.len() as u8);
    frame.extend_from_slice(data);
    frame.push(checksum.unwrap_or_else(|| data_checksum(data)));
    Ok(frame)
}
