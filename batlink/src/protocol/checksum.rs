//! XOR payload checksum.
//!
//! Every frame header carries a one-byte checksum computed as the XOR of
//! all payload bytes. An empty payload checksums to 0.

/// Compute the XOR checksum of a payload.
#[must_use]
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}
