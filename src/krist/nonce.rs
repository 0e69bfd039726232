//! The nonce encoding shared by the host and the device kernel.
//!
//! A 64 bit counter is spread over ten ASCII bytes, five bits per byte,
//! low bits first, offset into the printable range starting at `'0'`.

use rand::Rng;

/// Encoded nonce length in bytes.
pub const LENGTH: usize = 10;

/// Bits carried by each nonce byte.
const BITS_PER_BYTE: u32 = 5;

/// Characters a worker prefix may be drawn from.
pub const PREFIX_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Encode a counter as ten ASCII bytes in `[0x30, 0x4f]`.
pub fn encode(n: u64) -> [u8; LENGTH] {
    let mut out = [0u8; LENGTH];
    for (i, b) in out.iter_mut().enumerate() {
        *b = (((n >> (BITS_PER_BYTE * i as u32)) & 0x1f) as u8) + 0x30;
    }
    out
}

/// Inverse of [`encode`], recovering the low 50 bits of the counter.
pub fn decode(bytes: &[u8; LENGTH]) -> u64 {
    bytes.iter().enumerate().fold(0, |acc, (i, &b)| {
        acc | (((b.wrapping_sub(0x30) & 0x1f) as u64) << (BITS_PER_BYTE * i as u32))
    })
}

/// Pick a random two character worker prefix.
///
/// Workers mining for the same address start from the same counter, so the
/// prefix is what keeps them off each other's nonce ranges.
pub fn random_prefix() -> [u8; 2] {
    let mut rng = rand::thread_rng();
    let mut prefix = [0u8; 2];
    for b in prefix.iter_mut() {
        *b = PREFIX_CHARS[rng.gen_range(0..PREFIX_CHARS.len())];
    }
    prefix
}
