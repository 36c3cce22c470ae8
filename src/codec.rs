//! Short URL-safe names for profile ids
//!
//! A name is the varint encoding of the id, rendered in an unpadded base-32
//! alphabet. Small ids produce short names, and the alphabet drops the four
//! visually ambiguous letters (`i`, `l`, `o`, `u`) so names survive both
//! case-folding and human transcription. Safe to embed directly in a URL
//! path segment.
//!
//! The two functions are pure and stateless; `decode(encode(id)) == id` for
//! every `u64`.

use crate::error::Error;

/// Base-32 alphabet: digits then lowercase letters minus `i`, `l`, `o`, `u`.
const ALPHABET: &[u8; 32] = b"0123456789abcdefghjkmnpqrstvwxyz";

/// Maximum bytes a 64-bit varint occupies.
const MAX_VARINT_LEN: usize = 10;

const INVALID: u8 = 0xff;

const fn build_reverse() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

const REVERSE: [u8; 256] = build_reverse();

/// Render `id` as a short name.
pub fn encode(id: u64) -> String {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = put_uvarint(&mut buf, id);
    base32_encode(&buf[..len])
}

/// Parse a name back into the id it was produced from.
pub fn decode(name: &str) -> Result<u64, Error> {
    let bytes = base32_decode(name)?;
    let (id, consumed) = uvarint(&bytes);
    if consumed == 0 {
        return Err(Error::Encoding(name.to_string()));
    }
    Ok(id)
}

/// Write `x` as a varint, returning the number of bytes used.
fn put_uvarint(buf: &mut [u8], mut x: u64) -> usize {
    let mut i = 0;
    while x >= 0x80 {
        buf[i] = x as u8 | 0x80;
        x >>= 7;
        i += 1;
    }
    buf[i] = x as u8;
    i + 1
}

/// Read a varint from `buf`, returning `(value, bytes_consumed)`.
///
/// A zero consumed count means no complete integer was present: empty or
/// truncated input, or a value that overflows 64 bits. Bytes after the
/// terminating one are ignored.
fn uvarint(buf: &[u8]) -> (u64, usize) {
    let mut x = 0u64;
    let mut shift = 0u32;
    for (i, &b) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return (0, 0);
        }
        if b < 0x80 {
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                return (0, 0);
            }
            return (x | (b as u64) << shift, i + 1);
        }
        x |= ((b & 0x7f) as u64) << shift;
        shift += 7;
    }
    (0, 0)
}

/// Standard base-32 over [`ALPHABET`], with the padding already stripped.
fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut acc = 0u16;
    let mut bits = 0u32;
    for &byte in data {
        acc = (acc << 8) | byte as u16;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[(acc >> bits) as usize & 0x1f] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[(acc << (5 - bits)) as usize & 0x1f] as char);
    }
    out
}

/// Decode an unpadded base-32 string, re-deriving the pad length from
/// `len % 8`. Lengths congruent to 1, 3, or 6 cannot arise from stripping
/// padding off a whole encoded group and are rejected.
fn base32_decode(name: &str) -> Result<Vec<u8>, Error> {
    if matches!(name.len() % 8, 1 | 3 | 6) {
        return Err(Error::Encoding(name.to_string()));
    }
    let mut out = Vec::with_capacity(name.len() * 5 / 8);
    let mut acc = 0u16;
    let mut bits = 0u32;
    for symbol in name.bytes() {
        let value = REVERSE[symbol as usize];
        if value == INVALID {
            return Err(Error::Encoding(name.to_string()));
        }
        acc = (acc << 5) | value as u16;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    Ok(out)
}
