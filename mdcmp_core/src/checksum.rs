//! Checksums used to pair and compare stream payloads: a rolling Adler-32
//! over raw bytes and a 32-bit content hash over decoded text.

use adler2::Adler32;
use twox_hash::XxHash32;

/// Adler-32 start value.
pub const ADLER_START: u32 = 1;

/// Adler-32 of a byte buffer. An empty buffer yields 0, which callers treat
/// as "no checksum".
pub fn adler32(bytes: &[u8]) -> u32 {
    if bytes.is_empty() {
        return 0;
    }
    adler32_continue(ADLER_START, bytes)
}

/// Continues a rolling Adler-32 from a previous checksum value.
pub fn adler32_continue(seed: u32, bytes: &[u8]) -> u32 {
    let mut adler = Adler32::from_checksum(seed);
    adler.write_slice(bytes);
    adler.checksum()
}

/// Canonical 32-bit content hash of decoded text. Used wherever text is
/// hashed for comparison (module bodies, global blocks, the root descriptor
/// stream), so that two loads of identical bytes always agree.
pub fn text_checksum(text: &str) -> u32 {
    XxHash32::oneshot(0, text.as_bytes())
}

/// Checksum of a decoded leaf: the content hash of its text when the text is
/// non-empty and hashes to a non-zero value, Adler-32 of the raw bytes
/// otherwise.
pub fn leaf_checksum(text: Option<&str>, raw: &[u8]) -> u32 {
    if let Some(text) = text {
        if !text.is_empty() {
            let sum = text_checksum(text);
            if sum != 0 {
                return sum;
            }
        }
    }
    adler32(raw)
}
