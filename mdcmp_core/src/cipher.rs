//! Keyed byte-stream cipher protecting the metadata streams, recovered from
//! observed container payloads. RC4-style key schedule and byte generation,
//! with one deviation: both swaps use the XOR form, so a step where the two
//! indices coincide zeroes the table entry. Real payloads do not decode
//! without this, so it is preserved bit-exactly.

/// 16-byte key for the main metadata stream and the tag stream.
pub const METADATA_STREAM_KEY: [u8; 16] = [
    0x60, 0x46, 0xD2, 0x72, 0x64, 0x25, 0x03, 0x00, 0x09, 0x89, 0x00, 0xC0, 0xDD, 0x3B, 0xE6,
    0x36,
];

/// Key for the encrypted global-module stream (ASCII hex digits, as found in
/// the format).
pub const GLOBAL_MODULE_KEY: [u8; 34] = [
    0x34, 0x43, 0x33, 0x43, 0x30, 0x42, 0x46, 0x31, 0x31, 0x35, 0x46, 0x38, 0x42, 0x39, 0x35,
    0x36, 0x36, 0x39, 0x46, 0x39, 0x46, 0x43, 0x34, 0x42, 0x36, 0x44, 0x33, 0x41, 0x39, 0x44,
    0x36, 0x31, 0x34, 0x31,
];

/// First-byte values that mark a feedback-variant payload as ciphertext.
/// Observed constants with no documented rationale; do not "correct" them.
pub const DECRYPT_MAGIC: [u8; 2] = [0x25, 0x78];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

fn key_schedule(key: &[u8]) -> [u8; 256] {
    let mut s = [0u8; 256];
    for (i, entry) in s.iter_mut().enumerate() {
        *entry = i as u8;
    }
    let mut j = 0usize;
    for i in 0..256 {
        j = (j + s[i] as usize + key[i % key.len()] as usize) % 256;
        // xor-form swap: zeroes the entry when i == j
        s[i] ^= s[j];
        s[j] ^= s[i];
        s[i] ^= s[j];
    }
    s
}

fn transform(data: &mut [u8], key: &[u8], feedback: Option<Direction>) {
    let mut s = key_schedule(key);
    let mut tap = s[0];
    let (mut i, mut j) = (0usize, 0usize);

    for x in 0..data.len() {
        i = (i + 1) % 256;
        j = (j + s[i] as usize) % 256;
        s[i] ^= s[j];
        s[j] ^= s[i];
        s[i] ^= s[j];

        let ks = s[(s[i] as usize + s[j] as usize) % 256];
        data[x] ^= ks;

        if let Some(direction) = feedback {
            data[x] ^= tap;
            match direction {
                // the tap always follows the ciphertext byte: the output when
                // encrypting, the input when decrypting
                Direction::Encrypt => tap = data[x],
                Direction::Decrypt => tap ^= data[x] ^ ks,
            }
        }
    }
}

/// Plain variant: keystream XOR only. Applying it twice with the same key
/// restores the input.
pub fn apply_plain(data: &mut [u8], key: &[u8]) {
    transform(data, key, None);
}

/// Feedback variant with explicit direction.
pub fn apply_feedback_directed(data: &mut [u8], key: &[u8], direction: Direction) {
    transform(data, key, Some(direction));
}

/// Feedback variant with the direction auto-detected from the payload's
/// first byte: a magic value selects decryption, anything else encryption.
pub fn apply_feedback(data: &mut [u8], key: &[u8]) {
    if data.is_empty() {
        return;
    }
    let direction = if DECRYPT_MAGIC.contains(&data[0]) {
        Direction::Decrypt
    } else {
        Direction::Encrypt
    };
    transform(data, key, Some(direction));
}
