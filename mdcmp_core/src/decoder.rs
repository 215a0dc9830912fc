//! Role-driven decoding of raw stream payloads: raw-deflate decompression,
//! stream-cipher decryption, single-byte Cyrillic codepage decoding, and the
//! leaf checksum. Pure: identical (role, bytes) inputs always produce
//! identical output, and the input buffer is never modified.

use crate::checksum;
use crate::cipher;
use crate::container::StorageRole;
use crate::module_parser::{self, Module};
use encoding_rs::WINDOWS_1251;
use flate2::read::DeflateDecoder;
use std::io::Read;

/// First decompressed byte marking an encrypted global-module stream.
const GLOBAL_MODULE_ENCRYPTED_MARKER: u8 = 0x9E;

/// Undocumented header length preceding an encrypted global module.
const GLOBAL_MODULE_HEADER_LEN: usize = 510;

/// First raw byte marking a *plain* main-metadata stream; anything else
/// means the stream is encrypted.
const METADATA_STREAM_PLAIN_MARKER: u8 = 0xFF;

/// Result of decoding one leaf payload.
#[derive(Debug, Default)]
pub struct Decoded {
    pub text: Option<String>,
    pub module: Option<Module>,
    pub checksum: u32,
    pub compressed: bool,
    pub encrypted: bool,
    /// Set when decompression or decryption failed; text/module stay unset
    /// and the checksum falls back to the raw bytes.
    pub error: Option<String>,
}

/// Decodes the payload bytes of the fixed Cyrillic codepage into Unicode.
/// Unmappable bytes become replacement characters rather than errors.
pub fn windows_1251(bytes: &[u8]) -> String {
    WINDOWS_1251.decode(bytes).0.into_owned()
}

fn inflate(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Decodes a raw leaf payload according to its declared storage role.
pub fn decode(role: StorageRole, raw: &[u8]) -> Decoded {
    let mut decoded = Decoded::default();

    match role {
        StorageRole::TextDocument | StorageRole::MetaDataDescription => {
            decoded.compressed = true;
            match inflate(raw) {
                Ok(mut data) => {
                    let mut failed = false;
                    if role == StorageRole::MetaDataDescription
                        && data.first() == Some(&GLOBAL_MODULE_ENCRYPTED_MARKER)
                    {
                        decoded.encrypted = true;
                        if data.len() > GLOBAL_MODULE_HEADER_LEN {
                            data.drain(..GLOBAL_MODULE_HEADER_LEN);
                            cipher::apply_plain(&mut data, &cipher::GLOBAL_MODULE_KEY);
                        } else {
                            decoded.error = Some(format!(
                                "encrypted global module shorter than its {}-byte header",
                                GLOBAL_MODULE_HEADER_LEN
                            ));
                            failed = true;
                        }
                    }
                    if !failed {
                        let text = windows_1251(&data);
                        decoded.module = Some(module_parser::parse_module(&text));
                        decoded.text = Some(text);
                    }
                }
                Err(e) => decoded.error = Some(format!("deflate: {}", e)),
            }
        }
        StorageRole::MetaDataStream => {
            if let Some(&first) = raw.first() {
                if first != METADATA_STREAM_PLAIN_MARKER {
                    decoded.encrypted = true;
                    let mut data = raw.to_vec();
                    cipher::apply_feedback(&mut data, &cipher::METADATA_STREAM_KEY);
                    decoded.text = Some(windows_1251(&data));
                } else {
                    decoded.text = Some(windows_1251(raw));
                }
            }
        }
        StorageRole::TagStream => {
            decoded.encrypted = true;
            let mut data = raw.to_vec();
            cipher::apply_feedback(&mut data, &cipher::METADATA_STREAM_KEY);
            decoded.text = Some(windows_1251(&data));
        }
        StorageRole::DialogEditor => {
            // embedded layout notation, decoded but left unparsed
            decoded.text = Some(windows_1251(raw));
        }
        _ => {}
    }

    decoded.checksum = checksum::leaf_checksum(decoded.text.as_deref(), raw);
    decoded
}
