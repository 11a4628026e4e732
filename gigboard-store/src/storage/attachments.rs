//! Attachment payload encoding.
//!
//! Attachments live out-of-band from the document field mapping, in the
//! `attachments` column family. Each payload is LZ4-compressed and carries a
//! checksum so a damaged blob is reported instead of handed to the UI.
//!
//! ```text
//! ┌──────────────┬───────────────┬──────────┬────────────────────┐
//! │ content_type │ original_size │ checksum │ compressed (LZ4)   │
//! └──────────────┴───────────────┴──────────┴────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use super::rocks::StoreError;

/// An attachment as persisted in the `attachments` column family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressedAttachment {
    /// MIME type supplied by the writer, if any
    pub content_type: Option<String>,
    /// Uncompressed size in bytes
    pub original_size: u64,
    /// FNV-1a checksum of the uncompressed payload
    pub checksum: u32,
    /// LZ4-compressed payload (size-prepended)
    pub compressed: Vec<u8>,
}

impl CompressedAttachment {
    /// Compress a raw payload.
    pub fn compress(content_type: Option<String>, data: &[u8]) -> Self {
        Self {
            content_type,
            original_size: data.len() as u64,
            checksum: checksum(data),
            compressed: lz4_flex::compress_prepend_size(data),
        }
    }

    /// Decompress and verify the payload.
    pub fn decompress(&self) -> Result<Vec<u8>, StoreError> {
        let data = lz4_flex::decompress_size_prepended(&self.compressed)
            .map_err(|e| StoreError::CompressionError(e.to_string()))?;
        if data.len() as u64 != self.original_size || checksum(&data) != self.checksum {
            return Err(StoreError::CompressionError(format!(
                "attachment checksum mismatch ({} bytes)",
                data.len()
            )));
        }
        Ok(data)
    }

    pub fn compressed_size(&self) -> usize {
        self.compressed.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::SerializationError(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (attachment, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| StoreError::DeserializationError(e.to_string()))?;
        Ok(attachment)
    }
}

/// FNV-1a over 4-byte little-endian words.
fn checksum(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    hash ^= data.len() as u32;
    hash = hash.wrapping_mul(0x0100_0193);
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        hash ^= u32::from_le_bytes(word);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}
