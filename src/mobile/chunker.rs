use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use md5::{Digest, Md5};

use crate::error::{SyntheticsError, SyntheticsResult};

/// Size of every part but the last. Fixed so re-chunking a file is reproducible.
pub const PART_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub blob: Vec<u8>,
    /// Base64 of the MD5 digest of `blob`.
    pub md5: String,
    pub part_number: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeAndParts {
    pub app_size: u64,
    pub parts: Vec<FilePart>,
}

pub fn md5_base64(bytes: &[u8]) -> String {
    STANDARD.encode(Md5::digest(bytes))
}

pub fn chunk_bytes(bytes: &[u8], part_size: usize) -> Vec<FilePart> {
    bytes
        .chunks(part_size.max(1))
        .enumerate()
        .map(|(index, chunk)| FilePart {
            blob: chunk.to_vec(),
            md5: md5_base64(chunk),
            part_number: index as u32 + 1,
        })
        .collect()
}

pub async fn get_size_and_parts(path: &Path) -> SyntheticsResult<SizeAndParts> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| SyntheticsError::FileNotFound {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(SizeAndParts {
        app_size: bytes.len() as u64,
        parts: chunk_bytes(&bytes, PART_SIZE),
    })
}
