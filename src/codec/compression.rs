//! Body compression.
//!
//! A compressed SPM body is stored as `[uncompressed size: u64 LE][zlib]`.
//! The header flag, not the payload, tells whether a body is compressed.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Refuse to inflate bodies claiming more than this many bytes.
const MAX_BODY_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Compress `data` at `level` (1..=9).
///
/// Returns `None` when compression is off or would not make the body
/// smaller, in which case the body is stored raw.
pub fn compress(data: &[u8], level: u32) -> Result<Option<Vec<u8>>> {
    if level == 0 || data.is_empty() {
        return Ok(None);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    if compressed.len() + 8 >= data.len() {
        return Ok(None);
    }

    let mut result = Vec::with_capacity(8 + compressed.len());
    result.extend_from_slice(&(data.len() as u64).to_le_bytes());
    result.extend_from_slice(&compressed);
    Ok(Some(result))
}

/// Inflate a body written by [`compress`].
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let Some((size, stream)) = data.split_first_chunk::<8>() else {
        return Err(Error::malformed("compressed body shorter than its size prefix"));
    };
    let size = u64::from_le_bytes(*size);
    if size > MAX_BODY_SIZE {
        return Err(Error::malformed(format!("compressed body claims {size} bytes")));
    }

    let mut out = Vec::with_capacity(size.min(1 << 26) as usize);
    ZlibDecoder::new(stream)
        .take(size + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::malformed(format!("zlib stream: {e}")))?;
    if out.len() as u64 != size {
        return Err(Error::malformed(format!(
            "compressed body inflated to {} bytes, expected {size}",
            out.len()
        )));
    }
    Ok(out)
}
