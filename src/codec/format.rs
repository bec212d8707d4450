//! SPM container constants and layout helpers.

use crate::model::VertexAttributes;

/// Magic bytes at the start of every SPM file.
pub const SPM_MAGIC: &[u8; 4] = b"SPM\x1a";

/// Size of the fixed file header: magic, version, flags.
pub const HEADER_SIZE: usize = 8;

/// Offset of the version in the header.
pub const VERSION_OFFSET: usize = 4;

/// Offset of the flags in the header.
pub const FLAGS_OFFSET: usize = 6;

/// Container version written by this library and the only one it reads.
pub const CURRENT_VERSION: u16 = 2;

/// Header flag: the body after the header is zlib compressed.
pub const FLAG_COMPRESSED: u16 = 1 << 0;

/// All header flags this reader understands.
pub const KNOWN_FLAGS: u16 = FLAG_COMPRESSED;

/// Parent index stored for root joints.
pub const NO_PARENT: i32 = -1;

/// Largest vertex count still addressable with 16-bit indices.
pub const MAX_SHORT_INDEX_VERTICES: usize = 1 << 16;

/// Byte size of an AABB record.
pub const BOUNDS_SIZE: usize = 6 * 4;

/// Byte size of a stored transform (T 3f, R 4f, S 3f).
pub const TRANSFORM_SIZE: usize = 10 * 4;

/// Byte size of one stored keyframe.
pub const KEYFRAME_SIZE: usize = 4 + TRANSFORM_SIZE;

/// Byte size of one skin influence (joint u16, weight f32).
pub const INFLUENCE_SIZE: usize = 2 + 4;

/// Index width in bytes for a sub-mesh with `num_vertices` vertices.
#[inline]
pub const fn index_width(num_vertices: usize) -> u8 {
    if num_vertices <= MAX_SHORT_INDEX_VERTICES {
        2
    } else {
        4
    }
}

/// Fixed part of a stored vertex, excluding the variable skin block.
#[inline]
pub const fn fixed_vertex_size(attrs: VertexAttributes) -> usize {
    let mut size = 12;
    if attrs.contains(VertexAttributes::NORMAL) {
        size += 12;
    }
    if attrs.contains(VertexAttributes::UV) {
        size += 8;
    }
    if attrs.contains(VertexAttributes::COLOR) {
        size += 4;
    }
    if attrs.contains(VertexAttributes::TANGENT) {
        size += 13;
    }
    if attrs.contains(VertexAttributes::SKIN) {
        // influence count byte
        size += 1;
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic() {
        assert_eq!(SPM_MAGIC, b"SPM\x1a");
        assert_eq!(SPM_MAGIC.len() + 2 + 2, HEADER_SIZE);
    }

    #[test]
    fn test_index_width() {
        assert_eq!(index_width(0), 2);
        assert_eq!(index_width(65536), 2);
        assert_eq!(index_width(65537), 4);
    }

    #[test]
    fn test_vertex_size() {
        assert_eq!(fixed_vertex_size(VertexAttributes::empty()), 12);
        let all = VertexAttributes::all();
        assert_eq!(fixed_vertex_size(all), 12 + 12 + 8 + 4 + 13 + 1);
    }
}
