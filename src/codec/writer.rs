//! SPM container writer.
//!
//! Serializes a validated [`Mesh`] into one contiguous buffer. Nothing is
//! produced unless the whole mesh encodes; sub-mesh records are encoded in
//! parallel and concatenated in order.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use rayon::prelude::*;

use super::compression::compress;
use super::format::*;
use crate::model::{Animation, Material, Mesh, Skeleton, SubMesh, Vertex, VertexAttributes};
use crate::util::{BBox3f, Error, Result, Transform};

/// Options for [`encode`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// zlib level for the body, 0 stores it raw.
    pub compression_level: u32,
}

/// Little-endian output buffer with section bookkeeping.
pub struct OBuffer {
    buf: Vec<u8>,
}

impl OBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    /// Current write position.
    #[inline]
    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    // Writes into a Vec cannot fail, so the io::Result is dropped.

    pub fn write_u8(&mut self, value: u8) {
        let _ = self.buf.write_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        let _ = self.buf.write_i8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        let _ = self.buf.write_u16::<LittleEndian>(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        let _ = self.buf.write_u32::<LittleEndian>(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        let _ = self.buf.write_i32::<LittleEndian>(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        let _ = self.buf.write_f32::<LittleEndian>(value);
    }

    pub fn write_f32s(&mut self, values: &[f32]) {
        for &v in values {
            self.write_f32(v);
        }
    }

    /// Length-prefixed (u16) UTF-8 string.
    pub fn write_str16(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len())
            .map_err(|_| Error::invalid_input(format!("string of {} bytes does not fit a u16 length", s.len())))?;
        self.write_u16(len);
        self.write_bytes(s.as_bytes());
        Ok(())
    }

    pub fn write_bounds(&mut self, bounds: &BBox3f) {
        self.write_f32s(&bounds.to_array());
    }

    pub fn write_transform(&mut self, t: &Transform) {
        self.write_f32s(&t.translation.to_array());
        self.write_f32s(&t.rotation.to_array());
        self.write_f32s(&t.scale.to_array());
    }

    /// Reserve a u32 length field; returns its position.
    pub fn begin_section(&mut self) -> usize {
        let at = self.pos();
        self.write_u32(0);
        at
    }

    /// Patch the length reserved at `at` with the bytes written since.
    pub fn end_section(&mut self, at: usize) -> Result<()> {
        let len = self.pos() - at - 4;
        let len = u32::try_from(len)
            .map_err(|_| Error::invalid_input(format!("section of {len} bytes exceeds the 4 GiB limit")))?;
        self.buf[at..at + 4].copy_from_slice(&len.to_le_bytes());
        Ok(())
    }
}

impl Default for OBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `mesh` into a complete SPM file image.
#[tracing::instrument(skip_all, fields(sub_meshes = mesh.sub_meshes.len(), level = options.compression_level))]
pub fn encode(mesh: &Mesh, options: &EncodeOptions) -> Result<Vec<u8>> {
    mesh.validate()?;

    let body = encode_body(mesh)?;
    let raw_len = body.len();
    let (flags, body) = match compress(&body, options.compression_level)? {
        Some(packed) => (FLAG_COMPRESSED, packed),
        None => (0, body),
    };

    let mut out = OBuffer::with_capacity(HEADER_SIZE + body.len());
    out.write_bytes(SPM_MAGIC);
    out.write_u16(CURRENT_VERSION);
    out.write_u16(flags);
    out.write_bytes(&body);

    tracing::debug!(raw_len, file_len = out.pos(), compressed = flags != 0, "mesh encoded");
    Ok(out.into_inner())
}

/// Write `bytes` to `path` atomically.
///
/// The data goes to a hidden sibling file first, which is renamed over
/// `path` only once it is complete. On failure the sibling is removed and
/// `path` is left as it was.
pub fn write_file(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let tmp = temp_sibling(path)?;
    let result = (|| -> Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::invalid_input(format!("{} has no file name", path.display())))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    Ok(path.with_file_name(tmp_name))
}

fn encode_body(mesh: &Mesh) -> Result<Vec<u8>> {
    let mut out = OBuffer::new();
    out.write_bounds(&mesh.bounds());
    write_materials(&mut out, &mesh.materials)?;
    write_skeleton(&mut out, mesh.skeleton.as_ref())?;
    write_sub_meshes(&mut out, &mesh.sub_meshes)?;
    write_animation(&mut out, mesh.animation.as_ref())?;
    Ok(out.into_inner())
}

fn count_u32(n: usize, what: &str) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::invalid_input(format!("too many {what}: {n}")))
}

fn write_materials(out: &mut OBuffer, materials: &[Material]) -> Result<()> {
    let at = out.begin_section();
    out.write_u32(count_u32(materials.len(), "materials")?);
    for m in materials {
        out.write_str16(&m.texture)?;
        out.write_u32(m.flags);
    }
    out.end_section(at)
}

fn write_skeleton(out: &mut OBuffer, skeleton: Option<&Skeleton>) -> Result<()> {
    let at = out.begin_section();
    let joints = skeleton.map(Skeleton::joints).unwrap_or_default();
    out.write_u32(count_u32(joints.len(), "joints")?);
    for joint in joints {
        out.write_str16(&joint.name)?;
        // joint count is bounded by Skeleton::new, parents fit an i32
        out.write_i32(joint.parent.map_or(NO_PARENT, |p| p as i32));
        out.write_transform(&joint.bind);
    }
    out.end_section(at)
}

fn write_sub_meshes(out: &mut OBuffer, sub_meshes: &[SubMesh]) -> Result<()> {
    let records = sub_meshes
        .par_iter()
        .map(encode_sub_mesh)
        .collect::<Result<Vec<_>>>()?;

    let at = out.begin_section();
    out.write_u32(count_u32(sub_meshes.len(), "sub-meshes")?);
    for record in &records {
        out.write_bytes(record);
    }
    out.end_section(at)
}

/// One sub-mesh record, including its own length prefix.
pub(crate) fn encode_sub_mesh(sm: &SubMesh) -> Result<Vec<u8>> {
    let attrs = sm.attributes;
    let width = index_width(sm.vertices.len());
    let mut out = OBuffer::with_capacity(
        4 + 40 + sm.vertices.len() * fixed_vertex_size(attrs) + sm.indices.len() * width as usize,
    );

    let at = out.begin_section();
    out.write_u32(count_u32(sm.material, "materials")?);
    out.write_u8(attrs.bits());
    out.write_u8(width);
    out.write_bounds(&sm.bounds());

    out.write_u32(count_u32(sm.vertices.len(), "vertices")?);
    for v in &sm.vertices {
        write_vertex(&mut out, v, attrs);
    }

    out.write_u32(count_u32(sm.indices.len(), "indices")?);
    if width == 2 {
        // every index < vertex count <= 65536 after validation
        for &i in &sm.indices {
            out.write_u16(i as u16);
        }
    } else {
        for &i in &sm.indices {
            out.write_u32(i);
        }
    }
    out.end_section(at)?;
    Ok(out.into_inner())
}

fn write_vertex(out: &mut OBuffer, v: &Vertex, attrs: VertexAttributes) {
    out.write_f32s(&v.position.to_array());
    if attrs.contains(VertexAttributes::NORMAL) {
        out.write_f32s(&v.normal.to_array());
    }
    if attrs.contains(VertexAttributes::UV) {
        out.write_f32s(&v.uv.to_array());
    }
    if attrs.contains(VertexAttributes::COLOR) {
        out.write_bytes(&v.color);
    }
    if attrs.contains(VertexAttributes::TANGENT) {
        out.write_f32s(&v.tangent.to_array());
        out.write_i8(if v.bitangent_sign < 0.0 { -1 } else { 1 });
    }
    if attrs.contains(VertexAttributes::SKIN) {
        out.write_u8(v.joints.len() as u8);
        for jw in &v.joints {
            out.write_u16(jw.joint);
            out.write_f32(jw.weight);
        }
    }
}

fn write_animation(out: &mut OBuffer, animation: Option<&Animation>) -> Result<()> {
    let at = out.begin_section();
    let (tracks, (start, end)) = match animation {
        Some(a) => (a.tracks.as_slice(), a.frame_range),
        None => (&[][..], (0, 0)),
    };
    out.write_u32(count_u32(tracks.len(), "animation tracks")?);
    out.write_i32(start);
    out.write_i32(end);
    for track in tracks {
        out.write_u32(count_u32(track.len(), "keyframes")?);
        for key in track.keys() {
            out.write_f32(key.time);
            out.write_transform(&key.transform);
        }
    }
    out.end_section(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Vec3;

    fn triangle(material: usize) -> SubMesh {
        let mut sm = SubMesh::new(material, VertexAttributes::empty());
        sm.vertices = vec![Vertex::new(Vec3::ZERO), Vertex::new(Vec3::X), Vertex::new(Vec3::Y)];
        sm.indices = vec![0, 1, 2];
        sm
    }

    #[test]
    fn test_header() {
        let mut mesh = Mesh::new();
        mesh.materials.push(Material::new("road.png", 0));
        mesh.sub_meshes.push(triangle(0));
        let bytes = encode(&mesh, &EncodeOptions::default()).unwrap();
        assert_eq!(&bytes[..4], SPM_MAGIC);
        assert_eq!(u16::from_le_bytes([bytes[VERSION_OFFSET], bytes[VERSION_OFFSET + 1]]), CURRENT_VERSION);
        assert_eq!(u16::from_le_bytes([bytes[FLAGS_OFFSET], bytes[FLAGS_OFFSET + 1]]), 0);
    }

    #[test]
    fn test_sub_mesh_record_length() {
        let record = encode_sub_mesh(&triangle(0)).unwrap();
        let declared = u32::from_le_bytes(record[..4].try_into().unwrap()) as usize;
        assert_eq!(declared, record.len() - 4);
        // material, attrs, width, bounds, vcount, 3 positions, icount, 3 u16
        assert_eq!(declared, 4 + 1 + 1 + BOUNDS_SIZE + 4 + 3 * 12 + 4 + 3 * 2);
    }

    #[test]
    fn test_invalid_mesh_not_encoded() {
        let mut mesh = Mesh::new();
        mesh.sub_meshes.push(triangle(3));
        assert!(matches!(encode(&mesh, &EncodeOptions::default()), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_empty_mesh() {
        let bytes = encode(&Mesh::new(), &EncodeOptions::default()).unwrap();
        // header, bounds, 4 sections of (len + count), frame range
        assert_eq!(bytes.len(), HEADER_SIZE + BOUNDS_SIZE + 4 * 8 + 8);
    }

    #[test]
    fn test_write_file_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("car.spm");
        write_file(&path, b"first").unwrap();
        write_file(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_write_file_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("car.spm");
        assert!(matches!(write_file(&path, b"data"), Err(Error::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_str16_limit() {
        let mut out = OBuffer::new();
        let long = "x".repeat(70_000);
        assert!(matches!(out.write_str16(&long), Err(Error::InvalidInput(_))));
    }
}
