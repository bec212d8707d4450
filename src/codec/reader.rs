//! SPM container reader.
//!
//! Decoding is a fixed sequence of stages; see [`DecodeStage`]. Every stage
//! runs even when its section is empty, and the first error moves the
//! decoder to [`DecodeStage::Failed`] for good. Sub-mesh records are
//! length-prefixed, so once the materials and skeleton are known the records
//! are split up front and decoded in parallel.

use std::borrow::Cow;
#[cfg(feature = "mmap")]
use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use rayon::prelude::*;

use super::compression::decompress;
use super::format::*;
use crate::model::{
    Animation, AnimationTrack, Joint, JointWeight, Keyframe, Material, Mesh, Skeleton, SubMesh, Vertex,
    VertexAttributes, MAX_INFLUENCES,
};
use crate::util::{Error, Quat, Result, Transform, Vec2, Vec3};

/// Decoder progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeStage {
    ReadHeader,
    ReadMaterials,
    ReadSkeleton,
    ReadSubMeshes,
    ReadAnimation,
    Done,
    Failed,
}

// ============================================================================
// Byte input
// ============================================================================

/// Little-endian reader over a byte slice. Running past the end is a
/// [`Error::MalformedContainer`].
pub struct IBuffer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> IBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Borrow the next `len` bytes and advance past them.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::malformed(format!(
                "need {len} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn scalar<T>(&mut self, size: usize, read: impl FnOnce(&mut &'a [u8]) -> std::io::Result<T>) -> Result<T> {
        let mut bytes = self.take(size)?;
        read(&mut bytes).map_err(|e| Error::malformed(e.to_string()))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.scalar(1, |b| b.read_u8())
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.scalar(1, |b| b.read_i8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.scalar(2, |b| b.read_u16::<LittleEndian>())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.scalar(4, |b| b.read_u32::<LittleEndian>())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.scalar(4, |b| b.read_i32::<LittleEndian>())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.scalar(4, |b| b.read_f32::<LittleEndian>())
    }

    pub fn read_f32s<const N: usize>(&mut self) -> Result<[f32; N]> {
        let mut out = [0.0; N];
        for v in &mut out {
            *v = self.read_f32()?;
        }
        Ok(out)
    }

    pub fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::from_array(self.read_f32s()?))
    }

    pub fn read_str16(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::malformed(format!("string is not UTF-8: {e}")))
    }

    pub fn read_bounds(&mut self) -> Result<[f32; 6]> {
        self.read_f32s()
    }

    pub fn read_transform(&mut self) -> Result<Transform> {
        let translation = self.read_vec3()?;
        let rotation = Quat::from_array(self.read_f32s()?);
        let scale = self.read_vec3()?;
        Ok(Transform::new(translation, rotation, scale))
    }

    /// Read an element count and make sure `count * min_size` bytes remain.
    pub fn read_count(&mut self, min_size: usize, what: &str) -> Result<usize> {
        let count = self.read_u32()? as usize;
        if count.saturating_mul(min_size) > self.remaining() {
            return Err(Error::malformed(format!(
                "{count} {what} cannot fit in {} remaining bytes",
                self.remaining()
            )));
        }
        Ok(count)
    }

    /// Read a u32-length-prefixed block and parse it with `parse`, which must
    /// consume the block exactly.
    pub fn section<T>(&mut self, name: &str, parse: impl FnOnce(&mut IBuffer<'a>) -> Result<T>) -> Result<T> {
        let len = self.read_u32()? as usize;
        let bytes = self
            .take(len)
            .map_err(|_| Error::malformed(format!("{name} declares {len} bytes, only {} left", self.remaining())))?;
        let mut inner = IBuffer::new(bytes);
        let value = parse(&mut inner).map_err(|e| in_context(e, name))?;
        if inner.remaining() != 0 {
            return Err(Error::malformed(format!(
                "{name} declares {len} bytes but {} were consumed",
                inner.pos()
            )));
        }
        Ok(value)
    }
}

fn in_context(err: Error, context: &str) -> Error {
    match err {
        Error::MalformedContainer(msg) => Error::MalformedContainer(format!("{context}: {msg}")),
        other => other,
    }
}

/// Model-level complaints about stored data are container corruption.
fn as_malformed(err: Error) -> Error {
    match err {
        Error::InvalidInput(msg) => Error::MalformedContainer(msg),
        other => other,
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Staged SPM decoder.
pub struct Decoder<'a> {
    input: &'a [u8],
    body: Cow<'a, [u8]>,
    pos: usize,
    stage: DecodeStage,
    stored_bounds: [f32; 6],
    mesh: Mesh,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            body: Cow::Borrowed(&[]),
            pos: 0,
            stage: DecodeStage::ReadHeader,
            stored_bounds: [0.0; 6],
            mesh: Mesh::new(),
        }
    }

    pub fn stage(&self) -> DecodeStage {
        self.stage
    }

    /// Run the current stage and advance. Returns the new stage.
    pub fn step(&mut self) -> Result<DecodeStage> {
        match self.stage {
            DecodeStage::Done => return Ok(DecodeStage::Done),
            DecodeStage::Failed => return Err(Error::malformed("decoder already failed")),
            _ => {}
        }
        match self.run_stage() {
            Ok(next) => {
                tracing::trace!(from = ?self.stage, to = ?next, "decode stage");
                self.stage = next;
                Ok(next)
            }
            Err(e) => {
                tracing::debug!(stage = ?self.stage, error = %e, "decode failed");
                self.stage = DecodeStage::Failed;
                Err(e)
            }
        }
    }

    /// Run every remaining stage and return the mesh.
    pub fn finish(mut self) -> Result<Mesh> {
        while self.step()? != DecodeStage::Done {}
        Ok(self.mesh)
    }

    fn run_stage(&mut self) -> Result<DecodeStage> {
        match self.stage {
            DecodeStage::ReadHeader => {
                self.body = read_header(self.input)?;
                let mut r = IBuffer::new(&self.body);
                self.stored_bounds = r.read_bounds()?;
                self.pos = r.pos();
                Ok(DecodeStage::ReadMaterials)
            }
            DecodeStage::ReadMaterials => {
                let mut r = IBuffer::at(&self.body, self.pos);
                self.mesh.materials = r.section("materials", read_materials)?;
                self.pos = r.pos();
                Ok(DecodeStage::ReadSkeleton)
            }
            DecodeStage::ReadSkeleton => {
                let mut r = IBuffer::at(&self.body, self.pos);
                self.mesh.skeleton = r.section("skeleton", read_skeleton)?;
                self.pos = r.pos();
                Ok(DecodeStage::ReadSubMeshes)
            }
            DecodeStage::ReadSubMeshes => {
                let num_materials = self.mesh.materials.len();
                let num_joints = self.mesh.skeleton.as_ref().map_or(0, Skeleton::len);
                let mut r = IBuffer::at(&self.body, self.pos);
                self.mesh.sub_meshes =
                    r.section("sub-meshes", |s| read_sub_meshes(s, num_materials, num_joints))?;
                self.pos = r.pos();
                Ok(DecodeStage::ReadAnimation)
            }
            DecodeStage::ReadAnimation => {
                let num_joints = self.mesh.skeleton.as_ref().map_or(0, Skeleton::len);
                let mut r = IBuffer::at(&self.body, self.pos);
                self.mesh.animation = r.section("animation", |s| read_animation(s, num_joints))?;
                self.pos = r.pos();
                if r.remaining() != 0 {
                    return Err(Error::malformed(format!("{} trailing bytes after animation", r.remaining())));
                }
                self.check_mesh()?;
                Ok(DecodeStage::Done)
            }
            DecodeStage::Done | DecodeStage::Failed => Ok(self.stage),
        }
    }

    fn check_mesh(&self) -> Result<()> {
        if self.mesh.bounds().to_array() != self.stored_bounds {
            return Err(Error::malformed("mesh bounds do not match the sub-mesh data"));
        }
        self.mesh.validate().map_err(as_malformed)
    }
}

/// Decode a complete SPM file image.
#[tracing::instrument(skip_all, fields(len = data.len()))]
pub fn decode(data: &[u8]) -> Result<Mesh> {
    let mesh = Decoder::new(data).finish()?;
    tracing::debug!(
        sub_meshes = mesh.sub_meshes.len(),
        vertices = mesh.num_vertices(),
        triangles = mesh.num_triangles(),
        "mesh decoded"
    );
    Ok(mesh)
}

/// Read and decode an SPM file through a read-only memory map.
#[cfg(feature = "mmap")]
pub fn read_file(path: impl AsRef<Path>) -> Result<Mesh> {
    let file = File::open(path.as_ref())?;
    if file.metadata()?.len() == 0 {
        return decode(&[]);
    }
    // Safety: the map is read-only and dropped before returning
    let map = unsafe { memmap2::Mmap::map(&file) }?;
    decode(&map)
}

/// Read and decode an SPM file.
#[cfg(not(feature = "mmap"))]
pub fn read_file(path: impl AsRef<Path>) -> Result<Mesh> {
    decode(&std::fs::read(path.as_ref())?)
}

/// Validate the header and return the (inflated) body.
fn read_header(input: &[u8]) -> Result<Cow<'_, [u8]>> {
    if input.len() < HEADER_SIZE {
        return Err(Error::malformed(format!("{} bytes is too short for a header", input.len())));
    }
    if &input[..SPM_MAGIC.len()] != SPM_MAGIC {
        return Err(Error::malformed("bad magic"));
    }
    let mut r = IBuffer::at(input, VERSION_OFFSET);
    let version = r.read_u16()?;
    if version != CURRENT_VERSION {
        return Err(Error::malformed(format!(
            "unsupported version {version}, expected {CURRENT_VERSION}"
        )));
    }
    let flags = r.read_u16()?;
    if flags & !KNOWN_FLAGS != 0 {
        return Err(Error::malformed(format!("unknown header flags {flags:#06x}")));
    }

    let body = &input[HEADER_SIZE..];
    if flags & FLAG_COMPRESSED != 0 {
        Ok(Cow::Owned(decompress(body)?))
    } else {
        Ok(Cow::Borrowed(body))
    }
}

fn read_materials(r: &mut IBuffer<'_>) -> Result<Vec<Material>> {
    let count = r.read_count(2 + 4, "materials")?;
    (0..count)
        .map(|_| {
            let texture = r.read_str16()?;
            let flags = r.read_u32()?;
            Ok(Material { texture, flags })
        })
        .collect()
}

fn read_skeleton(r: &mut IBuffer<'_>) -> Result<Option<Skeleton>> {
    let count = r.read_count(2 + 4 + TRANSFORM_SIZE, "joints")?;
    if count == 0 {
        return Ok(None);
    }
    let mut joints = Vec::with_capacity(count);
    for j in 0..count {
        let name = r.read_str16()?;
        let parent = match r.read_i32()? {
            NO_PARENT => None,
            p if p >= 0 => Some(p as usize),
            p => return Err(Error::malformed(format!("joint {j} has parent {p}"))),
        };
        let bind = r.read_transform()?;
        joints.push(Joint { name, parent, bind });
    }
    let skeleton = Skeleton::new(joints).map_err(as_malformed)?;
    skeleton.check_finite()?;
    Ok(Some(skeleton))
}

fn read_sub_meshes(r: &mut IBuffer<'_>, num_materials: usize, num_joints: usize) -> Result<Vec<SubMesh>> {
    let count = r.read_count(4, "sub-meshes")?;
    let mut records = Vec::with_capacity(count);
    for _ in 0..count {
        let len = r.read_u32()? as usize;
        records.push(r.take(len)?);
    }
    records
        .par_iter()
        .enumerate()
        .map(|(s, record)| {
            let mut rec = IBuffer::new(record);
            let sm = read_sub_mesh(&mut rec, num_materials, num_joints);
            let sm = sm.and_then(|sm| {
                if rec.remaining() != 0 {
                    return Err(Error::malformed(format!("{} unread bytes", rec.remaining())));
                }
                Ok(sm)
            });
            sm.map_err(|e| in_context(e, &format!("record {s}")))
        })
        .collect()
}

fn read_sub_mesh(r: &mut IBuffer<'_>, num_materials: usize, num_joints: usize) -> Result<SubMesh> {
    let material = r.read_u32()? as usize;
    if material >= num_materials {
        return Err(Error::malformed(format!("material {material} of {num_materials}")));
    }
    let bits = r.read_u8()?;
    let attributes = VertexAttributes::from_stored(bits).ok_or(Error::UnsupportedAttributeCombination(bits))?;
    if attributes.contains(VertexAttributes::SKIN) && num_joints == 0 {
        return Err(Error::malformed("skinned sub-mesh without a skeleton"));
    }
    let width = r.read_u8()?;
    let stored_bounds = r.read_bounds()?;

    let num_vertices = r.read_count(fixed_vertex_size(attributes), "vertices")?;
    if width != index_width(num_vertices) {
        return Err(Error::malformed(format!("index width {width} for {num_vertices} vertices")));
    }
    let vertices = (0..num_vertices)
        .map(|_| read_vertex(r, attributes, num_joints))
        .collect::<Result<Vec<_>>>()?;

    let num_indices = r.read_count(width as usize, "indices")?;
    if num_indices % 3 != 0 {
        return Err(Error::malformed(format!("index count {num_indices} is not a multiple of 3")));
    }
    let mut indices = Vec::with_capacity(num_indices);
    for _ in 0..num_indices {
        let i = if width == 2 { r.read_u16()? as u32 } else { r.read_u32()? };
        if i as usize >= num_vertices {
            return Err(Error::malformed(format!("index {i} out of range ({num_vertices} vertices)")));
        }
        indices.push(i);
    }

    let sm = SubMesh { material, attributes, vertices, indices };
    if sm.bounds().to_array() != stored_bounds {
        return Err(Error::malformed("stored bounds do not match the vertices"));
    }
    Ok(sm)
}

fn read_vertex(r: &mut IBuffer<'_>, attrs: VertexAttributes, num_joints: usize) -> Result<Vertex> {
    let mut v = Vertex::new(r.read_vec3()?);
    if attrs.contains(VertexAttributes::NORMAL) {
        v.normal = r.read_vec3()?;
    }
    if attrs.contains(VertexAttributes::UV) {
        v.uv = Vec2::from_array(r.read_f32s()?);
    }
    if attrs.contains(VertexAttributes::COLOR) {
        v.color.copy_from_slice(r.take(4)?);
    }
    if attrs.contains(VertexAttributes::TANGENT) {
        v.tangent = r.read_vec3()?;
        v.bitangent_sign = if r.read_i8()? < 0 { -1.0 } else { 1.0 };
    }
    if attrs.contains(VertexAttributes::SKIN) {
        let count = r.read_u8()? as usize;
        if count > MAX_INFLUENCES {
            return Err(Error::malformed(format!("{count} influences on one vertex")));
        }
        for _ in 0..count {
            let joint = r.read_u16()?;
            if joint as usize >= num_joints {
                return Err(Error::malformed(format!("joint {joint} of {num_joints}")));
            }
            v.joints.push(JointWeight::new(joint, r.read_f32()?));
        }
    }
    Ok(v)
}

fn read_animation(r: &mut IBuffer<'_>, num_joints: usize) -> Result<Option<Animation>> {
    let count = r.read_u32()? as usize;
    let frame_range = (r.read_i32()?, r.read_i32()?);
    if count == 0 {
        return Ok(None);
    }
    if count != num_joints {
        return Err(Error::malformed(format!("{count} tracks for {num_joints} joints")));
    }
    let mut tracks = Vec::with_capacity(count);
    for joint in 0..count {
        let num_keys = r.read_count(KEYFRAME_SIZE, "keyframes")?;
        let keys = (0..num_keys)
            .map(|_| Ok(Keyframe::new(r.read_f32()?, r.read_transform()?)))
            .collect::<Result<Vec<_>>>()?;
        tracks.push(AnimationTrack::new(joint, keys).map_err(as_malformed)?);
    }
    Ok(Some(Animation::new(frame_range, tracks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::writer::{encode, EncodeOptions};

    fn sample_mesh() -> Mesh {
        let mut mesh = Mesh::new();
        mesh.materials.push(Material::new("track.png", 0));
        let mut sm = SubMesh::new(0, VertexAttributes::NORMAL | VertexAttributes::COLOR);
        sm.vertices = vec![
            Vertex { normal: Vec3::Z, color: [1, 2, 3, 4], ..Vertex::new(Vec3::ZERO) },
            Vertex { normal: Vec3::Z, color: [5, 6, 7, 8], ..Vertex::new(Vec3::X) },
            Vertex { normal: Vec3::Z, color: [9, 10, 11, 12], ..Vertex::new(Vec3::Y) },
        ];
        sm.indices = vec![0, 1, 2];
        mesh.sub_meshes.push(sm);
        mesh
    }

    #[test]
    fn test_stages_in_order() {
        let bytes = encode(&sample_mesh(), &EncodeOptions::default()).unwrap();
        let mut decoder = Decoder::new(&bytes);
        let mut seen = vec![decoder.stage()];
        while decoder.stage() != DecodeStage::Done {
            seen.push(decoder.step().unwrap());
        }
        assert_eq!(
            seen,
            vec![
                DecodeStage::ReadHeader,
                DecodeStage::ReadMaterials,
                DecodeStage::ReadSkeleton,
                DecodeStage::ReadSubMeshes,
                DecodeStage::ReadAnimation,
                DecodeStage::Done,
            ]
        );
    }

    #[test]
    fn test_failure_is_sticky() {
        let mut bytes = encode(&sample_mesh(), &EncodeOptions::default()).unwrap();
        bytes[0] = b'X';
        let mut decoder = Decoder::new(&bytes);
        assert!(matches!(decoder.step(), Err(Error::MalformedContainer(_))));
        assert_eq!(decoder.stage(), DecodeStage::Failed);
        assert!(decoder.step().is_err());
    }

    #[test]
    fn test_round_trip_values() {
        let mesh = sample_mesh();
        let bytes = encode(&mesh, &EncodeOptions::default()).unwrap();
        assert_eq!(decode(&bytes).unwrap(), mesh);
    }

    #[test]
    fn test_truncated_is_malformed() {
        let bytes = encode(&sample_mesh(), &EncodeOptions::default()).unwrap();
        for cut in [3, HEADER_SIZE, HEADER_SIZE + 10, bytes.len() - 1] {
            assert!(
                matches!(decode(&bytes[..cut]), Err(Error::MalformedContainer(_))),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn test_trailing_bytes_are_malformed() {
        let mut bytes = encode(&sample_mesh(), &EncodeOptions::default()).unwrap();
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(Error::MalformedContainer(_))));
    }

    #[test]
    fn test_unknown_attribute_bits() {
        let bytes = encode(&sample_mesh(), &EncodeOptions::default()).unwrap();
        // offset of the attribute byte in the first sub-mesh record
        let materials = 4 + 4 + 2 + "track.png".len() + 4;
        let skeleton = 4 + 4;
        let record_attrs = HEADER_SIZE + BOUNDS_SIZE + materials + skeleton + 4 + 4 + 4 + 4;
        let mut bad = bytes.clone();
        bad[record_attrs] = 0x40;
        assert!(matches!(decode(&bad), Err(Error::UnsupportedAttributeCombination(0x40))));

        // TANGENT without UV
        bad[record_attrs] = (VertexAttributes::NORMAL | VertexAttributes::TANGENT).bits();
        assert!(matches!(decode(&bad), Err(Error::UnsupportedAttributeCombination(_))));
    }

    #[test]
    fn test_section_length_mismatch() {
        let mut bytes = encode(&sample_mesh(), &EncodeOptions::default()).unwrap();
        // materials section length lives right after the mesh bounds
        let at = HEADER_SIZE + BOUNDS_SIZE;
        let len = u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
        bytes[at..at + 4].copy_from_slice(&(len + 1).to_le_bytes());
        assert!(matches!(decode(&bytes), Err(Error::MalformedContainer(_))));
    }
}
