//! Vertex record and attribute bitmask.

use smallvec::SmallVec;

use crate::util::{Vec2, Vec3};

/// Maximum number of joint influences per vertex.
pub const MAX_INFLUENCES: usize = 4;

/// Grid used to quantize floats for vertex deduplication.
pub const QUANTIZATION_STEP: f32 = 1e-5;

/// Tolerance used when validating unit normals and weight sums.
pub const UNIT_EPSILON: f32 = 1e-3;

bitflags::bitflags! {
    /// Per-sub-mesh vertex layout. Position is always present.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VertexAttributes: u8 {
        /// Unit normal, 3 x f32.
        const NORMAL = 1 << 0;
        /// Texture coordinate, 2 x f32.
        const UV = 1 << 1;
        /// RGBA color, 4 x u8.
        const COLOR = 1 << 2;
        /// Tangent (3 x f32) and bitangent sign.
        const TANGENT = 1 << 3;
        /// Up to four (joint, weight) pairs.
        const SKIN = 1 << 4;
    }
}

impl VertexAttributes {
    /// Decode a stored bitmask, rejecting unknown bits and unknown combinations.
    pub fn from_stored(bits: u8) -> Option<Self> {
        let attrs = Self::from_bits(bits)?;
        attrs.is_supported().then_some(attrs)
    }

    /// Tangents are only meaningful with both a normal and a UV.
    pub fn is_supported(self) -> bool {
        !self.contains(Self::TANGENT) || self.contains(Self::NORMAL | Self::UV)
    }
}

/// One joint influence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointWeight {
    pub joint: u16,
    pub weight: f32,
}

impl JointWeight {
    pub fn new(joint: u16, weight: f32) -> Self {
        Self { joint, weight }
    }
}

/// Joint influences of a single vertex.
pub type Influences = SmallVec<[JointWeight; MAX_INFLUENCES]>;

/// A fully assembled vertex.
///
/// Fields whose attribute is disabled in the owning sub-mesh hold their
/// default value; see [`Vertex::masked`].
#[derive(Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub color: [u8; 4],
    pub tangent: Vec3,
    /// +1 when the bitangent points along `normal x tangent`, -1 otherwise.
    pub bitangent_sign: f32,
    pub joints: Influences,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
            uv: Vec2::ZERO,
            color: [255; 4],
            tangent: Vec3::ZERO,
            bitangent_sign: 1.0,
            joints: Influences::new(),
        }
    }
}

impl Vertex {
    pub fn new(position: Vec3) -> Self {
        Self { position, ..Default::default() }
    }

    /// Copy of this vertex with every attribute outside `attrs` reset.
    pub fn masked(&self, attrs: VertexAttributes) -> Self {
        let d = Self::default();
        Self {
            position: self.position,
            normal: if attrs.contains(VertexAttributes::NORMAL) { self.normal } else { d.normal },
            uv: if attrs.contains(VertexAttributes::UV) { self.uv } else { d.uv },
            color: if attrs.contains(VertexAttributes::COLOR) { self.color } else { d.color },
            tangent: if attrs.contains(VertexAttributes::TANGENT) { self.tangent } else { d.tangent },
            bitangent_sign: if attrs.contains(VertexAttributes::TANGENT) {
                self.bitangent_sign
            } else {
                d.bitangent_sign
            },
            joints: if attrs.contains(VertexAttributes::SKIN) { self.joints.clone() } else { d.joints },
        }
    }

    /// Quantized identity of the enabled attributes.
    pub fn key(&self, attrs: VertexAttributes) -> VertexKey {
        let mut ints: SmallVec<[i64; 24]> = SmallVec::new();
        let mut push = |v: f32| ints.push(quantize(v));
        self.position.to_array().into_iter().for_each(&mut push);
        if attrs.contains(VertexAttributes::NORMAL) {
            self.normal.to_array().into_iter().for_each(&mut push);
        }
        if attrs.contains(VertexAttributes::UV) {
            self.uv.to_array().into_iter().for_each(&mut push);
        }
        if attrs.contains(VertexAttributes::TANGENT) {
            self.tangent.to_array().into_iter().for_each(&mut push);
            push(self.bitangent_sign.signum());
        }
        if attrs.contains(VertexAttributes::SKIN) {
            for jw in &self.joints {
                ints.push(jw.joint as i64);
                ints.push(quantize(jw.weight));
            }
        }
        let color = if attrs.contains(VertexAttributes::COLOR) { self.color } else { [0; 4] };
        VertexKey { ints, color }
    }

    /// Sort influences heaviest first, keep at most four, drop zero weights
    /// and renormalize so the weights sum to one.
    pub fn normalize_influences(&mut self) {
        self.joints.retain(|jw| jw.weight > 0.0);
        self.joints
            .sort_by(|a, b| b.weight.total_cmp(&a.weight).then(a.joint.cmp(&b.joint)));
        self.joints.truncate(MAX_INFLUENCES);
        let total: f32 = self.joints.iter().map(|jw| jw.weight).sum();
        if total > 0.0 {
            for jw in &mut self.joints {
                jw.weight /= total;
            }
        }
    }
}

/// Hashable quantized vertex identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexKey {
    ints: SmallVec<[i64; 24]>,
    color: [u8; 4],
}

#[inline]
fn quantize(v: f32) -> i64 {
    // -0.0 and 0.0 land in the same bucket
    ((v as f64) / QUANTIZATION_STEP as f64).round() as i64
}
