//! In-memory SPM model.
//!
//! A [`Mesh`] owns its materials, sub-meshes, skeleton and animation. Every
//! sub-mesh owns its vertex and index buffers outright; nothing is shared
//! between sub-meshes.

mod animation;
mod skeleton;
mod vertex;

pub use animation::*;
pub use skeleton::*;
pub use vertex::*;

use crate::util::{BBox3f, Error, Result, Vec3};

/// Material flag: texture carries alpha and is blended.
pub const MATERIAL_ALPHA_BLEND: u32 = 1 << 0;
/// Material flag: faces are rendered from both sides.
pub const MATERIAL_DOUBLE_SIDED: u32 = 1 << 1;

/// Material reference. The codec passes these through untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Material {
    /// Texture file name, relative to the model or a texture search root.
    pub texture: String,
    /// Opaque flags, see `MATERIAL_*`.
    pub flags: u32,
}

impl Material {
    pub fn new(texture: impl Into<String>, flags: u32) -> Self {
        Self { texture: texture.into(), flags }
    }
}

/// Material-homogeneous chunk of a mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubMesh {
    pub material: usize,
    /// Which vertex attributes are meaningful for this sub-mesh.
    pub attributes: VertexAttributes,
    pub vertices: Vec<Vertex>,
    /// Triangle list, three indices per triangle.
    pub indices: Vec<u32>,
}

impl SubMesh {
    pub fn new(material: usize, attributes: VertexAttributes) -> Self {
        Self { material, attributes, ..Default::default() }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Triangle `i` as vertex indices.
    pub fn triangle(&self, i: usize) -> [u32; 3] {
        [self.indices[3 * i], self.indices[3 * i + 1], self.indices[3 * i + 2]]
    }

    /// Iterate triangles as vertex index triples.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]])
    }

    pub fn bounds(&self) -> BBox3f {
        BBox3f::from_points(self.vertices.iter().map(|v| v.position))
    }

    /// Check the buffer invariants of this sub-mesh.
    pub fn validate(&self) -> Result<()> {
        if !self.attributes.is_supported() {
            return Err(Error::UnsupportedAttributeCombination(self.attributes.bits()));
        }
        if self.indices.len() % 3 != 0 {
            return Err(Error::invalid_input(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let n = self.vertices.len();
        if let Some(&bad) = self.indices.iter().find(|&&i| i as usize >= n) {
            return Err(Error::invalid_input(format!("index {bad} out of range ({n} vertices)")));
        }
        if let Some(v) = self.vertices.iter().position(|v| !v.position.is_finite()) {
            return Err(Error::invalid_input(format!("vertex {v} has a non-finite position")));
        }
        if self.attributes.contains(VertexAttributes::NORMAL) {
            if let Some(v) = self.vertices.iter().position(|v| !is_unit(v.normal)) {
                return Err(Error::invalid_input(format!(
                    "vertex {v} has a non-unit normal {:?}",
                    self.vertices[v].normal
                )));
            }
        }
        Ok(())
    }
}

/// A complete SPM model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub materials: Vec<Material>,
    pub sub_meshes: Vec<SubMesh>,
    pub skeleton: Option<Skeleton>,
    pub animation: Option<Animation>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_vertices(&self) -> usize {
        self.sub_meshes.iter().map(SubMesh::num_vertices).sum()
    }

    pub fn num_triangles(&self) -> usize {
        self.sub_meshes.iter().map(SubMesh::num_triangles).sum()
    }

    pub fn bounds(&self) -> BBox3f {
        let mut b = BBox3f::EMPTY;
        for sm in &self.sub_meshes {
            b.expand_by_box(&sm.bounds());
        }
        b
    }

    pub fn has_skeleton(&self) -> bool {
        self.skeleton.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Check every cross-reference invariant of the model.
    pub fn validate(&self) -> Result<()> {
        let num_joints = self.skeleton.as_ref().map_or(0, Skeleton::len);
        if let Some(skeleton) = &self.skeleton {
            if skeleton.is_empty() {
                return Err(Error::invalid_input("skeleton has no joints, use None instead"));
            }
            skeleton.check_finite()?;
        }
        if self.animation.is_some() && num_joints == 0 {
            return Err(Error::invalid_input("animation without a skeleton"));
        }

        for (s, sm) in self.sub_meshes.iter().enumerate() {
            sm.validate()
                .map_err(|e| prefix_error(e, &format!("sub-mesh {s}")))?;
            if sm.material >= self.materials.len() {
                return Err(Error::invalid_input(format!(
                    "sub-mesh {s} references material {} of {}",
                    sm.material,
                    self.materials.len()
                )));
            }
            if !sm.attributes.contains(VertexAttributes::SKIN) {
                continue;
            }
            if num_joints == 0 {
                return Err(Error::invalid_input(format!("sub-mesh {s} is skinned but the mesh has no skeleton")));
            }
            for (v, vertex) in sm.vertices.iter().enumerate() {
                if vertex.joints.len() > MAX_INFLUENCES {
                    return Err(Error::invalid_input(format!("sub-mesh {s} vertex {v} has more than {MAX_INFLUENCES} influences")));
                }
                if let Some(jw) = vertex.joints.iter().find(|jw| jw.joint as usize >= num_joints) {
                    return Err(Error::invalid_input(format!(
                        "sub-mesh {s} vertex {v} references joint {} of {num_joints}",
                        jw.joint
                    )));
                }
                let total: f32 = vertex.joints.iter().map(|jw| jw.weight).sum();
                if !vertex.joints.is_empty() && (total - 1.0).abs() > UNIT_EPSILON {
                    return Err(Error::invalid_input(format!(
                        "sub-mesh {s} vertex {v} weights sum to {total}"
                    )));
                }
            }
        }

        if let Some(animation) = &self.animation {
            if animation.tracks.len() != num_joints {
                return Err(Error::invalid_input(format!(
                    "animation has {} tracks for {num_joints} joints",
                    animation.tracks.len()
                )));
            }
        }
        Ok(())
    }
}

fn is_unit(n: Vec3) -> bool {
    (n.length() - 1.0).abs() <= UNIT_EPSILON
}

fn prefix_error(err: Error, context: &str) -> Error {
    match err {
        Error::InvalidInput(msg) => Error::InvalidInput(format!("{context}: {msg}")),
        other => other,
    }
}
