//! [`SceneAdapter`] over an already decoded [`Mesh`].
//!
//! Every sub-mesh is exposed as one object named `sub_mesh_<index>`, which
//! makes re-exporting an SPM file (with different options) a plain export.

use super::{SceneAdapter, SourceTriangle, TriangleQuery};
use crate::model::{Keyframe, Material, Mesh, Skeleton, VertexAttributes};
use crate::util::{Mat3, Mat4};

/// A decoded mesh presented as a scene.
#[derive(Clone, Debug)]
pub struct MeshScene {
    mesh: Mesh,
    /// Object-to-world transform, applied unless the query asks for local space.
    world: Mat4,
}

impl MeshScene {
    pub fn new(mesh: Mesh) -> Self {
        Self { mesh, world: Mat4::IDENTITY }
    }

    pub fn with_transform(mut self, world: Mat4) -> Self {
        self.world = world;
        self
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn object_name(sub_mesh: usize) -> String {
        format!("sub_mesh_{sub_mesh}")
    }
}

impl From<Mesh> for MeshScene {
    fn from(mesh: Mesh) -> Self {
        Self::new(mesh)
    }
}

impl SceneAdapter for MeshScene {
    fn triangles(&self, query: &TriangleQuery) -> Vec<SourceTriangle> {
        let world = (!query.local_space && self.world != Mat4::IDENTITY).then_some(self.world);
        let normal_matrix = world.map(|m| Mat3::from_mat4(m).inverse().transpose());

        let mut out = Vec::with_capacity(self.mesh.num_triangles());
        for (s, sm) in self.mesh.sub_meshes.iter().enumerate() {
            if !query.selects(&Self::object_name(s)) {
                continue;
            }
            // tangents are regenerated on export
            let attributes = sm.attributes - VertexAttributes::TANGENT;
            for tri in sm.triangles() {
                let mut corners = tri.map(|i| sm.vertices[i as usize].masked(attributes));
                if let (Some(m), Some(n)) = (world, normal_matrix) {
                    for c in &mut corners {
                        c.position = m.transform_point3(c.position);
                        c.normal = (n * c.normal).normalize_or_zero();
                    }
                }
                out.push(SourceTriangle { material: sm.material, attributes, corners });
            }
        }
        out
    }

    fn materials(&self) -> Vec<Material> {
        self.mesh.materials.clone()
    }

    fn skeleton(&self) -> Option<Skeleton> {
        self.mesh.skeleton.clone()
    }

    fn animation(&self, joint: usize) -> Vec<Keyframe> {
        self.mesh
            .animation
            .as_ref()
            .and_then(|a| a.tracks.get(joint))
            .map(|t| t.keys().to_vec())
            .unwrap_or_default()
    }

    fn frame_range(&self) -> (i32, i32) {
        self.mesh.animation.as_ref().map_or((0, 0), |a| a.frame_range)
    }
}
