//! Vertex attribute packer.
//!
//! Turns triangle corners into a deduplicated vertex buffer plus an index
//! buffer. Two corners share a vertex iff every enabled attribute quantizes
//! to the same value (see [`QUANTIZATION_STEP`](crate::model::QUANTIZATION_STEP)).

use std::collections::HashMap;

use crate::model::{SubMesh, Vertex, VertexAttributes, VertexKey};

/// Incremental dedup builder for one sub-mesh.
#[derive(Debug)]
pub struct VertexPacker {
    attributes: VertexAttributes,
    lookup: HashMap<VertexKey, u32>,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl VertexPacker {
    pub fn new(attributes: VertexAttributes) -> Self {
        Self {
            attributes,
            lookup: HashMap::new(),
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Pre-size the internal buffers for `corners` triangle corners.
    pub fn with_capacity(attributes: VertexAttributes, corners: usize) -> Self {
        Self {
            attributes,
            lookup: HashMap::with_capacity(corners),
            vertices: Vec::with_capacity(corners),
            indices: Vec::with_capacity(corners),
        }
    }

    pub fn attributes(&self) -> VertexAttributes {
        self.attributes
    }

    /// Look up or insert a vertex and return its index. Does not touch the
    /// index buffer.
    pub fn insert(&mut self, vertex: &Vertex) -> u32 {
        let key = vertex.key(self.attributes);
        if let Some(&index) = self.lookup.get(&key) {
            return index;
        }
        let index = self.vertices.len() as u32;
        self.vertices.push(vertex.masked(self.attributes));
        self.lookup.insert(key, index);
        index
    }

    /// Append one triangle, keeping the corner order.
    pub fn push_triangle(&mut self, corners: [&Vertex; 3]) {
        for corner in corners {
            let index = self.insert(corner);
            self.indices.push(index);
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Finish into a sub-mesh using `material`.
    pub fn finish(self, material: usize) -> SubMesh {
        SubMesh {
            material,
            attributes: self.attributes,
            vertices: self.vertices,
            indices: self.indices,
        }
    }
}

/// Pack a triangle soup (three corners per triangle) into a sub-mesh.
pub fn pack_triangles<'a>(
    material: usize,
    attributes: VertexAttributes,
    triangles: impl IntoIterator<Item = [&'a Vertex; 3]>,
) -> SubMesh {
    let mut packer = VertexPacker::new(attributes);
    for tri in triangles {
        packer.push_triangle(tri);
    }
    packer.finish(material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{Vec2, Vec3};

    fn corner(p: Vec3, uv: Vec2) -> Vertex {
        Vertex { position: p, normal: Vec3::Z, uv, ..Default::default() }
    }

    fn quad(uv_seam: bool) -> Vec<[Vertex; 3]> {
        let a = corner(Vec3::ZERO, Vec2::ZERO);
        let b = corner(Vec3::X, Vec2::X);
        let c = corner(Vec3::new(1.0, 1.0, 0.0), Vec2::ONE);
        let d = corner(Vec3::Y, Vec2::Y);
        let mut c2 = c.clone();
        if uv_seam {
            c2.uv = Vec2::new(0.5, 0.5);
        }
        vec![[a.clone(), b, c], [a, c2, d]]
    }

    #[test]
    fn test_shared_corners_merge() {
        let tris = quad(false);
        let sm = pack_triangles(0, VertexAttributes::NORMAL | VertexAttributes::UV, tris.iter().map(|t| [&t[0], &t[1], &t[2]]));
        assert_eq!(sm.num_vertices(), 4);
        assert_eq!(sm.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_differing_attribute_is_not_merged() {
        let tris = quad(true);
        let sm = pack_triangles(0, VertexAttributes::NORMAL | VertexAttributes::UV, tris.iter().map(|t| [&t[0], &t[1], &t[2]]));
        assert_eq!(sm.num_vertices(), 5);

        // Without UVs the seam disappears
        let sm = pack_triangles(0, VertexAttributes::NORMAL, tris.iter().map(|t| [&t[0], &t[1], &t[2]]));
        assert_eq!(sm.num_vertices(), 4);
        assert!(sm.vertices.iter().all(|v| v.uv == Vec2::ZERO));
    }

    #[test]
    fn test_winding_preserved() {
        let tris = quad(false);
        let sm = pack_triangles(0, VertexAttributes::empty(), tris.iter().map(|t| [&t[0], &t[1], &t[2]]));
        for (t, src) in sm.triangles().zip(&tris) {
            for k in 0..3 {
                assert_eq!(sm.vertices[t[k] as usize].position, src[k].position);
            }
        }
    }

    #[test]
    fn test_never_more_vertices_than_corners() {
        let tris: Vec<[Vertex; 3]> = (0..10)
            .map(|i| {
                let o = Vec3::splat(i as f32);
                [Vertex::new(o), Vertex::new(o + Vec3::X), Vertex::new(o + Vec3::Y)]
            })
            .collect();
        let sm = pack_triangles(2, VertexAttributes::empty(), tris.iter().map(|t| [&t[0], &t[1], &t[2]]));
        assert!(sm.num_vertices() <= 30);
        assert_eq!(sm.num_triangles(), 10);
        assert_eq!(sm.material, 2);
    }
}
