//! Tangent / bitangent generation.
//!
//! Per triangle the UV-space basis is solved from the edge vectors and UV
//! deltas, accumulated per vertex weighted by triangle area, then made
//! orthonormal to the vertex normal (Gram-Schmidt). Only the handedness of
//! the bitangent is kept, as a sign.

use crate::model::{SubMesh, VertexAttributes};
use crate::util::{Vec2, Vec3};

/// Below this UV-space determinant a triangle contributes nothing.
const MIN_UV_AREA: f32 = 1e-12;

/// Below this length an accumulated tangent counts as missing.
const MIN_TANGENT_LENGTH: f32 = 1e-8;

/// Generated tangent frame per vertex.
#[derive(Clone, Debug, Default)]
pub struct TangentFrames {
    pub tangents: Vec<Vec3>,
    pub signs: Vec<f32>,
    /// Vertices that received no usable contribution and use a fallback.
    pub degenerate: Vec<usize>,
}

/// Compute tangents for an indexed triangle list.
///
/// `positions`, `normals` and `uvs` are per vertex and must have the same
/// length; `indices` holds three entries per triangle.
pub fn generate_tangents(positions: &[Vec3], normals: &[Vec3], uvs: &[Vec2], indices: &[u32]) -> TangentFrames {
    let n = positions.len();
    debug_assert!(normals.len() == n && uvs.len() == n);

    let mut tan_acc = vec![Vec3::ZERO; n];
    let mut bit_acc = vec![Vec3::ZERO; n];

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let e1 = positions[i1] - positions[i0];
        let e2 = positions[i2] - positions[i0];
        let d1 = uvs[i1] - uvs[i0];
        let d2 = uvs[i2] - uvs[i0];

        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < MIN_UV_AREA {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (e1 * d2.y - e2 * d1.y) * r;
        let bitangent = (e2 * d1.x - e1 * d2.x) * r;

        let area = 0.5 * e1.cross(e2).length();
        let tangent = tangent.normalize_or_zero() * area;
        let bitangent = bitangent.normalize_or_zero() * area;

        for i in [i0, i1, i2] {
            tan_acc[i] += tangent;
            bit_acc[i] += bitangent;
        }
    }

    let mut frames = TangentFrames {
        tangents: Vec::with_capacity(n),
        signs: Vec::with_capacity(n),
        degenerate: Vec::new(),
    };

    for i in 0..n {
        let normal = normals[i].normalize_or_zero();
        let t = tan_acc[i];
        let ortho = (t - normal * normal.dot(t)).normalize_or_zero();

        if t.length() < MIN_TANGENT_LENGTH || ortho == Vec3::ZERO {
            frames.tangents.push(fallback_tangent(normal));
            frames.signs.push(1.0);
            frames.degenerate.push(i);
            continue;
        }

        let sign = if normal.cross(ortho).dot(bit_acc[i]) < 0.0 { -1.0 } else { 1.0 };
        frames.tangents.push(ortho);
        frames.signs.push(sign);
    }

    frames
}

/// Any unit vector orthogonal to `normal` (X for a zero normal).
fn fallback_tangent(normal: Vec3) -> Vec3 {
    if normal == Vec3::ZERO {
        Vec3::X
    } else {
        normal.any_orthonormal_vector()
    }
}

/// Fill tangents of a sub-mesh that carries normals and UVs and enable the
/// tangent attribute. Returns the degenerate vertex indices.
///
/// Sub-meshes without normals or UVs are left untouched.
pub fn apply_tangents(sub_mesh: &mut SubMesh) -> Vec<usize> {
    if !sub_mesh.attributes.contains(VertexAttributes::NORMAL | VertexAttributes::UV) {
        return Vec::new();
    }
    let positions: Vec<Vec3> = sub_mesh.vertices.iter().map(|v| v.position).collect();
    let normals: Vec<Vec3> = sub_mesh.vertices.iter().map(|v| v.normal).collect();
    let uvs: Vec<Vec2> = sub_mesh.vertices.iter().map(|v| v.uv).collect();

    let frames = generate_tangents(&positions, &normals, &uvs, &sub_mesh.indices);
    for (v, (t, s)) in sub_mesh.vertices.iter_mut().zip(frames.tangents.iter().zip(&frames.signs)) {
        v.tangent = *t;
        v.bitangent_sign = *s;
    }
    sub_mesh.attributes |= VertexAttributes::TANGENT;
    frames.degenerate
}
