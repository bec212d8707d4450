//! Spatial mesh partitioner.
//!
//! Splits one sub-mesh into several by bucketing triangles into a uniform
//! grid over its bounding box. A triangle belongs to the cell containing its
//! centroid and is never clipped. Every populated cell becomes a sub-mesh
//! with its own, re-deduplicated vertex buffer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::packer::VertexPacker;
use crate::model::SubMesh;
use crate::util::{BBox3f, Vec3};

/// Upper bound on grid cells along one axis.
pub const MAX_CELLS_PER_AXIS: u32 = 64;

/// Extents below this are treated as flat.
const FLAT_EPSILON: f32 = 1e-6;

const CELL_SLACK: f32 = 1e-3;

/// Grid sizing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Desired average triangle count per cell, used when `cell_size` is unset.
    pub target_triangles_per_cell: usize,
    /// Explicit cell edge length.
    pub cell_size: Option<f32>,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            target_triangles_per_cell: 1024,
            cell_size: None,
        }
    }
}

/// Uniform grid over a bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grid {
    pub origin: Vec3,
    /// Cell extent per axis.
    pub step: Vec3,
    /// Cell count per axis.
    pub dims: [u32; 3],
}

impl Grid {
    /// Size a grid for `num_triangles` triangles inside `bounds`.
    pub fn new(bounds: &BBox3f, num_triangles: usize, config: &PartitionConfig) -> Self {
        let extent = bounds.size();
        let origin = if bounds.is_empty() { Vec3::ZERO } else { bounds.min };
        let size = cell_size(extent, num_triangles, config);

        let mut dims = [1u32; 3];
        let mut step = Vec3::ONE;
        for axis in 0..3 {
            let e = extent[axis];
            if e > FLAT_EPSILON {
                if let Some(size) = size {
                    // a sliver under CELL_SLACK of a cell does not open a new one
                    let cells = (e / size - CELL_SLACK).ceil();
                    dims[axis] = (cells as u32).clamp(1, MAX_CELLS_PER_AXIS);
                }
                step[axis] = e / dims[axis] as f32;
            } else {
                step[axis] = FLAT_EPSILON;
            }
        }
        Self { origin, step, dims }
    }

    pub fn num_cells(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }

    /// Cell coordinate of a point, clamped into the grid.
    pub fn cell_of(&self, p: Vec3) -> [u32; 3] {
        let rel = (p - self.origin) / self.step;
        let mut c = [0u32; 3];
        for axis in 0..3 {
            let i = rel[axis].floor();
            // NaN and negatives clamp to the first cell
            c[axis] = if i >= 0.0 { (i as u32).min(self.dims[axis] - 1) } else { 0 };
        }
        c
    }

    /// Row-major linear index of a cell coordinate.
    pub fn linear_index(&self, c: [u32; 3]) -> u32 {
        (c[2] * self.dims[1] + c[1]) * self.dims[0] + c[0]
    }

    /// Region covered by a cell.
    pub fn cell_bounds(&self, c: [u32; 3]) -> BBox3f {
        let min = self.origin + Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32) * self.step;
        BBox3f::new(min, min + self.step)
    }
}

/// Cell edge length, `None` when the mesh has no extent at all.
fn cell_size(extent: Vec3, num_triangles: usize, config: &PartitionConfig) -> Option<f32> {
    if let Some(size) = config.cell_size.filter(|s| s.is_finite() && *s > 0.0) {
        return Some(size);
    }
    let axes: Vec<f32> = extent.to_array().into_iter().filter(|&e| e > FLAT_EPSILON).collect();
    if axes.is_empty() {
        return None;
    }
    let target = config.target_triangles_per_cell.max(1);
    let cells = num_triangles.div_ceil(target).max(1) as f32;
    let volume: f32 = axes.iter().product();
    Some((volume / cells).powf(1.0 / axes.len() as f32))
}

/// A populated grid cell.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialCell {
    pub coord: [u32; 3],
    pub bounds: BBox3f,
    /// Indices of the source triangles assigned to this cell.
    pub triangles: Vec<usize>,
}

/// Assign every triangle of `sub_mesh` to exactly one grid cell.
///
/// Cells are returned in row-major grid order; empty cells are omitted.
pub fn partition(sub_mesh: &SubMesh, config: &PartitionConfig) -> Vec<SpatialCell> {
    let grid = Grid::new(&sub_mesh.bounds(), sub_mesh.num_triangles(), config);
    tracing::debug!(
        triangles = sub_mesh.num_triangles(),
        dims = ?grid.dims,
        "partition grid"
    );

    let mut buckets: BTreeMap<u32, SpatialCell> = BTreeMap::new();
    for (t, tri) in sub_mesh.triangles().enumerate() {
        let centroid = tri
            .iter()
            .map(|&i| sub_mesh.vertices[i as usize].position)
            .sum::<Vec3>()
            / 3.0;
        let coord = grid.cell_of(centroid);
        buckets
            .entry(grid.linear_index(coord))
            .or_insert_with(|| SpatialCell {
                coord,
                bounds: grid.cell_bounds(coord),
                triangles: Vec::new(),
            })
            .triangles
            .push(t);
    }
    buckets.into_values().collect()
}

/// Split a sub-mesh into one sub-mesh per populated cell.
///
/// Vertices used from several cells are duplicated into each. Material and
/// attribute mask carry over. A mesh that fits one cell comes back as a
/// single sub-mesh equal to the input up to vertex order.
#[tracing::instrument(skip_all, fields(material = sub_mesh.material))]
pub fn split_sub_mesh(sub_mesh: &SubMesh, config: &PartitionConfig) -> Vec<SubMesh> {
    if sub_mesh.num_triangles() == 0 {
        return vec![sub_mesh.clone()];
    }
    partition(sub_mesh, config)
        .into_iter()
        .map(|cell| {
            let mut packer = VertexPacker::with_capacity(sub_mesh.attributes, cell.triangles.len() * 3);
            for t in cell.triangles {
                let [a, b, c] = sub_mesh.triangle(t);
                packer.push_triangle([
                    &sub_mesh.vertices[a as usize],
                    &sub_mesh.vertices[b as usize],
                    &sub_mesh.vertices[c as usize],
                ]);
            }
            packer.finish(sub_mesh.material)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::packer::pack_triangles;
    use crate::model::{Vertex, VertexAttributes};

    fn quad() -> SubMesh {
        let v = [
            Vertex::new(Vec3::ZERO),
            Vertex::new(Vec3::X),
            Vertex::new(Vec3::new(1.0, 1.0, 0.0)),
            Vertex::new(Vec3::Y),
        ];
        pack_triangles(1, VertexAttributes::empty(), [[&v[0], &v[1], &v[2]], [&v[0], &v[2], &v[3]]])
    }

    /// n x n grid of unit quads on the XZ plane.
    fn terrain(n: usize) -> SubMesh {
        let mut tris = Vec::new();
        for z in 0..n {
            for x in 0..n {
                let p = |dx: usize, dz: usize| Vertex::new(Vec3::new((x + dx) as f32, 0.0, (z + dz) as f32));
                tris.push([p(0, 0), p(1, 0), p(1, 1)]);
                tris.push([p(0, 0), p(1, 1), p(0, 1)]);
            }
        }
        pack_triangles(0, VertexAttributes::empty(), tris.iter().map(|t| [&t[0], &t[1], &t[2]]))
    }

    fn triangle_positions(sm: &SubMesh) -> Vec<[[i64; 3]; 3]> {
        let q = |v: Vec3| [(v.x * 1e4) as i64, (v.y * 1e4) as i64, (v.z * 1e4) as i64];
        let mut out: Vec<_> = sm
            .triangles()
            .map(|t| t.map(|i| q(sm.vertices[i as usize].position)))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_large_cell_yields_single_sub_mesh() {
        let sm = quad();
        let config = PartitionConfig { cell_size: Some(10.0), ..Default::default() };
        let out = split_sub_mesh(&sm, &config);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].material, 1);
        assert_eq!(out[0].num_vertices(), sm.num_vertices());
        assert_eq!(triangle_positions(&out[0]), triangle_positions(&sm));
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let sm = terrain(8);
        let config = PartitionConfig { target_triangles_per_cell: 16, cell_size: None };
        let cells = partition(&sm, &config);
        assert!(cells.len() > 1);

        let mut seen = vec![0u32; sm.num_triangles()];
        for cell in &cells {
            for &t in &cell.triangles {
                seen[t] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_split_duplicates_shared_vertices() {
        let sm = terrain(4);
        let config = PartitionConfig { cell_size: Some(2.0), ..Default::default() };
        let out = split_sub_mesh(&sm, &config);
        assert_eq!(out.len(), 4);

        let total: usize = out.iter().map(SubMesh::num_triangles).sum();
        assert_eq!(total, sm.num_triangles());
        let vertices: usize = out.iter().map(SubMesh::num_vertices).sum();
        assert!(vertices > sm.num_vertices());

        let mut merged: Vec<_> = out.iter().flat_map(triangle_positions).collect();
        merged.sort();
        assert_eq!(merged, triangle_positions(&sm));
        for piece in &out {
            piece.validate().expect("valid sub-mesh");
        }
    }

    #[test]
    fn test_grid_clamps_axis_count() {
        let bounds = BBox3f::new(Vec3::ZERO, Vec3::new(1000.0, 0.0, 1.0));
        let grid = Grid::new(&bounds, 10, &PartitionConfig { cell_size: Some(1.0), ..Default::default() });
        assert_eq!(grid.dims, [MAX_CELLS_PER_AXIS, 1, 1]);
        assert_eq!(grid.cell_of(Vec3::new(5000.0, 0.0, 0.0))[0], MAX_CELLS_PER_AXIS - 1);
        assert_eq!(grid.cell_of(Vec3::new(-1.0, 0.0, 0.0))[0], 0);
    }

    #[test]
    fn test_flat_mesh_uses_planar_cells() {
        // 8x8 quads = 128 triangles, target 32 -> 4 cells -> 2x2 on XZ
        let sm = terrain(8);
        let grid = Grid::new(&sm.bounds(), sm.num_triangles(), &PartitionConfig { target_triangles_per_cell: 32, cell_size: None });
        assert_eq!(grid.dims, [2, 1, 2]);
    }
}
