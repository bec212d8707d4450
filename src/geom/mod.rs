//! Geometry processing for export.
//!
//! - [`VertexPacker`] - deduplicated vertex and index buffers
//! - [`apply_tangents`] - tangent frames from normals and UVs
//! - [`split_sub_mesh`] - uniform-grid spatial partitioning

pub mod packer;
pub mod partition;
pub mod tangent;

pub use packer::{pack_triangles, VertexPacker};
pub use partition::{partition, split_sub_mesh, Grid, PartitionConfig, SpatialCell, MAX_CELLS_PER_AXIS};
pub use tangent::{apply_tangents, generate_tangents, TangentFrames};
