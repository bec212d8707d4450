//! # SPM
//!
//! Reader and writer for SPM ("space partitioned mesh"), the binary mesh
//! format of a racing game, plus the export pipeline that turns an editor
//! scene into one.
//!
//! ## Modules
//!
//! - [`util`] - Errors, diagnostics and math types
//! - [`model`] - In-memory mesh: sub-meshes, vertices, skeleton, animation
//! - [`geom`] - Vertex packing, tangent generation, spatial partitioning
//! - [`anim`] - Animation encoding and static pose baking
//! - [`codec`] - Binary container codec
//! - [`scene`] - Scene adapter, export options, texture lookup
//! - [`pipeline`] - `import` / `export` entry points
//!
//! ## Example
//!
//! ```ignore
//! use spm::prelude::*;
//!
//! let imported = spm::pipeline::import("kart.spm", Some(Path::new("textures")))?;
//! for d in &imported.diagnostics {
//!     eprintln!("{d}");
//! }
//!
//! let scene = MeshScene::new(imported.mesh);
//! let options = ExportOptions { do_spatial_split: true, ..Default::default() };
//! spm::pipeline::export("kart_split.spm", &scene, &options, None, None)?;
//! ```

pub mod util;
pub mod model;
pub mod geom;
pub mod anim;
pub mod codec;
pub mod scene;
pub mod pipeline;

// Re-export commonly used types
pub use util::{Diagnostic, Error, Result};
pub use model::Mesh;
pub use codec::{decode, encode, EncodeOptions};
pub use pipeline::{export, import, CancelToken};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{BBox3f, Diagnostic, Error, Result, Transform};
    pub use crate::model::*;
    pub use crate::geom::PartitionConfig;
    pub use crate::scene::{ExportOptions, FsTextureResolver, MeshScene, SceneAdapter, SourceTriangle, TextureResolver, TriangleQuery};
    pub use crate::pipeline::{CancelToken, Exported, Imported};
    pub use crate::codec::{decode, encode, EncodeOptions};
}
