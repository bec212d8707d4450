//! Skeletal animation processing.
//!
//! - [`encode_animation`] - authored tracks to stored keyframe tracks
//! - [`SkinPose`] - one sampled pose, used to bake skinning into static meshes

mod bake;
mod encoder;

pub use bake::*;
pub use encoder::*;
