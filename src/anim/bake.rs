//! Static mesh bake.
//!
//! Resolves skinning once at a fixed frame: every skinned vertex is moved to
//! its posed position and the joint influences are dropped, so the exported
//! mesh needs neither skeleton nor animation.

use crate::model::{AnimationTrack, Skeleton, Vertex};
use crate::util::{Error, Frame, Mat3, Mat4, Result, Transform, Vec3};

/// Per-joint skinning matrices for one pose.
#[derive(Clone, Debug)]
pub struct SkinPose {
    positions: Vec<Mat4>,
    normals: Vec<Mat3>,
}

impl SkinPose {
    /// Sample `tracks` at `frame` and build `world_pose * inverse(world_bind)`
    /// for every joint. Joints with an empty or missing track use their bind
    /// pose.
    pub fn sample(skeleton: &Skeleton, tracks: &[AnimationTrack], frame: Frame) -> Result<Self> {
        skeleton.check_finite()?;
        let pose: Vec<Transform> = skeleton
            .joints()
            .iter()
            .enumerate()
            .map(|(j, joint)| tracks.get(j).and_then(|t| t.sample(frame)).unwrap_or(joint.bind))
            .collect();
        if let Some(joint) = pose.iter().position(|t| !t.is_finite()) {
            return Err(Error::NonFiniteTransform { joint, time: Some(frame) });
        }

        let world_pose = skeleton.world_matrices(&pose);
        let world_bind = skeleton.bind_world_matrices();

        let mut positions = Vec::with_capacity(skeleton.len());
        let mut normals = Vec::with_capacity(skeleton.len());
        for (joint, (posed, bind)) in world_pose.iter().zip(&world_bind).enumerate() {
            let skin = *posed * bind.inverse();
            if !skin.is_finite() {
                return Err(Error::NonFiniteTransform { joint, time: Some(frame) });
            }
            // Degenerate (zero-scale) joints flatten normals to zero; the
            // bake renormalizes and falls back to the rest normal.
            let normal = Mat3::from_mat4(skin).inverse().transpose();
            normals.push(if normal.is_finite() { normal } else { Mat3::ZERO });
            positions.push(skin);
        }
        Ok(Self { positions, normals })
    }

    pub fn num_joints(&self) -> usize {
        self.positions.len()
    }

    /// Apply the pose to one vertex and strip its influences.
    pub fn bake_vertex(&self, vertex: &mut Vertex) {
        if vertex.joints.is_empty() {
            return;
        }
        let mut position = Vec3::ZERO;
        let mut normal = Vec3::ZERO;
        for jw in &vertex.joints {
            let j = jw.joint as usize;
            position += self.positions[j].transform_point3(vertex.position) * jw.weight;
            normal += (self.normals[j] * vertex.normal) * jw.weight;
        }
        vertex.position = position;
        let normal = normal.normalize_or_zero();
        if normal != Vec3::ZERO {
            vertex.normal = normal;
        }
        vertex.joints.clear();
    }
}
