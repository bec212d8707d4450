//! Scene access for export and texture lookup for import.
//!
//! The exporter never talks to an editor directly. It pulls triangles,
//! materials, the skeleton and per-joint keyframes through [`SceneAdapter`],
//! and resolves texture files through [`TextureResolver`].

mod mesh_scene;
mod options;
mod textures;

pub use mesh_scene::*;
pub use options::*;
pub use textures::*;

use crate::model::{Keyframe, Material, Skeleton, Vertex, VertexAttributes};

/// What the exporter asks the scene for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriangleQuery {
    /// Keep object-local coordinates instead of world space.
    pub local_space: bool,
    /// Evaluate modifiers before triangulating.
    pub apply_modifiers: bool,
    /// Object names to export, `None` for everything.
    pub selection: Option<Vec<String>>,
}

impl TriangleQuery {
    /// Whether an object named `name` is part of the query.
    pub fn selects(&self, name: &str) -> bool {
        self.selection.as_ref().map_or(true, |names| names.iter().any(|n| n == name))
    }
}

/// One triangle as delivered by the scene, corners in winding order.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceTriangle {
    pub material: usize,
    /// Attributes the source actually provides for these corners.
    pub attributes: VertexAttributes,
    pub corners: [Vertex; 3],
}

/// Read-only view of an editor scene.
pub trait SceneAdapter: Sync {
    /// Triangulated geometry matching `query`.
    fn triangles(&self, query: &TriangleQuery) -> Vec<SourceTriangle>;

    fn materials(&self) -> Vec<Material>;

    /// Armature driving the skinned corners, if any.
    fn skeleton(&self) -> Option<Skeleton>;

    /// Authored keyframes of joint `joint`; empty when it is not animated.
    fn animation(&self, joint: usize) -> Vec<Keyframe>;

    /// Inclusive scene frame range.
    fn frame_range(&self) -> (i32, i32);

    /// Names of the objects currently selected in the editor.
    fn selected(&self) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_selection() {
        let all = TriangleQuery::default();
        assert!(all.selects("anything"));

        let some = TriangleQuery { selection: Some(vec!["kart".into()]), ..Default::default() };
        assert!(some.selects("kart"));
        assert!(!some.selects("wheel"));

        let none = TriangleQuery { selection: Some(Vec::new()), ..Default::default() };
        assert!(!none.selects("kart"));
    }
}
