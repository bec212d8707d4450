//! Export settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::anim::SampleMode;
use crate::geom::PartitionConfig;
use crate::model::VertexAttributes;
use crate::util::{Error, Frame, Result};

/// Options controlling one export. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    // Scene query
    pub export_selected_only: bool,
    pub local_space: bool,
    pub apply_modifiers: bool,

    // Animation
    pub keyframes_only: bool,
    /// Frame step used when `keyframes_only` is off.
    pub resample_step: Frame,
    /// Bake skinning at this frame and drop the skeleton; negative disables.
    pub static_mesh_frame: i32,

    // Vertex layout
    pub export_normal: bool,
    pub export_vcolor: bool,
    pub export_tangent: bool,

    // Space partitioning
    pub do_spatial_split: bool,
    pub partition: PartitionConfig,

    // Output
    /// zlib level for the file body, 0 = stored.
    pub compression_level: u32,
    pub overwrite_without_asking: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            export_selected_only: false,
            local_space: false,
            apply_modifiers: true,
            keyframes_only: true,
            resample_step: 1.0,
            static_mesh_frame: -1,
            export_normal: true,
            export_vcolor: true,
            export_tangent: true,
            do_spatial_split: false,
            partition: PartitionConfig::default(),
            compression_level: 0,
            overwrite_without_asking: false,
        }
    }
}

impl ExportOptions {
    /// Load options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| match e {
            Error::InvalidInput(msg) => Error::InvalidInput(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::invalid_input(format!("export options: {e}")))
    }

    pub fn to_json(&self) -> String {
        // plain data, serialization cannot fail
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Frame to bake a static mesh at, if any.
    pub fn static_frame(&self) -> Option<Frame> {
        (self.static_mesh_frame >= 0).then_some(self.static_mesh_frame as Frame)
    }

    pub fn sample_mode(&self) -> SampleMode {
        if self.keyframes_only {
            SampleMode::KeyframesOnly
        } else {
            SampleMode::Resample { step: self.resample_step }
        }
    }

    /// Attributes requested for sub-meshes that can carry them.
    ///
    /// UVs are always exported when the source has them. Tangents are added
    /// after packing and are therefore not part of this mask.
    pub fn requested_attributes(&self) -> VertexAttributes {
        let mut attrs = VertexAttributes::UV | VertexAttributes::SKIN;
        attrs.set(VertexAttributes::NORMAL, self.export_normal);
        attrs.set(VertexAttributes::COLOR, self.export_vcolor);
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = ExportOptions::default();
        assert!(!o.export_selected_only);
        assert!(!o.local_space);
        assert!(o.apply_modifiers);
        assert!(o.keyframes_only);
        assert!(o.export_normal && o.export_vcolor && o.export_tangent);
        assert_eq!(o.static_mesh_frame, -1);
        assert_eq!(o.static_frame(), None);
        assert!(!o.do_spatial_split);
        assert_eq!(o.sample_mode(), SampleMode::KeyframesOnly);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let o = ExportOptions::from_json(r#"{ "static_mesh_frame": 12, "partition": { "cell_size": 50.0 } }"#).unwrap();
        assert_eq!(o.static_frame(), Some(12.0));
        assert_eq!(o.partition.cell_size, Some(50.0));
        assert_eq!(o.partition.target_triangles_per_cell, 1024);
        assert!(o.export_normal);
    }

    #[test]
    fn test_json_round_trip() {
        let o = ExportOptions { keyframes_only: false, resample_step: 2.0, ..Default::default() };
        assert_eq!(ExportOptions::from_json(&o.to_json()).unwrap(), o);
        assert_eq!(o.sample_mode(), SampleMode::Resample { step: 2.0 });
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(ExportOptions::from_json("{ nope"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_requested_attributes() {
        let o = ExportOptions { export_vcolor: false, ..Default::default() };
        let attrs = o.requested_attributes();
        assert!(attrs.contains(VertexAttributes::NORMAL | VertexAttributes::UV));
        assert!(!attrs.contains(VertexAttributes::COLOR));
        assert!(!attrs.contains(VertexAttributes::TANGENT));
    }
}
