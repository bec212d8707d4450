//! Import and export entry points.
//!
//! Export pulls everything from a [`SceneAdapter`], optionally bakes a
//! static pose, packs one sub-mesh per (material, layout) group, generates
//! tangents, optionally splits each group spatially, encodes animation and
//! finally the container. The per-group work runs on the rayon pool; the
//! groups are assembled in a fixed order afterwards, so output does not
//! depend on scheduling.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::anim::{encode_animation, SkinPose};
use crate::geom::{apply_tangents, split_sub_mesh, VertexPacker};
use crate::model::{AnimationTrack, Material, Mesh, Skeleton, SubMesh, VertexAttributes, VertexKey};
use crate::scene::{ExportOptions, FsTextureResolver, SceneAdapter, SourceTriangle, TextureResolver, TriangleQuery};
use crate::codec::{self, EncodeOptions};
use crate::util::{Diagnostic, Diagnostics, Error, Result, Vec3};

// ============================================================================
// Cancellation
// ============================================================================

/// Shared cancellation flag, checked between pipeline stages.
///
/// Clones share the flag; cancelling any clone cancels them all.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// `Err(Error::Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn checkpoint(cancel: Option<&CancelToken>, stage: &str) -> Result<()> {
    if let Some(token) = cancel {
        token.check().inspect_err(|_| tracing::info!(stage, "export cancelled"))?;
    }
    Ok(())
}

// ============================================================================
// Export
// ============================================================================

/// Result of a successful export.
#[derive(Debug)]
pub struct Exported {
    pub mesh: Mesh,
    /// Complete file image.
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Whether exporting to `path` should ask the user before overwriting.
///
/// Exports with an explicit object list never ask.
pub fn needs_overwrite_confirmation(path: impl AsRef<Path>, options: &ExportOptions, selection: Option<&[String]>) -> bool {
    selection.is_none() && !options.overwrite_without_asking && path.as_ref().exists()
}

/// Build the mesh described by `scene` and encode it in memory.
///
/// `selection` is an explicit object list and takes precedence over
/// `options.export_selected_only`.
#[tracing::instrument(skip_all, fields(static_frame = options.static_mesh_frame, split = options.do_spatial_split))]
pub fn export_scene(
    scene: &dyn SceneAdapter,
    options: &ExportOptions,
    selection: Option<&[String]>,
    cancel: Option<&CancelToken>,
) -> Result<Exported> {
    let diagnostics = Diagnostics::new();
    let mesh = build_mesh(scene, options, selection, cancel, &diagnostics)?;

    checkpoint(cancel, "encode")?;
    let bytes = codec::encode(&mesh, &EncodeOptions { compression_level: options.compression_level })?;
    tracing::info!(
        sub_meshes = mesh.sub_meshes.len(),
        vertices = mesh.num_vertices(),
        triangles = mesh.num_triangles(),
        bytes = bytes.len(),
        "scene exported"
    );
    Ok(Exported { mesh, bytes, diagnostics: diagnostics.into_vec() })
}

/// Export `scene` to `path`.
///
/// Texture names are checked against the destination directory and
/// reported as [`Diagnostic::MissingTexture`]. The file is written through a
/// temporary sibling, so a failed export leaves `path` untouched.
pub fn export(
    path: impl AsRef<Path>,
    scene: &dyn SceneAdapter,
    options: &ExportOptions,
    selection: Option<&[String]>,
    cancel: Option<&CancelToken>,
) -> Result<Exported> {
    let path = path.as_ref();
    let mut exported = export_scene(scene, options, selection, cancel)?;

    let resolver = FsTextureResolver::for_model(path);
    let (_, missing) = resolve_textures(&exported.mesh.materials, &resolver, None);
    for d in &missing {
        tracing::warn!(kind = d.kind(), "{d}");
    }
    exported.diagnostics.extend(missing);

    checkpoint(cancel, "write")?;
    codec::write_file(path, &exported.bytes)?;
    tracing::info!(path = %path.display(), "wrote SPM file");
    Ok(exported)
}

fn build_mesh(
    scene: &dyn SceneAdapter,
    options: &ExportOptions,
    selection: Option<&[String]>,
    cancel: Option<&CancelToken>,
    diagnostics: &Diagnostics,
) -> Result<Mesh> {
    checkpoint(cancel, "collect")?;
    let query = TriangleQuery {
        local_space: options.local_space,
        apply_modifiers: options.apply_modifiers,
        selection: match selection {
            Some(names) => Some(names.to_vec()),
            None if options.export_selected_only => Some(scene.selected()),
            None => None,
        },
    };
    let mut triangles = scene.triangles(&query);
    let materials = scene.materials();
    let skeleton = scene.skeleton().filter(|s| !s.is_empty());
    tracing::debug!(
        triangles = triangles.len(),
        materials = materials.len(),
        joints = skeleton.as_ref().map_or(0, Skeleton::len),
        "scene collected"
    );
    check_triangles(&triangles, &materials, skeleton.as_ref())?;

    let tracks = match &skeleton {
        Some(sk) => {
            sk.check_finite()?;
            (0..sk.len())
                .map(|j| AnimationTrack::new(j, scene.animation(j)))
                .collect::<Result<Vec<_>>>()?
        }
        None => Vec::new(),
    };

    // Static bake: skinning is resolved once and the armature dropped
    let mut skeleton = skeleton;
    if let (Some(frame), Some(sk)) = (options.static_frame(), &skeleton) {
        checkpoint(cancel, "bake")?;
        let pose = SkinPose::sample(sk, &tracks, frame)?;
        triangles
            .par_iter_mut()
            .filter(|tri| tri.attributes.contains(VertexAttributes::SKIN))
            .for_each(|tri| {
                for corner in &mut tri.corners {
                    corner.normalize_influences();
                    pose.bake_vertex(corner);
                }
                tri.attributes.remove(VertexAttributes::SKIN);
            });
        tracing::debug!(frame, "static pose baked");
        skeleton = None;
    }

    checkpoint(cancel, "pack")?;
    let sub_meshes = build_sub_meshes(&triangles, options, skeleton.is_some(), diagnostics);

    checkpoint(cancel, "animation")?;
    let animation = match &skeleton {
        Some(sk) => Some(encode_animation(sk, tracks, scene.frame_range(), options.sample_mode())?),
        None => None,
    };

    Ok(Mesh { materials, sub_meshes, skeleton, animation })
}

/// Reject adapter data that would break a model invariant later.
fn check_triangles(triangles: &[SourceTriangle], materials: &[Material], skeleton: Option<&Skeleton>) -> Result<()> {
    let num_joints = skeleton.map_or(0, Skeleton::len);
    for (t, tri) in triangles.iter().enumerate() {
        if tri.material >= materials.len() {
            return Err(Error::invalid_input(format!(
                "triangle {t} references material {} of {}",
                tri.material,
                materials.len()
            )));
        }
        if !tri.attributes.contains(VertexAttributes::SKIN) || num_joints == 0 {
            continue;
        }
        for corner in &tri.corners {
            if let Some(jw) = corner.joints.iter().find(|jw| jw.joint as usize >= num_joints) {
                return Err(Error::invalid_input(format!(
                    "triangle {t} references joint {} of {num_joints}",
                    jw.joint
                )));
            }
        }
    }
    Ok(())
}

/// Vertex layout of a triangle once export options are applied.
fn export_attributes(tri: &SourceTriangle, options: &ExportOptions, skinned: bool) -> VertexAttributes {
    let mut attrs = tri.attributes & options.requested_attributes();
    if !skinned {
        attrs.remove(VertexAttributes::SKIN);
    }
    attrs
}

/// One packed (and possibly split) material group.
struct GroupOutput {
    pieces: Vec<SubMesh>,
    /// Per piece, indices of vertices that got a fallback tangent.
    degenerate: Vec<Vec<usize>>,
}

fn build_sub_meshes(
    triangles: &[SourceTriangle],
    options: &ExportOptions,
    skinned: bool,
    diagnostics: &Diagnostics,
) -> Vec<SubMesh> {
    let mut groups: BTreeMap<(usize, u8), Vec<&SourceTriangle>> = BTreeMap::new();
    for tri in triangles {
        let attrs = export_attributes(tri, options, skinned);
        groups.entry((tri.material, attrs.bits())).or_default().push(tri);
    }

    let outputs: Vec<GroupOutput> = groups
        .into_par_iter()
        .map(|((material, bits), tris)| {
            let attrs = VertexAttributes::from_bits_truncate(bits);
            build_group(material, attrs, &tris, options)
        })
        .collect();

    let mut sub_meshes = Vec::new();
    for output in outputs {
        for (piece, degenerate) in output.pieces.into_iter().zip(output.degenerate) {
            let index = sub_meshes.len();
            diagnostics.extend(
                degenerate
                    .into_iter()
                    .map(|vertex| Diagnostic::DegenerateTangentBasis { sub_mesh: index, vertex }),
            );
            sub_meshes.push(piece);
        }
    }
    sub_meshes
}

fn build_group(material: usize, attrs: VertexAttributes, tris: &[&SourceTriangle], options: &ExportOptions) -> GroupOutput {
    let mut packer = VertexPacker::with_capacity(attrs, tris.len() * 3);
    for tri in tris {
        let corners = tri.corners.clone().map(|mut c| {
            c.normalize_influences();
            if attrs.contains(VertexAttributes::NORMAL) {
                // adapters may hand over scaled or zero normals
                c.normal = c.normal.normalize_or(Vec3::Z);
            }
            c
        });
        packer.push_triangle([&corners[0], &corners[1], &corners[2]]);
    }
    let mut sub_mesh = packer.finish(material);

    let mut degenerate = Vec::new();
    if options.export_tangent {
        degenerate = apply_tangents(&mut sub_mesh);
    }

    if !options.do_spatial_split {
        return GroupOutput { pieces: vec![sub_mesh], degenerate: vec![degenerate] };
    }

    let pieces = split_sub_mesh(&sub_mesh, &options.partition);
    // Splitting renumbers vertices; find the fallback ones again by identity.
    let degenerate = if degenerate.is_empty() {
        vec![Vec::new(); pieces.len()]
    } else {
        let keys: HashSet<VertexKey> =
            degenerate.iter().map(|&v| sub_mesh.vertices[v].key(sub_mesh.attributes)).collect();
        pieces
            .iter()
            .map(|piece| {
                piece
                    .vertices
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| keys.contains(&v.key(piece.attributes)))
                    .map(|(i, _)| i)
                    .collect()
            })
            .collect()
    };
    GroupOutput { pieces, degenerate }
}

// ============================================================================
// Import
// ============================================================================

/// Result of a successful import.
#[derive(Debug)]
pub struct Imported {
    pub mesh: Mesh,
    /// Resolved texture file per material, `None` when not found.
    pub textures: Vec<Option<PathBuf>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Read the SPM file at `path` and resolve its textures next to it, then
/// under `extra_tex_path`.
pub fn import(path: impl AsRef<Path>, extra_tex_path: Option<&Path>) -> Result<Imported> {
    let path = path.as_ref();
    import_with(path, extra_tex_path, &FsTextureResolver::for_model(path))
}

/// [`import`] with a custom texture resolver.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn import_with(path: &Path, extra_tex_path: Option<&Path>, resolver: &dyn TextureResolver) -> Result<Imported> {
    let mesh = codec::read_file(path)?;
    let diagnostics = Diagnostics::new();
    let (textures, missing) = resolve_textures(&mesh.materials, resolver, extra_tex_path);
    diagnostics.extend(missing);
    tracing::info!(
        sub_meshes = mesh.sub_meshes.len(),
        textures = textures.iter().flatten().count(),
        "SPM file imported"
    );
    Ok(Imported { mesh, textures, diagnostics: diagnostics.into_vec() })
}

/// Resolve every material texture in parallel. Materials without a texture
/// name resolve to `None` silently.
fn resolve_textures(
    materials: &[Material],
    resolver: &dyn TextureResolver,
    extra_root: Option<&Path>,
) -> (Vec<Option<PathBuf>>, Vec<Diagnostic>) {
    let resolved: Vec<Option<PathBuf>> = materials
        .par_iter()
        .map(|m| resolver.resolve(&m.texture, extra_root))
        .collect();

    let missing = materials
        .iter()
        .zip(&resolved)
        .enumerate()
        .filter(|(_, (m, found))| found.is_none() && !m.texture.is_empty())
        .map(|(material, (m, _))| Diagnostic::MissingTexture {
            material,
            texture: m.texture.clone(),
            searched: resolver.search_roots(extra_root),
        })
        .collect();
    (resolved, missing)
}
