//! Integration tests for export and import through the filesystem.

use std::fs;
use std::path::Path;

use smallvec::smallvec;
use spm::model::*;
use spm::pipeline::{self, needs_overwrite_confirmation, CancelToken};
use spm::scene::{ExportOptions, MeshScene};
use spm::util::{Transform, Vec2, Vec3};
use spm::{Diagnostic, Error};

use tempfile::tempdir;

fn skinned_quad(material: usize, offset: f32) -> SubMesh {
    let mut sm = SubMesh::new(material, VertexAttributes::NORMAL | VertexAttributes::UV | VertexAttributes::SKIN);
    sm.vertices = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
        .into_iter()
        .map(|(x, y)| Vertex {
            normal: Vec3::Z,
            uv: Vec2::new(x, y),
            joints: smallvec![JointWeight::new(0, 1.0)],
            ..Vertex::new(Vec3::new(x + offset, y, 0.0))
        })
        .collect();
    sm.indices = vec![0, 1, 2, 0, 2, 3];
    sm
}

/// Two textured quads on a single animated root joint.
fn kart() -> Mesh {
    let skeleton = Skeleton::new(vec![Joint::new("root", None, Transform::IDENTITY)]).expect("skeleton");
    let track = AnimationTrack::new(
        0,
        vec![
            Keyframe::new(0.0, Transform::from_translation(Vec3::new(0.0, 0.0, 2.0))),
            Keyframe::new(10.0, Transform::from_translation(Vec3::new(0.0, 0.0, 4.0))),
        ],
    )
    .expect("track");
    Mesh {
        materials: vec![Material::new("body.png", 0), Material::new("decal.png", 0)],
        sub_meshes: vec![skinned_quad(0, 0.0), skinned_quad(1, 3.0)],
        skeleton: Some(skeleton),
        animation: Some(Animation::new((0, 10), vec![track])),
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read_dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_export_then_import() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("body.png"), b"png").expect("texture");
    let path = dir.path().join("kart.spm");

    let scene = MeshScene::new(kart());
    let exported = pipeline::export(&path, &scene, &ExportOptions::default(), None, None).expect("export");
    assert_eq!(exported.mesh.sub_meshes.len(), 2);
    assert!(exported.mesh.skeleton.is_some());
    assert_eq!(exported.mesh.animation.as_ref().map(|a| a.num_keys()), Some(2));
    for sm in &exported.mesh.sub_meshes {
        assert!(sm.attributes.contains(VertexAttributes::TANGENT | VertexAttributes::SKIN));
        assert_eq!(sm.num_vertices(), 4);
    }

    // decal.png is not next to the file
    assert_eq!(exported.diagnostics.len(), 1);
    assert!(matches!(
        &exported.diagnostics[0],
        Diagnostic::MissingTexture { material: 1, texture, .. } if texture == "decal.png"
    ));
    assert_eq!(fs::read(&path).expect("read back"), exported.bytes);

    let extra = tempdir().expect("tempdir");
    let nested = extra.path().join("decals");
    fs::create_dir_all(&nested).expect("mkdir");
    fs::write(nested.join("DECAL.png"), b"png").expect("texture");

    let imported = pipeline::import(&path, Some(extra.path())).expect("import");
    assert_eq!(imported.mesh, exported.mesh);
    assert!(imported.diagnostics.is_empty(), "{:?}", imported.diagnostics);
    assert_eq!(imported.textures[0].as_deref(), Some(dir.path().join("body.png").as_path()));
    assert_eq!(imported.textures[1].as_deref(), Some(nested.join("DECAL.png").as_path()));

    let without_extra = pipeline::import(&path, None).expect("import");
    assert_eq!(without_extra.textures[1], None);
    assert_eq!(without_extra.diagnostics.len(), 1);
}

#[test]
fn test_static_bake_at_frame() {
    let options = ExportOptions { static_mesh_frame: 10, ..Default::default() };
    let exported = pipeline::export_scene(&MeshScene::new(kart()), &options, None, None).expect("export");

    assert!(exported.mesh.skeleton.is_none());
    assert!(exported.mesh.animation.is_none());
    for sm in &exported.mesh.sub_meshes {
        assert!(!sm.attributes.contains(VertexAttributes::SKIN));
        for v in &sm.vertices {
            assert!((v.position.z - 4.0).abs() < 1e-5, "z = {}", v.position.z);
            assert!(v.joints.is_empty());
        }
    }
    assert_eq!(spm::decode(&exported.bytes).expect("decode"), exported.mesh);
}

#[test]
fn test_failed_export_leaves_file_untouched() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("kart.spm");
    fs::write(&path, b"previous").expect("seed");
    let scene = MeshScene::new(kart());

    let token = CancelToken::new();
    token.cancel();
    let err = pipeline::export(&path, &scene, &ExportOptions::default(), None, Some(&token)).unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    let bad_step = ExportOptions { keyframes_only: false, resample_step: 0.0, ..Default::default() };
    let err = pipeline::export(&path, &scene, &bad_step, None, None).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{err}");

    assert_eq!(fs::read(&path).expect("read"), b"previous");
    assert_eq!(file_names(dir.path()), vec!["kart.spm".to_string()]);
}

#[test]
fn test_resampled_animation() {
    let options = ExportOptions { keyframes_only: false, resample_step: 2.5, ..Default::default() };
    let exported = pipeline::export_scene(&MeshScene::new(kart()), &options, None, None).expect("export");
    let animation = exported.mesh.animation.expect("animation");
    let times: Vec<f32> = animation.tracks[0].keys().iter().map(|k| k.time).collect();
    assert_eq!(times, vec![0.0, 2.5, 5.0, 7.5, 10.0]);
    let mid = &animation.tracks[0].keys()[2].transform;
    assert!((mid.translation.z - 3.0).abs() < 1e-5);
}

#[test]
fn test_convert_with_spatial_split() {
    // 8 x 8 grid of unit quads in one sub-mesh
    let mut sm = SubMesh::new(0, VertexAttributes::NORMAL | VertexAttributes::UV);
    for y in 0..=8 {
        for x in 0..=8 {
            let p = Vec3::new(x as f32, y as f32, 0.0);
            sm.vertices.push(Vertex { normal: Vec3::Z, uv: Vec2::new(p.x / 8.0, p.y / 8.0), ..Vertex::new(p) });
        }
    }
    for y in 0..8u32 {
        for x in 0..8u32 {
            let i = y * 9 + x;
            sm.indices.extend([i, i + 1, i + 10, i, i + 10, i + 9]);
        }
    }
    let mesh = Mesh { materials: vec![Material::new("", 0)], sub_meshes: vec![sm], ..Default::default() };

    let dir = tempdir().expect("tempdir");
    let options_path = dir.path().join("options.json");
    fs::write(&options_path, r#"{ "do_spatial_split": true, "partition": { "cell_size": 2.0 } }"#).expect("options");
    let options = ExportOptions::load(&options_path).expect("load options");
    assert!(options.export_normal);

    let path = dir.path().join("grid.spm");
    let exported = pipeline::export(&path, &MeshScene::new(mesh), &options, None, None).expect("export");
    assert_eq!(exported.mesh.sub_meshes.len(), 16);
    assert_eq!(exported.mesh.num_triangles(), 128);
    assert!(exported.diagnostics.is_empty(), "{:?}", exported.diagnostics);
    for sm in &exported.mesh.sub_meshes {
        let size = sm.bounds().size();
        assert!(size.x <= 2.0 + 1e-4 && size.y <= 2.0 + 1e-4, "{size:?}");
    }

    assert!(needs_overwrite_confirmation(&path, &options, None));
    let selection = vec![MeshScene::object_name(0)];
    assert!(!needs_overwrite_confirmation(&path, &options, Some(&selection)));
    let forced = ExportOptions { overwrite_without_asking: true, ..options };
    assert!(!needs_overwrite_confirmation(&path, &forced, None));
}
