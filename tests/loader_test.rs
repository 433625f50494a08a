use std::{
    sync::{Arc, Mutex},
    thread::{self, ThreadId},
};

use approx::assert_abs_diff_eq;
use house_viewer::{
    ViewerError,
    data_structures::{
        mesh::{Geometry, Light, Mapping, Shading, TextureSettings, Wrapping},
        scene_graph::{Node, NodeKind},
    },
    resources::{
        AssetKind, AssetLoader, AssetSource, RequestState, Resource,
        decoder::{ExternalDecoder, MeshDecoder},
    },
};

use crate::common::test_utils::{
    TriangleDecoder, compressed_glb, glb, test_config, test_context, triangle, triangle_glb,
    write_hdr, write_png,
};

mod common;

fn loader_for(dir: &std::path::Path) -> AssetLoader {
    AssetLoader::new(AssetSource::new(dir.display().to_string()))
}

fn child<'a>(node: &'a Node, name: &str) -> &'a Node {
    node.children()
        .iter()
        .find(|child| child.name.as_deref() == Some(name))
        .unwrap_or_else(|| panic!("no child named {}", name))
}

#[tokio::test]
async fn should_decode_glb_scene_into_named_group() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("house.glb"), triangle_glb()).unwrap();
    let mut ctx = test_context(&test_config(dir.path()));

    let request = loader_for(dir.path())
        .load(AssetKind::MeshScene, "house.glb")
        .unwrap();
    let load = ctx.issue(request, |_, _| Ok(()));
    let completion = load.await;

    let root = completion.result.unwrap().into_scene().unwrap();
    assert_eq!(root.name.as_deref(), Some("house.glb"));
    assert_eq!(root.subtree_len(), 4);

    let roof = child(&root, "roof");
    assert_eq!(roof.transform.position.y, 2.0);
    let NodeKind::Mesh(mesh) = &roof.kind else {
        panic!("roof is not a mesh");
    };
    assert_eq!(mesh.geometry.positions, triangle().positions);
    assert_eq!(mesh.geometry.indices, [0, 1, 2]);
    assert_eq!(mesh.material.shading, Shading::Standard);

    let lamp = child(roof, "lamp");
    let light = &lamp.children()[0];
    match light.kind {
        NodeKind::Light(Light::Point { intensity, .. }) => assert_eq!(intensity, 3.0),
        ref other => panic!("expected a point light, got {:?}", other),
    }
}

#[tokio::test]
async fn should_attach_scene_only_through_continuation() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("house.glb"), triangle_glb()).unwrap();
    let mut ctx = test_context(&test_config(dir.path()));

    let request = loader_for(dir.path())
        .load(AssetKind::MeshScene, "house.glb")
        .unwrap();
    let id = request.id();
    let load = ctx.issue(request, |scene, resource| {
        scene.add_node(resource.into_scene()?);
        Ok(())
    });
    let completion = load.await;
    assert!(ctx.scene.is_empty());
    assert_eq!(ctx.request_state(id), Some(RequestState::Pending));

    assert_eq!(ctx.complete(completion), Some(RequestState::Attached));
    assert_eq!(ctx.scene.len(), 4);
    assert_eq!(ctx.pending_requests(), 0);
}

#[test]
fn should_refuse_compressed_load_without_decoder() {
    let dir = tempfile::tempdir().unwrap();
    let loader = loader_for(dir.path());

    assert!(!loader.has_decoder());
    let result = loader.load(AssetKind::CompressedMeshScene, "house.glb");

    assert!(matches!(
        result,
        Err(ViewerError::DecoderNotConfigured { ref path }) if path == "house.glb"
    ));
}

#[tokio::test]
async fn should_fail_draco_file_when_no_decoder_is_installed() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("walls.glb"), compressed_glb()).unwrap();
    let mut ctx = test_context(&test_config(dir.path()));

    let request = loader_for(dir.path())
        .load(AssetKind::MeshScene, "walls.glb")
        .unwrap();
    let completion = ctx.issue(request, |_, _| Ok(())).await;

    assert!(matches!(
        completion.result,
        Err(ViewerError::DecoderNotConfigured { .. })
    ));
}

#[tokio::test]
async fn should_delegate_compressed_primitives_to_decoder() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("walls.glb"), compressed_glb()).unwrap();
    let mut ctx = test_context(&test_config(dir.path()));
    let loader = loader_for(dir.path()).with_decoder(Arc::new(TriangleDecoder));

    let request = loader
        .load(AssetKind::CompressedMeshScene, "walls.glb")
        .unwrap();
    let completion = ctx.issue(request, |_, _| Ok(())).await;

    let root = completion.result.unwrap().into_scene().unwrap();
    let walls = child(&root, "walls");
    let NodeKind::Mesh(mesh) = &walls.kind else {
        panic!("walls is not a mesh");
    };
    assert_eq!(*mesh.geometry, triangle());
}

#[tokio::test]
async fn should_settle_missing_file_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = test_context(&test_config(dir.path()));

    let request = loader_for(dir.path())
        .load(AssetKind::MeshScene, "nowhere.glb")
        .unwrap();
    let id = request.id();
    let load = ctx.issue(request, |_, _| panic!("continuation must not run"));
    let completion = load.await;

    let error = completion.result.as_ref().unwrap_err();
    assert!(matches!(error, ViewerError::Io { .. }));
    assert!(error.is_load_failure());
    assert_eq!(ctx.complete(completion), Some(RequestState::Failed));
    assert_eq!(ctx.request_state(id), Some(RequestState::Failed));
}

#[tokio::test]
async fn should_reject_bytes_that_are_not_gltf() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("house.glb"), b"definitely not a model").unwrap();
    let mut ctx = test_context(&test_config(dir.path()));

    let request = loader_for(dir.path())
        .load(AssetKind::MeshScene, "house.glb")
        .unwrap();
    let completion = ctx.issue(request, |_, _| Ok(())).await;

    assert!(matches!(completion.result, Err(ViewerError::Gltf(_))));
}

#[tokio::test]
async fn should_fail_model_whose_node_points_past_meshes() {
    let dir = tempfile::tempdir().unwrap();
    let json = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "roof", "mesh": 7 }]
    }"#;
    std::fs::write(dir.path().join("house.glb"), glb(json, &[])).unwrap();
    let mut ctx = test_context(&test_config(dir.path()));

    let request = loader_for(dir.path())
        .load(AssetKind::MeshScene, "house.glb")
        .unwrap();
    let load = ctx.issue(request, |_, _| panic!("continuation must not run"));
    let completion = load.await;

    assert!(matches!(completion.result, Err(ViewerError::Gltf(_))));
    assert_eq!(ctx.complete(completion), Some(RequestState::Failed));
    assert!(ctx.scene.is_empty());
}

#[tokio::test]
async fn should_fail_model_whose_binary_chunk_is_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let full = triangle_glb();
    // drop the index bytes, the JSON still declares 42
    let json_len = u32::from_le_bytes(full[12..16].try_into().unwrap()) as usize;
    let json = std::str::from_utf8(&full[20..20 + json_len]).unwrap();
    let bin_start = 20 + json_len + 8;
    let truncated = glb(json, &full[bin_start..bin_start + 36]);
    std::fs::write(dir.path().join("house.glb"), truncated).unwrap();
    let mut ctx = test_context(&test_config(dir.path()));

    let request = loader_for(dir.path())
        .load(AssetKind::MeshScene, "house.glb")
        .unwrap();
    let completion = ctx.issue(request, |_, _| Ok(())).await;

    let error = completion.result.as_ref().unwrap_err();
    assert!(matches!(error, ViewerError::Decode { .. }));
    assert!(error.is_load_failure());
}

/// Decodes like [`TriangleDecoder`] and remembers which thread it ran on.
#[derive(Debug, Default)]
struct ThreadRecordingDecoder {
    threads: Mutex<Vec<ThreadId>>,
}

impl MeshDecoder for ThreadRecordingDecoder {
    fn decode(&self, data: &[u8]) -> house_viewer::Result<Geometry> {
        self.threads.lock().unwrap().push(thread::current().id());
        TriangleDecoder.decode(data)
    }
}

#[tokio::test]
async fn should_run_decoder_off_the_loading_thread() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("walls.glb"), compressed_glb()).unwrap();
    let mut ctx = test_context(&test_config(dir.path()));
    let decoder = Arc::new(ThreadRecordingDecoder::default());
    let loader = loader_for(dir.path()).with_decoder(decoder.clone());

    let request = loader
        .load(AssetKind::CompressedMeshScene, "walls.glb")
        .unwrap();
    let completion = ctx.issue(request, |_, _| Ok(())).await;

    assert!(completion.result.is_ok());
    let threads = decoder.threads.lock().unwrap();
    assert_eq!(threads.len(), 1);
    assert_ne!(threads[0], thread::current().id());
}

#[tokio::test]
async fn should_decode_texture_with_its_settings() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("land.png"), 4, 2);
    let mut ctx = test_context(&test_config(dir.path()));
    let settings = TextureSettings {
        wrap: Wrapping::Repeat,
        repeat: [10.0, 10.0],
        anisotropy: 16,
        srgb: true,
    };

    let request = loader_for(dir.path())
        .load(AssetKind::Texture(settings), "land.png")
        .unwrap();
    let completion = ctx.issue(request, |_, _| Ok(())).await;

    let texture = completion.result.unwrap().into_texture().unwrap();
    assert_eq!(texture.image.dimensions(), (4, 2));
    assert_eq!(texture.settings, settings);
    assert_eq!(texture.label, "land.png");
}

#[tokio::test]
async fn should_decode_hdr_environment_to_float_rgba() {
    let dir = tempfile::tempdir().unwrap();
    write_hdr(&dir.path().join("sky.hdr"), 8, 4);
    let mut ctx = test_context(&test_config(dir.path()));

    let request = loader_for(dir.path())
        .load(AssetKind::Environment, "sky.hdr")
        .unwrap();
    let completion = ctx.issue(request, |_, _| Ok(())).await;

    let map = completion.result.unwrap().into_environment().unwrap();
    assert_eq!(map.image.dimensions(), (8, 4));
    assert_eq!(map.mapping, Mapping::Uv);
    let pixel = map.image.get_pixel(3, 2);
    assert_abs_diff_eq!(pixel[0], 1.5, epsilon = 0.02);
    assert_abs_diff_eq!(pixel[1], 0.75, epsilon = 0.02);
    assert_abs_diff_eq!(pixel[2], 0.25, epsilon = 0.02);
    assert_eq!(pixel[3], 1.0);
}

#[tokio::test]
async fn should_fail_request_when_continuation_gets_wrong_resource() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("land.png"), 2, 2);
    let mut ctx = test_context(&test_config(dir.path()));

    let request = loader_for(dir.path())
        .load(AssetKind::Texture(TextureSettings::default()), "land.png")
        .unwrap();
    let load = ctx.issue(request, |scene, resource: Resource| {
        scene.add_node(resource.into_scene()?);
        Ok(())
    });
    let completion = load.await;

    assert_eq!(ctx.complete(completion), Some(RequestState::Failed));
    assert!(ctx.scene.is_empty());
}

#[test]
fn should_number_requests_uniquely() {
    let dir = tempfile::tempdir().unwrap();
    let loader = loader_for(dir.path());

    let first = loader.load(AssetKind::MeshScene, "a.glb").unwrap();
    let second = loader.load(AssetKind::Environment, "b.hdr").unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(second.path(), "b.hdr");
    assert_eq!(second.kind(), AssetKind::Environment);
}

#[test]
fn should_install_external_decoder_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    assert!(AssetLoader::from_config(&config).has_decoder());

    let mut without = config.clone();
    without.decoder.path = None;
    assert!(!AssetLoader::from_config(&without).has_decoder());
}

#[test]
fn should_report_missing_decoder_program() {
    let dir = tempfile::tempdir().unwrap();
    let decoder = ExternalDecoder::new(dir.path());

    let result = decoder.decode(&[1, 2, 3, 4]);

    assert!(matches!(result, Err(ViewerError::Io { .. })));
    assert!(decoder.program().ends_with(ExternalDecoder::PROGRAM));
}
