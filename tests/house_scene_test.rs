use std::{f32::consts::FRAC_PI_2, sync::Arc};

use approx::assert_abs_diff_eq;
use house_viewer::{
    ViewerContext, ViewerError,
    data_structures::{
        color::Color,
        mesh::{Mapping, Shading, Wrapping},
        scene_graph::{Node, NodeKind},
        transform::Transform,
    },
    frame::FrameLoop,
    house::{self, GROUND_NAME},
    resources::{AssetLoader, AssetSource, LoadCompletion, RequestState, Resource},
    viewport::Viewport,
};

use crate::common::test_utils::{
    MODEL, RecordingBackend, TriangleDecoder, compressed_glb, settle, test_config, test_context,
    write_house_assets,
};

mod common;

fn find<'a>(ctx: &'a ViewerContext, name: &str) -> Option<&'a Node> {
    ctx.scene
        .roots()
        .iter()
        .find(|node| node.name.as_deref() == Some(name))
}

fn node_ids(ctx: &ViewerContext) -> Vec<u32> {
    let mut ids = Vec::new();
    ctx.scene.traverse_ref(&mut |node| ids.push(node.id()));
    ids
}

#[test]
fn should_build_static_part_synchronously() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let mut ctx = test_context(&config);

    let pending = house::assemble(&mut ctx, &config).unwrap();

    assert_eq!(pending.len(), 3);
    assert_eq!(ctx.pending_requests(), 3);
    assert_eq!(ctx.scene.len(), 3);

    let environment = ctx.scene.environment();
    assert_eq!(environment.background, Color::from_hex(0x333333));
    let fog = environment.fog.unwrap();
    assert_eq!((fog.near, fog.far), (10.0, 20.0));
    let ambient = environment.ambient.unwrap();
    assert_eq!(ambient.intensity, 0.4);
    assert!(environment.reflection().is_none());

    let ground = find(&ctx, GROUND_NAME).unwrap();
    assert!(ground.receive_shadow);
    assert!(!ground.cast_shadow);
    let mut flat = Transform::new();
    flat.set_euler(-FRAC_PI_2, 0.0, 0.0);
    assert_eq!(ground.transform, flat);
    let NodeKind::Mesh(mesh) = &ground.kind else {
        panic!("ground is not a mesh");
    };
    assert_eq!(mesh.material.shading, Shading::Lambert);
    assert_eq!(mesh.material.color, Color::from_hsl(0.095, 1.0, 0.75));
    assert!(mesh.material.map.is_none());

    assert!(find(&ctx, "sun").unwrap().is_light());
    assert_eq!(find(&ctx, "sky").unwrap().transform.position.y, 50.0);
}

#[tokio::test]
async fn should_complete_scene_when_loads_resolve() {
    let dir = tempfile::tempdir().unwrap();
    write_house_assets(dir.path());
    let config = test_config(dir.path());
    let mut ctx = test_context(&config);

    let pending = house::assemble(&mut ctx, &config).unwrap();
    let states = settle(&mut ctx, pending).await;

    assert!(states.iter().all(|state| *state == Some(RequestState::Attached)));
    assert_eq!(ctx.pending_requests(), 0);
    assert_eq!(ctx.scene.len(), 3 + 4);

    let reflection = ctx.scene.environment().reflection().unwrap();
    assert_eq!(reflection.mapping, Mapping::EquirectangularReflection);

    let ground = find(&ctx, GROUND_NAME).unwrap();
    let NodeKind::Mesh(mesh) = &ground.kind else {
        panic!("ground is not a mesh");
    };
    let map = mesh.material.map.as_ref().expect("ground texture attached");
    assert_eq!(map.settings.wrap, Wrapping::Repeat);
    assert_eq!(map.settings.repeat, [10_000.0, 10_000.0]);
    assert_eq!(map.settings.anisotropy, 16);
    assert!(map.settings.srgb);
    assert_eq!(mesh.material.shading, Shading::Lambert);
}

#[tokio::test]
async fn should_place_model_and_enable_shadows() {
    let dir = tempfile::tempdir().unwrap();
    write_house_assets(dir.path());
    let config = test_config(dir.path());
    let mut ctx = test_context(&config);

    let pending = house::assemble(&mut ctx, &config).unwrap();
    settle(&mut ctx, pending).await;

    let model = find(&ctx, MODEL).expect("model attached");
    assert_abs_diff_eq!(model.transform.scale.x, 0.1);
    assert_abs_diff_eq!(model.transform.position.y, -0.04);
    // the configured angles are used as radians
    let mut rotated = Transform::new();
    rotated.set_euler(0.0, -90.0, 0.0);
    assert_eq!(model.transform.rotation, rotated.rotation);

    let mut flags = Vec::new();
    model.traverse_ref(&mut |node| {
        if node.is_mesh() || node.is_light() {
            flags.push((node.cast_shadow, node.receive_shadow));
        }
    });
    assert_eq!(flags, [(true, true), (true, true)]);
}

#[tokio::test]
async fn should_leave_nodes_unchanged_when_model_load_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_house_assets(dir.path());
    std::fs::remove_file(dir.path().join(MODEL)).unwrap();
    let config = test_config(dir.path());
    let mut ctx = test_context(&config);

    let pending = house::assemble(&mut ctx, &config).unwrap();
    let before = node_ids(&ctx);
    let states = settle(&mut ctx, pending).await;

    assert_eq!(states[2], Some(RequestState::Failed));
    assert_eq!(node_ids(&ctx), before);
    assert!(find(&ctx, MODEL).is_none());
    // the other loads are unaffected
    assert_eq!(states[0], Some(RequestState::Attached));
    assert_eq!(states[1], Some(RequestState::Attached));
}

#[tokio::test]
async fn should_drop_completions_after_teardown() {
    let dir = tempfile::tempdir().unwrap();
    write_house_assets(dir.path());
    let config = test_config(dir.path());
    let mut ctx = test_context(&config);

    let pending = house::assemble(&mut ctx, &config).unwrap();
    let before = node_ids(&ctx);
    ctx.teardown();
    ctx.teardown();
    let states = settle(&mut ctx, pending).await;

    assert!(ctx.is_torn_down());
    assert!(states.iter().all(Option::is_none));
    assert_eq!(node_ids(&ctx), before);
    assert!(ctx.scene.environment().reflection().is_none());
}

#[tokio::test]
async fn should_attach_model_at_most_once_per_request() {
    let dir = tempfile::tempdir().unwrap();
    write_house_assets(dir.path());
    let config = test_config(dir.path());
    let mut ctx = test_context(&config);

    let mut pending = house::assemble(&mut ctx, &config).unwrap();
    let model_load = pending.pop().unwrap();
    let completion = model_load.await;
    let (id, path) = (completion.id, completion.path.clone());

    assert_eq!(ctx.complete(completion), Some(RequestState::Attached));
    let nodes = ctx.scene.len();

    let duplicate = LoadCompletion {
        id,
        path,
        result: Ok(Resource::MeshScene(Node::group().named("again"))),
    };
    assert_eq!(ctx.complete(duplicate), None);
    assert_eq!(ctx.scene.len(), nodes);
    assert_eq!(ctx.request_state(id), Some(RequestState::Attached));
}

#[test]
fn should_refuse_compressed_model_before_issuing_anything() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.assets.model_compressed = true;
    let mut ctx = test_context(&config);

    let result = house::assemble(&mut ctx, &config);

    assert!(matches!(
        result,
        Err(ViewerError::DecoderNotConfigured { .. })
    ));
    assert!(ctx.scene.is_empty());
    assert_eq!(ctx.pending_requests(), 0);
}

#[tokio::test]
async fn should_load_compressed_model_through_decoder() {
    let dir = tempfile::tempdir().unwrap();
    write_house_assets(dir.path());
    std::fs::write(dir.path().join(MODEL), compressed_glb()).unwrap();
    let mut config = test_config(dir.path());
    config.assets.model_compressed = true;
    let loader = AssetLoader::new(AssetSource::new(config.assets.root.clone()))
        .with_decoder(Arc::new(TriangleDecoder));
    let mut ctx =
        ViewerContext::with_loader(&config, Viewport::new(800, 600, 1.0), loader).unwrap();

    let pending = house::assemble(&mut ctx, &config).unwrap();
    let states = settle(&mut ctx, pending).await;

    assert_eq!(states[2], Some(RequestState::Attached));
    let model = find(&ctx, MODEL).unwrap();
    assert_eq!(model.subtree_len(), 2);
}

#[tokio::test]
async fn should_render_unchanged_scene_until_load_resolves() {
    let dir = tempfile::tempdir().unwrap();
    write_house_assets(dir.path());
    let config = test_config(dir.path());
    let mut ctx = test_context(&config);
    let mut backend = RecordingBackend::new();
    let mut frame_loop = FrameLoop::new();

    let pending = house::assemble(&mut ctx, &config).unwrap();
    for _ in 0..25 {
        frame_loop.tick(&mut ctx, &mut backend);
    }
    assert_eq!(backend.frames.len(), 25);
    assert!(backend.frames.iter().all(|frame| frame.node_count == 3));
    assert!(
        backend
            .frames
            .iter()
            .all(|frame| frame.node_names == ["ground", "sun", "sky"])
    );

    settle(&mut ctx, pending).await;
    frame_loop.tick(&mut ctx, &mut backend);

    assert_eq!(backend.last().node_count, 7);
}
