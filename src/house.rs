//! The fixed house scene.
//!
//! [`assemble`] builds everything that exists synchronously (environment,
//! ground, lights) and issues the three asynchronous loads whose
//! continuations complete the scene: the environment map, the ground texture
//! and the house model.

use std::{f32::consts::FRAC_PI_2, sync::Arc};

use crate::{
    config::{GroundConfig, ModelPlacement, ViewerConfig},
    context::ViewerContext,
    data_structures::{
        color::Color,
        mesh::{Geometry, Light, Material, Mesh, TextureResource, TextureSettings, Wrapping},
        scene_graph::{AmbientLight, Fog, Node, NodeId, NodeKind, Scene},
    },
    error::{Result, ViewerError},
    resources::{AssetKind, PendingLoad},
};

pub const GROUND_NAME: &str = "ground";

/// Populates `ctx.scene` and returns the loads that still have to be driven.
///
/// Fails with [`ViewerError::DecoderNotConfigured`] before anything is
/// issued when the model is compressed and the loader has no decoder.
pub fn assemble(ctx: &mut ViewerContext, config: &ViewerConfig) -> Result<Vec<PendingLoad>> {
    let assets = &config.assets;
    let model_kind = if assets.model_compressed {
        AssetKind::CompressedMeshScene
    } else {
        AssetKind::MeshScene
    };
    let model_request = ctx.loader().load(model_kind, &assets.model)?;

    let scene_config = &config.scene;
    ctx.scene.set_background(Color::from_hex(scene_config.background));
    ctx.scene.set_fog(scene_config.fog.as_ref().map(|fog| Fog {
        color: Color::from_hex(fog.color),
        near: fog.near,
        far: fog.far,
    }));
    ctx.scene.set_ambient(Some(AmbientLight {
        color: Color::WHITE,
        intensity: 0.4,
    }));

    let ground = ctx.scene.add_node(ground_node(&scene_config.ground));
    add_lights(&mut ctx.scene);

    if let Some(font) = &assets.font {
        log::info!("Font {} is declared but not loaded", font);
    }

    let mut pending = Vec::with_capacity(3);

    let request = ctx.loader().load(AssetKind::Environment, &assets.environment)?;
    pending.push(ctx.issue(request, |scene, resource| {
        scene.set_environment(resource.into_environment()?);
        Ok(())
    }));

    let ground_settings = ground_texture_settings(&scene_config.ground);
    let request = ctx
        .loader()
        .load(AssetKind::Texture(ground_settings), &assets.ground_texture)?;
    pending.push(ctx.issue(request, move |scene, resource| {
        attach_ground_texture(scene, ground, resource.into_texture()?)
    }));

    let placement = scene_config.model.clone();
    pending.push(ctx.issue(model_request, move |scene, resource| {
        let model = place_model(resource.into_scene()?, &placement);
        scene.add_node(model);
        Ok(())
    }));

    log::info!(
        "House scene assembled with {} nodes, {} load(s) pending",
        ctx.scene.len(),
        pending.len()
    );
    Ok(pending)
}

fn ground_node(config: &GroundConfig) -> Node {
    let [h, s, l] = config.color_hsl;
    let mut ground = Node::mesh(Mesh {
        geometry: Arc::new(Geometry::plane(config.size, config.size)),
        material: Arc::new(Material::lambert(GROUND_NAME, Color::from_hsl(h, s, l))),
    })
    .named(GROUND_NAME);
    ground.transform.set_euler(-FRAC_PI_2, 0.0, 0.0);
    ground.receive_shadow = true;
    ground
}

pub fn ground_texture_settings(config: &GroundConfig) -> TextureSettings {
    TextureSettings {
        wrap: Wrapping::Repeat,
        repeat: [config.texture_repeat, config.texture_repeat],
        anisotropy: config.anisotropy,
        srgb: true,
    }
}

fn add_lights(scene: &mut Scene) {
    let mut sun = Node::light(Light::Directional {
        color: Color::WHITE,
        intensity: 0.8,
    })
    .named("sun");
    sun.transform.set_position(0.0, 1000.0, 0.0);
    scene.add_node(sun);

    let mut sky = Node::light(Light::Hemisphere {
        sky: Color::from_hsl(0.6, 1.0, 0.6),
        ground: Color::from_hsl(0.095, 1.0, 0.75),
        intensity: 2.0,
    })
    .named("sky");
    sky.transform.set_position(0.0, 50.0, 0.0);
    scene.add_node(sky);
}

fn attach_ground_texture(
    scene: &mut Scene,
    ground: NodeId,
    texture: TextureResource,
) -> Result<()> {
    let node = scene
        .node_mut(ground)
        .ok_or(ViewerError::MissingNode(ground))?;
    let NodeKind::Mesh(mesh) = &mut node.kind else {
        return Err(ViewerError::MissingNode(ground));
    };
    mesh.material = Arc::new(mesh.material.with_map(Arc::new(texture)));
    Ok(())
}

/// Applies the configured placement and turns on shadows for every mesh and
/// light below the model root.
pub fn place_model(mut model: Node, placement: &ModelPlacement) -> Node {
    let scale = placement.scale;
    let [x, y, z] = placement.position;
    let [rx, ry, rz] = placement.rotation;
    model.transform.set_scale(scale, scale, scale);
    model.transform.set_position(x, y, z);
    // the values go in as radians, unconverted
    model.transform.set_euler(rx, ry, rz);

    model.traverse(&mut |node| {
        if node.is_mesh() || node.is_light() {
            node.cast_shadow = true;
            node.receive_shadow = true;
        }
    });
    model
}
