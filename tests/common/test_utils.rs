use std::path::Path;

use cgmath::Point3;
use house_viewer::{
    ViewerConfig, ViewerContext, ViewerError,
    camera::{Camera, Projection},
    data_structures::{mesh::Geometry, scene_graph::Scene},
    render::RenderBackend,
    resources::{AssetLoader, AssetSource, decoder::MeshDecoder},
    viewport::{SurfaceSize, Viewport},
};

pub(crate) const MODEL: &str = "house.glb";
pub(crate) const ENVIRONMENT: &str = "sky.hdr";
pub(crate) const GROUND_TEXTURE: &str = "land.png";

/// What the backend saw in one `render` call.
#[derive(Debug, Clone)]
pub(crate) struct RecordedFrame {
    pub camera_position: Point3<f32>,
    pub camera_target: Point3<f32>,
    pub aspect: f32,
    pub projection_dirty: bool,
    pub node_count: usize,
    pub node_names: Vec<String>,
}

/// A render backend that draws nothing and remembers every call.
#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    pub frames: Vec<RecordedFrame>,
    pub resizes: Vec<SurfaceSize>,
    failures_left: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` frames report a surface error.
    pub fn fail_next(&mut self, count: usize) {
        self.failures_left = count;
    }

    pub fn last(&self) -> &RecordedFrame {
        self.frames.last().expect("nothing was rendered")
    }
}

impl RenderBackend for RecordingBackend {
    fn resize(&mut self, size: SurfaceSize) {
        self.resizes.push(size);
    }

    fn render(
        &mut self,
        scene: &Scene,
        camera: &Camera,
        projection: &Projection,
    ) -> house_viewer::Result<()> {
        let mut node_names = Vec::new();
        scene.traverse_ref(&mut |node| {
            node_names.push(node.name.clone().unwrap_or_default());
        });
        self.frames.push(RecordedFrame {
            camera_position: camera.position,
            camera_target: camera.target,
            aspect: projection.aspect(),
            projection_dirty: projection.is_dirty(),
            node_count: scene.len(),
            node_names,
        });
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(ViewerError::Surface("injected failure".to_string()));
        }
        Ok(())
    }
}

/// Stands in for the external decoder: every compressed primitive decodes to
/// one triangle.
#[derive(Debug, Default)]
pub(crate) struct TriangleDecoder;

impl MeshDecoder for TriangleDecoder {
    fn decode(&self, data: &[u8]) -> house_viewer::Result<Geometry> {
        if data.is_empty() {
            return Err(ViewerError::Decode {
                path: "draco".to_string(),
                reason: "empty bitstream".to_string(),
            });
        }
        Ok(triangle())
    }
}

pub(crate) fn triangle() -> Geometry {
    Geometry {
        positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        normals: vec![[0.0, 0.0, 1.0]; 3],
        tex_coords: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
        indices: vec![0, 1, 2],
    }
}

/// Defaults with every asset pointing into `root` and an uncompressed model.
pub(crate) fn test_config(root: &Path) -> ViewerConfig {
    let mut config = ViewerConfig::default();
    config.assets.root = root.display().to_string();
    config.assets.model = MODEL.to_string();
    config.assets.model_compressed = false;
    config.assets.environment = ENVIRONMENT.to_string();
    config.assets.ground_texture = GROUND_TEXTURE.to_string();
    config
}

/// An 800x600 context whose loader reads from `config.assets.root` and has
/// no decoder installed.
pub(crate) fn test_context(config: &ViewerConfig) -> ViewerContext {
    let loader = AssetLoader::new(AssetSource::new(config.assets.root.clone()));
    ViewerContext::with_loader(config, Viewport::new(800, 600, 1.0), loader)
        .expect("test configuration is valid")
}

/// Writes the three assets of the house scene into `dir`.
pub(crate) fn write_house_assets(dir: &Path) {
    std::fs::write(dir.join(MODEL), triangle_glb()).expect("write model");
    write_png(&dir.join(GROUND_TEXTURE), 4, 4);
    write_hdr(&dir.join(ENVIRONMENT), 8, 4);
}

pub(crate) fn write_png(path: &Path, width: u32, height: u32) {
    image::RgbaImage::from_pixel(width, height, image::Rgba([200, 150, 100, 255]))
        .save(path)
        .expect("write png");
}

pub(crate) fn write_hdr(path: &Path, width: u32, height: u32) {
    image::Rgb32FImage::from_pixel(width, height, image::Rgb([1.5, 0.75, 0.25]))
        .save(path)
        .expect("write hdr");
}

const GLB_MAGIC: u32 = 0x4654_6C67;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// Packs a glTF JSON document and its binary buffer into a GLB container.
pub(crate) fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut json = json.as_bytes().to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin.to_vec();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let total = 12 + 8 + json.len() + if bin.is_empty() { 0 } else { 8 + bin.len() };
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json);
    if !bin.is_empty() {
        out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(&bin);
    }
    out
}

fn triangle_bin() -> Vec<u8> {
    let mut bin = Vec::new();
    for position in triangle().positions {
        for component in position {
            bin.extend_from_slice(&component.to_le_bytes());
        }
    }
    for index in [0u16, 1, 2] {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    bin
}

/// A GLB holding one triangle under a node named "roof" with a point light
/// child named "lamp".
pub(crate) fn triangle_glb() -> Vec<u8> {
    let json = r#"{
        "asset": { "version": "2.0" },
        "extensionsUsed": ["KHR_lights_punctual"],
        "extensions": {
            "KHR_lights_punctual": {
                "lights": [{ "type": "point", "color": [1.0, 0.9, 0.8], "intensity": 3.0 }]
            }
        },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "roof", "mesh": 0, "translation": [0.0, 2.0, 0.0], "children": [1] },
            { "name": "lamp", "extensions": { "KHR_lights_punctual": { "light": 0 } } }
        ],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
        "buffers": [{ "byteLength": 42 }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36, "target": 34962 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6, "target": 34963 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    }"#;
    glb(json, &triangle_bin())
}

/// A GLB whose only primitive is Draco-compressed. The bitstream is opaque
/// filler bytes.
pub(crate) fn compressed_glb() -> Vec<u8> {
    let json = r#"{
        "asset": { "version": "2.0" },
        "extensionsUsed": ["KHR_draco_mesh_compression"],
        "extensionsRequired": ["KHR_draco_mesh_compression"],
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "walls", "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": { "POSITION": 0 },
                "extensions": {
                    "KHR_draco_mesh_compression": { "bufferView": 0, "attributes": { "POSITION": 0 } }
                }
            }]
        }],
        "buffers": [{ "byteLength": 8 }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 8 }],
        "accessors": [{ "componentType": 5126, "count": 3, "type": "VEC3",
                        "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }]
    }"#;
    glb(json, &[0xD7, 0xAC, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06])
}

/// Drives every pending load to completion and applies it, in order.
pub(crate) async fn settle(
    ctx: &mut ViewerContext,
    pending: Vec<house_viewer::resources::PendingLoad>,
) -> Vec<Option<house_viewer::resources::RequestState>> {
    let mut states = Vec::with_capacity(pending.len());
    for load in pending {
        let completion = load.await;
        states.push(ctx.complete(completion));
    }
    states
}
