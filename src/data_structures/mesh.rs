//! Renderable payloads carried by scene nodes and produced by the loader.
//!
//! Geometry and images are plain CPU-side data; the render backend decides
//! how and when they become GPU resources. Materials and textures are shared
//! through `Arc` handles, so several nodes may reference one resource and it
//! lives as long as the longest-lived of them.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::data_structures::color::Color;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a texture or environment resource, used by
/// render backends to cache uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl Geometry {
    /// A `width` x `height` quad in the XY plane facing +Z, centred on the
    /// origin.
    pub fn plane(width: f32, height: f32) -> Self {
        let (hw, hh) = (width / 2.0, height / 2.0);
        Self {
            positions: vec![
                [-hw, hh, 0.0],
                [hw, hh, 0.0],
                [-hw, -hh, 0.0],
                [hw, -hh, 0.0],
            ],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            tex_coords: vec![[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]],
            indices: vec![0, 2, 1, 2, 3, 1],
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wrapping {
    Repeat,
    ClampToEdge,
}

/// Sampling hints that travel with a texture to the backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureSettings {
    pub wrap: Wrapping,
    pub repeat: [f32; 2],
    pub anisotropy: u16,
    pub srgb: bool,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            wrap: Wrapping::ClampToEdge,
            repeat: [1.0, 1.0],
            anisotropy: 1,
            srgb: true,
        }
    }
}

#[derive(Debug)]
pub struct TextureResource {
    id: ResourceId,
    pub label: String,
    pub image: image::RgbaImage,
    pub settings: TextureSettings,
}

impl TextureResource {
    pub fn new(label: impl Into<String>, image: image::RgbaImage, settings: TextureSettings) -> Self {
        Self {
            id: ResourceId::next(),
            label: label.into(),
            image,
            settings,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }
}

/// How an environment image is projected onto the surroundings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mapping {
    Uv,
    EquirectangularReflection,
}

/// A panoramic high dynamic range image used as the scene environment.
#[derive(Debug)]
pub struct EnvironmentMap {
    id: ResourceId,
    pub label: String,
    pub image: image::Rgba32FImage,
    pub mapping: Mapping,
}

impl EnvironmentMap {
    pub fn new(label: impl Into<String>, image: image::Rgba32FImage) -> Self {
        Self {
            id: ResourceId::next(),
            label: label.into(),
            image,
            mapping: Mapping::Uv,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shading {
    /// Diffuse-only shading.
    Lambert,
    /// Metallic-roughness shading as authored in glTF.
    Standard,
}

#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub shading: Shading,
    pub color: Color,
    pub map: Option<Arc<TextureResource>>,
}

impl Material {
    pub fn lambert(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            shading: Shading::Lambert,
            color,
            map: None,
        }
    }

    pub fn with_map(&self, map: Arc<TextureResource>) -> Self {
        Self {
            map: Some(map),
            ..self.clone()
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            shading: Shading::Standard,
            color: Color::WHITE,
            map: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: Arc<Material>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Light {
    Directional {
        color: Color,
        intensity: f32,
    },
    Hemisphere {
        sky: Color,
        ground: Color,
        intensity: f32,
    },
    Point {
        color: Color,
        intensity: f32,
        range: Option<f32>,
    },
    Spot {
        color: Color,
        intensity: f32,
        range: Option<f32>,
        inner_cone: f32,
        outer_cone: f32,
    },
}
