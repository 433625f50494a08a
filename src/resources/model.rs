//! glTF / GLB scenes into scene-graph nodes.
//!
//! The decoded scene becomes one group [`Node`] named after the asset path,
//! holding the file's root nodes. Mesh primitives become mesh nodes, punctual
//! lights become light nodes. Animations, cameras and skins are ignored.

use std::{collections::HashMap, sync::Arc};

use gltf::{
    json::validation::{Error as ValidationError, Validate},
    khr_lights_punctual::Kind,
};

use crate::{
    data_structures::{
        color::Color,
        mesh::{Geometry, Light, Material, Mesh, Shading, TextureResource, TextureSettings, Wrapping},
        scene_graph::Node,
        transform::Transform,
    },
    error::{Result, ViewerError},
    resources::{
        AssetSource,
        decoder::{DRACO_EXTENSION, MeshDecoder},
        texture::decode_texture,
    },
};

/// Decoded compressed primitives, keyed by mesh and primitive index.
type CompressedGeometry = HashMap<(usize, usize), Geometry>;

struct DecodeContext<'a> {
    path: &'a str,
    buffers: &'a [Vec<u8>],
    materials: &'a [Arc<Material>],
    compressed: &'a CompressedGeometry,
}

impl DecodeContext<'_> {
    fn error(&self, reason: impl Into<String>) -> ViewerError {
        ViewerError::Decode {
            path: self.path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parses a glTF or GLB file and everything it references.
pub async fn load_scene(
    source: &AssetSource,
    path: &str,
    bytes: Vec<u8>,
    decoder: Option<Arc<dyn MeshDecoder>>,
) -> Result<Node> {
    let gltf = gltf::Gltf::from_slice_without_validation(&bytes)?;
    validate(&gltf.document)?;
    let compressed = gltf
        .extensions_required()
        .any(|extension| extension == DRACO_EXTENSION);
    if compressed && decoder.is_none() {
        return Err(ViewerError::DecoderNotConfigured {
            path: path.to_string(),
        });
    }

    let buffers = load_buffers(source, path, &gltf.document, gltf.blob.as_deref()).await?;
    let images = load_images(source, path, &gltf.document, &buffers).await?;
    let materials: Vec<Arc<Material>> = gltf
        .materials()
        .map(|material| convert_material(&material, &images))
        .collect();

    let compressed = decode_compressed(path, &gltf.document, &buffers, decoder.as_ref()).await?;

    let ctx = DecodeContext {
        path,
        buffers: &buffers,
        materials: &materials,
        compressed: &compressed,
    };

    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .ok_or_else(|| ctx.error("the file contains no scene"))?;
    let mut root = Node::group().named(path);
    for node in scene.nodes() {
        root.add_child(convert_node(&node, &ctx)?);
    }
    log::info!("Decoded {} with {} nodes", path, root.subtree_len() - 1);
    Ok(root)
}

/// Runs the glTF validation that parsing skipped. A required extension the
/// gltf crate does not implement (Draco) is left to [`load_scene`]; every
/// other problem, out-of-range indices in particular, fails the load.
fn validate(document: &gltf::Document) -> Result<()> {
    let root = document.as_json();
    let mut errors = Vec::new();
    root.validate(root, gltf::json::Path::new, &mut |path, error| {
        let path = path();
        let unsupported_extension = error == ValidationError::Unsupported
            && path.as_str().starts_with("extensionsRequired");
        if !unsupported_extension {
            errors.push((path, error));
        }
    });
    if errors.is_empty() {
        Ok(())
    } else {
        Err(gltf::Error::Validation(errors).into())
    }
}

/// Resolves `uri` next to the file at `path`.
fn sibling(path: &str, uri: &str) -> String {
    match path.rfind('/') {
        Some(idx) => format!("{}/{}", &path[..idx], uri),
        None => uri.to_string(),
    }
}

async fn load_buffers(
    source: &AssetSource,
    path: &str,
    document: &gltf::Document,
    blob: Option<&[u8]>,
) -> Result<Vec<Vec<u8>>> {
    let uris: Vec<Option<String>> = document
        .buffers()
        .map(|buffer| match buffer.source() {
            gltf::buffer::Source::Bin => None,
            gltf::buffer::Source::Uri(uri) => Some(uri.to_string()),
        })
        .collect();

    let lengths: Vec<usize> = document.buffers().map(|buffer| buffer.length()).collect();

    let mut data = Vec::with_capacity(uris.len());
    for (index, uri) in uris.into_iter().enumerate() {
        let bytes = match uri {
            None => blob
                .ok_or_else(|| ViewerError::Decode {
                    path: path.to_string(),
                    reason: "buffer refers to a missing binary chunk".to_string(),
                })?
                .to_vec(),
            Some(uri) if uri.starts_with("data:") => {
                return Err(ViewerError::Decode {
                    path: path.to_string(),
                    reason: "embedded data URIs are not supported".to_string(),
                });
            }
            Some(uri) => source.load_binary(&sibling(path, &uri)).await?,
        };
        if bytes.len() < lengths[index] {
            return Err(ViewerError::Decode {
                path: path.to_string(),
                reason: format!(
                    "buffer {} holds {} bytes, {} declared",
                    index,
                    bytes.len(),
                    lengths[index]
                ),
            });
        }
        data.push(bytes);
    }
    Ok(data)
}

enum ImageBytes {
    View { buffer: usize, start: usize, end: usize },
    Uri(String),
}

/// Decodes the images used as base colour maps. Other images stay `None`.
async fn load_images(
    source: &AssetSource,
    path: &str,
    document: &gltf::Document,
    buffers: &[Vec<u8>],
) -> Result<Vec<Option<Arc<TextureResource>>>> {
    let mut used = vec![false; document.images().count()];
    for material in document.materials() {
        if let Some(info) = material.pbr_metallic_roughness().base_color_texture() {
            if let Some(flag) = used.get_mut(info.texture().source().index()) {
                *flag = true;
            }
        }
    }

    let sources: Vec<Option<ImageBytes>> = document
        .images()
        .map(|image| {
            if !used[image.index()] {
                return None;
            }
            Some(match image.source() {
                gltf::image::Source::View { view, .. } => ImageBytes::View {
                    buffer: view.buffer().index(),
                    start: view.offset(),
                    end: view.offset() + view.length(),
                },
                gltf::image::Source::Uri { uri, .. } => ImageBytes::Uri(uri.to_string()),
            })
        })
        .collect();

    let settings = TextureSettings {
        wrap: Wrapping::Repeat,
        ..Default::default()
    };
    let mut images = Vec::with_capacity(sources.len());
    for (index, image) in sources.into_iter().enumerate() {
        let label = format!("{}#image{}", path, index);
        let texture = match image {
            None => None,
            Some(ImageBytes::View { buffer, start, end }) => {
                let bytes = buffers
                    .get(buffer)
                    .and_then(|data| data.get(start..end))
                    .ok_or_else(|| ViewerError::Decode {
                        path: path.to_string(),
                        reason: format!("image {} points outside its buffer", index),
                    })?;
                Some(Arc::new(decode_texture(&label, bytes, settings)?))
            }
            Some(ImageBytes::Uri(uri)) => {
                let bytes = source.load_binary(&sibling(path, &uri)).await?;
                Some(Arc::new(decode_texture(&label, &bytes, settings)?))
            }
        };
        images.push(texture);
    }
    Ok(images)
}

fn convert_material(
    material: &gltf::Material,
    images: &[Option<Arc<TextureResource>>],
) -> Arc<Material> {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, _] = pbr.base_color_factor();
    let map = pbr
        .base_color_texture()
        .and_then(|info| images.get(info.texture().source().index()).cloned().flatten());
    Arc::new(Material {
        name: material.name().unwrap_or("unnamed").to_string(),
        shading: Shading::Standard,
        color: Color::new(r, g, b),
        map,
    })
}

fn convert_node(node: &gltf::Node, ctx: &DecodeContext) -> Result<Node> {
    let mut out = match node.mesh() {
        Some(mesh) => {
            let mut primitives = mesh
                .primitives()
                .map(|primitive| convert_primitive(mesh.index(), &primitive, ctx))
                .collect::<Result<Vec<_>>>()?;
            if primitives.len() == 1 {
                Node::mesh(primitives.remove(0))
            } else {
                let mut group = Node::group();
                for primitive in primitives {
                    group.add_child(Node::mesh(primitive));
                }
                group
            }
        }
        None => Node::group(),
    };
    if let Some(name) = node.name() {
        out.name = Some(name.to_string());
    }

    let (translation, rotation, scale) = node.transform().decomposed();
    out.transform = Transform {
        position: translation.into(),
        rotation: cgmath::Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
        scale: scale.into(),
    };

    if let Some(light) = node.light() {
        out.add_child(Node::light(convert_light(&light)));
    }
    for child in node.children() {
        out.add_child(convert_node(&child, ctx)?);
    }
    Ok(out)
}

fn convert_light(light: &gltf::khr_lights_punctual::Light) -> Light {
    let [r, g, b] = light.color();
    let color = Color::new(r, g, b);
    let intensity = light.intensity();
    match light.kind() {
        Kind::Directional => Light::Directional { color, intensity },
        Kind::Point => Light::Point {
            color,
            intensity,
            range: light.range(),
        },
        Kind::Spot {
            inner_cone_angle,
            outer_cone_angle,
        } => Light::Spot {
            color,
            intensity,
            range: light.range(),
            inner_cone: inner_cone_angle,
            outer_cone: outer_cone_angle,
        },
    }
}

fn convert_primitive(
    mesh: usize,
    primitive: &gltf::Primitive,
    ctx: &DecodeContext,
) -> Result<Mesh> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        log::warn!(
            "{}: primitive {} uses {:?}; drawing it as a triangle list",
            ctx.path,
            primitive.index(),
            primitive.mode()
        );
    }
    let material = primitive
        .material()
        .index()
        .and_then(|index| ctx.materials.get(index).cloned())
        .unwrap_or_default();

    let geometry = match primitive.extension_value(DRACO_EXTENSION) {
        Some(_) => ctx
            .compressed
            .get(&(mesh, primitive.index()))
            .cloned()
            .ok_or_else(|| ctx.error(format!("primitive {} was not decoded", primitive.index())))?,
        None => read_geometry(primitive, ctx)?,
    };
    Ok(Mesh {
        geometry: Arc::new(geometry),
        material,
    })
}

/// Hands every Draco-compressed primitive to `decoder`.
async fn decode_compressed(
    path: &str,
    document: &gltf::Document,
    buffers: &[Vec<u8>],
    decoder: Option<&Arc<dyn MeshDecoder>>,
) -> Result<CompressedGeometry> {
    let error = |reason: String| ViewerError::Decode {
        path: path.to_string(),
        reason,
    };

    let mut jobs = Vec::new();
    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            let Some(extension) = primitive.extension_value(DRACO_EXTENSION) else {
                continue;
            };
            let decoder = decoder.ok_or_else(|| ViewerError::DecoderNotConfigured {
                path: path.to_string(),
            })?;
            let view_index = extension
                .get("bufferView")
                .and_then(gltf::json::Value::as_u64)
                .ok_or_else(|| error("compressed primitive has no bufferView".to_string()))?;
            let view = document
                .views()
                .nth(view_index as usize)
                .ok_or_else(|| error(format!("bufferView {} does not exist", view_index)))?;
            let bytes = buffers
                .get(view.buffer().index())
                .and_then(|data| data.get(view.offset()..view.offset() + view.length()))
                .ok_or_else(|| error(format!("bufferView {} points outside its buffer", view_index)))?;
            jobs.push(((mesh.index(), primitive.index()), decoder.clone(), bytes.to_vec()));
        }
    }

    let mut decoded = HashMap::with_capacity(jobs.len());
    for (key, decoder, bytes) in jobs {
        decoded.insert(key, run_decoder(path, decoder, bytes).await?);
    }
    Ok(decoded)
}

/// Decoders may block on files and processes, so natively they run on the
/// blocking pool.
#[cfg(not(target_arch = "wasm32"))]
async fn run_decoder(path: &str, decoder: Arc<dyn MeshDecoder>, bytes: Vec<u8>) -> Result<Geometry> {
    tokio::task::spawn_blocking(move || decoder.decode(&bytes))
        .await
        .map_err(|e| ViewerError::Decode {
            path: path.to_string(),
            reason: format!("decoder task failed: {}", e),
        })?
}

#[cfg(target_arch = "wasm32")]
async fn run_decoder(_path: &str, decoder: Arc<dyn MeshDecoder>, bytes: Vec<u8>) -> Result<Geometry> {
    decoder.decode(&bytes)
}

fn read_geometry(primitive: &gltf::Primitive, ctx: &DecodeContext) -> Result<Geometry> {
    let reader = primitive.reader(|buffer| ctx.buffers.get(buffer.index()).map(Vec::as_slice));
    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| ctx.error(format!("primitive {} has no positions", primitive.index())))?
        .collect();
    let normals = reader
        .read_normals()
        .map(|normals| normals.collect())
        .unwrap_or_default();
    let tex_coords = reader
        .read_tex_coords(0)
        .map(|coords| coords.into_f32().collect())
        .unwrap_or_default();
    let indices = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    Ok(Geometry {
        positions,
        normals,
        tex_coords,
        indices,
    })
}
