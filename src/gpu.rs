//! The wgpu rendering engine behind [`RenderBackend`].
//!
//! The backend owns the surface and keeps GPU copies of whatever the scene
//! references: vertex and index buffers per mesh node, one texture per
//! texture or environment resource. Uploads are cached by identity, so a
//! resource shared by several nodes is uploaded once. Each frame it writes
//! the camera uniform and clears the surface to the scene background.
//! Shading of the uploaded meshes is not part of this viewer.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::Context as _;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    camera::{Camera, CameraUniform, Projection},
    config::RendererConfig,
    data_structures::{
        mesh::{Geometry, ResourceId},
        scene_graph::{NodeId, NodeKind, Scene},
        texture::Texture,
    },
    error::{Result, ViewerError},
    render::RenderBackend,
    viewport::SurfaceSize,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex {
    fn from_geometry(geometry: &Geometry) -> Vec<Vertex> {
        geometry
            .positions
            .iter()
            .enumerate()
            .map(|(i, position)| Vertex {
                position: *position,
                tex_coords: geometry.tex_coords.get(i).copied().unwrap_or_default(),
                normal: geometry.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
            })
            .collect()
    }
}

/// Why the surface handed out no texture for a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    Timeout,
    Occluded,
    Outdated,
    Lost,
    Validation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    /// Drop the frame and try again on the next one.
    Skip,
    /// Configure the surface again before the next frame.
    Reconfigure,
    Fail,
}

impl SurfaceStatus {
    pub fn recovery(self) -> Recovery {
        match self {
            SurfaceStatus::Timeout | SurfaceStatus::Occluded => Recovery::Skip,
            SurfaceStatus::Outdated | SurfaceStatus::Lost => Recovery::Reconfigure,
            SurfaceStatus::Validation => Recovery::Fail,
        }
    }
}

#[derive(Debug)]
struct MeshBuffers {
    geometry: Arc<Geometry>,
    #[allow(unused)]
    vertex_buffer: wgpu::Buffer,
    #[allow(unused)]
    index_buffer: wgpu::Buffer,
}

#[derive(Debug)]
pub struct GpuBackend {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    is_surface_configured: bool,
    settings: RendererConfig,
    camera_uniform: CameraUniform,
    camera_buffer: wgpu::Buffer,
    meshes: HashMap<NodeId, MeshBuffers>,
    textures: HashMap<ResourceId, Texture>,
}

impl GpuBackend {
    pub async fn new(window: Arc<Window>, settings: RendererConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();

        log::info!("WGPU setup");
        let mut descriptor = wgpu::InstanceDescriptor::new_without_display_handle();
        descriptor.backends = if cfg!(target_arch = "wasm32") {
            wgpu::Backends::GL
        } else {
            wgpu::Backends::PRIMARY
        };
        let instance = wgpu::Instance::new(descriptor);
        let surface = instance
            .create_surface(window.clone())
            .context("Cannot create a surface for the window")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No graphics adapter can present to the window")?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("house-viewer device"),
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                ..Default::default()
            })
            .await
            .context("Cannot open the graphics device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("The surface supports no texture format")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let camera_uniform = CameraUniform::new();
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        log::info!(
            "Surface {:?} {}x{}, shadows {}, antialias {}, exposure {}",
            surface_format,
            config.width,
            config.height,
            settings.shadows,
            settings.antialias,
            settings.exposure
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            is_surface_configured: false,
            settings,
            camera_uniform,
            camera_buffer,
            meshes: HashMap::new(),
            textures: HashMap::new(),
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn settings(&self) -> &RendererConfig {
        &self.settings
    }

    fn configure(&mut self) {
        self.surface.configure(&self.device, &self.config);
        self.is_surface_configured = true;
    }

    /// Handles a frame for which the surface handed out no texture.
    fn recover(&mut self, status: SurfaceStatus) -> Result<()> {
        match status.recovery() {
            Recovery::Skip => Ok(()),
            Recovery::Reconfigure => {
                // the next frame gets a fresh surface
                self.configure();
                Ok(())
            }
            Recovery::Fail => Err(ViewerError::Surface(format!("{status:?}"))),
        }
    }

    /// Uploads resources that appeared since the last frame and drops those
    /// whose nodes left the scene.
    fn sync_resources(&mut self, scene: &Scene) {
        let mut live_meshes = HashSet::new();
        let mut live_textures = HashSet::new();

        if let Some(map) = scene.environment().reflection() {
            live_textures.insert(map.id());
            if !self.textures.contains_key(&map.id()) {
                let texture = Texture::from_environment(&self.device, &self.queue, map);
                self.textures.insert(map.id(), texture);
            }
        }

        let (device, queue) = (&self.device, &self.queue);
        let (meshes, textures) = (&mut self.meshes, &mut self.textures);
        scene.traverse_ref(&mut |node| {
            let NodeKind::Mesh(mesh) = &node.kind else {
                return;
            };
            live_meshes.insert(node.id());
            let stale = meshes
                .get(&node.id())
                .is_none_or(|buffers| !Arc::ptr_eq(&buffers.geometry, &mesh.geometry));
            if stale && !mesh.geometry.is_empty() {
                meshes.insert(node.id(), upload_geometry(device, &mesh.geometry));
            }
            if let Some(map) = &mesh.material.map {
                live_textures.insert(map.id());
                textures
                    .entry(map.id())
                    .or_insert_with(|| Texture::from_resource(device, queue, map));
            }
        });

        self.meshes.retain(|id, _| live_meshes.contains(id));
        self.textures.retain(|id, _| live_textures.contains(id));
    }
}

fn upload_geometry(device: &wgpu::Device, geometry: &Arc<Geometry>) -> MeshBuffers {
    let vertices = Vertex::from_geometry(geometry);
    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Vertex Buffer"),
        contents: bytemuck::cast_slice(&vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Index Buffer"),
        contents: bytemuck::cast_slice(&geometry.indices),
        usage: wgpu::BufferUsages::INDEX,
    });
    MeshBuffers {
        geometry: geometry.clone(),
        vertex_buffer,
        index_buffer,
    }
}

impl RenderBackend for GpuBackend {
    fn resize(&mut self, size: SurfaceSize) {
        self.config.width = size.width;
        self.config.height = size.height;
        self.configure();
    }

    fn render(&mut self, scene: &Scene, camera: &Camera, projection: &Projection) -> Result<()> {
        self.window.request_redraw();

        if !self.is_surface_configured {
            self.configure();
        }

        self.sync_resources(scene);

        self.camera_uniform.update_view_proj(camera, projection);
        self.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::cast_slice(&[self.camera_uniform]),
        );

        let (output, suboptimal) = match self.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output) => (output, false),
            wgpu::CurrentSurfaceTexture::Suboptimal(output) => (output, true),
            wgpu::CurrentSurfaceTexture::Timeout => return self.recover(SurfaceStatus::Timeout),
            wgpu::CurrentSurfaceTexture::Occluded => return self.recover(SurfaceStatus::Occluded),
            wgpu::CurrentSurfaceTexture::Outdated => return self.recover(SurfaceStatus::Outdated),
            wgpu::CurrentSurfaceTexture::Lost => return self.recover(SurfaceStatus::Lost),
            wgpu::CurrentSurfaceTexture::Validation => {
                return self.recover(SurfaceStatus::Validation);
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(
                            scene.environment().background.to_linear().to_wgpu(),
                        ),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        if suboptimal {
            self.configure();
        }
        Ok(())
    }
}
