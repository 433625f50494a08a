//! GPU textures.
//!
//! [`Texture`] wraps a WGPU texture together with its view and sampler. The
//! backend creates one per [`TextureResource`] or [`EnvironmentMap`] the first
//! time a node or the scene environment references it. Images larger than
//! the device's `max_texture_dimension_2d` are scaled down before upload.

use std::borrow::Cow;

use image::{
    ImageBuffer, Pixel,
    imageops::{self, FilterType},
};

use crate::data_structures::mesh::{EnvironmentMap, TextureResource, TextureSettings, Wrapping};

/// A GPU texture with a view and sampler.
#[derive(Clone, Debug)]
pub struct Texture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Texture {
    pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

    /// Uploads an 8-bit colour texture. `settings.srgb` selects between sRGB
    /// and linear sampling.
    pub fn from_resource(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        resource: &TextureResource,
    ) -> Self {
        let max = device.limits().max_texture_dimension_2d;
        let image = fit_image(&resource.label, &resource.image, max);
        let (width, height) = image.dimensions();
        let format = if resource.settings.srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let size = extent(width, height);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&resource.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            image.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_sampler(device, &resource.settings);
        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Uploads a float RGBA panorama. Equirectangular images wrap
    /// horizontally and clamp at the poles.
    pub fn from_environment(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        map: &EnvironmentMap,
    ) -> Self {
        let max = device.limits().max_texture_dimension_2d;
        let image = fit_image(&map.label, &map.image, max);
        let (width, height) = image.dimensions();
        let size = extent(width, height);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&map.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::HDR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        // 4 channels of f32
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            bytemuck::cast_slice(image.as_raw()),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(16 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        // Rgba32Float is not filterable without an extra feature
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("environment sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });
        Self {
            texture,
            view,
            sampler,
        }
    }
}

/// The size an image must be scaled to so that neither side exceeds `max`,
/// keeping the aspect ratio. `None` when it already fits.
pub fn fit_within(width: u32, height: u32, max: u32) -> Option<(u32, u32)> {
    if width <= max && height <= max {
        return None;
    }
    let max = max.max(1);
    let scale = f64::from(max) / f64::from(width.max(height));
    let side = |len: u32| ((f64::from(len) * scale).round() as u32).clamp(1, max);
    Some((side(width), side(height)))
}

/// Borrows `image` when it fits the device limit, otherwise returns a
/// downscaled copy.
pub fn fit_image<'a, P>(
    label: &str,
    image: &'a ImageBuffer<P, Vec<P::Subpixel>>,
    max: u32,
) -> Cow<'a, ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let (width, height) = image.dimensions();
    match fit_within(width, height, max) {
        None => Cow::Borrowed(image),
        Some((w, h)) => {
            log::warn!("{label} is {width}x{height}, the device allows {max}; scaling to {w}x{h}");
            Cow::Owned(imageops::resize(image, w, h, FilterType::Triangle))
        }
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: width.max(1),
        height: height.max(1),
        depth_or_array_layers: 1,
    }
}

fn address_mode(wrap: Wrapping) -> wgpu::AddressMode {
    match wrap {
        Wrapping::Repeat => wgpu::AddressMode::Repeat,
        Wrapping::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

fn create_sampler(device: &wgpu::Device, settings: &TextureSettings) -> wgpu::Sampler {
    let mode = address_mode(settings.wrap);
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("texture sampler"),
        address_mode_u: mode,
        address_mode_v: mode,
        address_mode_w: mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}
