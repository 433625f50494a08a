use image::ImageFormat;

use crate::{
    data_structures::mesh::{EnvironmentMap, TextureResource, TextureSettings},
    error::Result,
};

/// Decodes a 2D texture (PNG, JPEG, ...) into RGBA8.
pub fn decode_texture(
    label: &str,
    bytes: &[u8],
    settings: TextureSettings,
) -> Result<TextureResource> {
    let image = image::load_from_memory(bytes)?;
    Ok(TextureResource::new(label, image.to_rgba8(), settings))
}

/// Decodes a Radiance HDR panorama into float RGBA.
pub fn decode_environment(label: &str, bytes: &[u8]) -> Result<EnvironmentMap> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Hdr)?;
    Ok(EnvironmentMap::new(label, image.to_rgba32f()))
}
