//! The Viewport Manager: output surface size and pixel density.
//!
//! Sizes are in physical pixels (the surface's backing store). Zero-sized
//! requests, which hosts send while minimised, are clamped to 1×1 so the
//! aspect ratio is always defined.

use crate::camera::Projection;

/// Backing-store size of the output surface in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Viewport {
    size: SurfaceSize,
    pixel_ratio: f64,
}

impl Viewport {
    pub fn new(width: u32, height: u32, pixel_ratio: f64) -> Self {
        Self {
            size: SurfaceSize::new(width, height),
            pixel_ratio: sanitize_ratio(pixel_ratio),
        }
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn backing_size(&self) -> SurfaceSize {
        self.size
    }

    /// Size in logical (CSS) pixels.
    pub fn logical_size(&self) -> (f64, f64) {
        (
            self.size.width as f64 / self.pixel_ratio,
            self.size.height as f64 / self.pixel_ratio,
        )
    }

    /// Applies a host resize. Sets the projection's aspect to `width/height`,
    /// which marks it dirty if the aspect changed. Returns whether the
    /// backing store has to be resized.
    pub fn on_resize(&mut self, width: u32, height: u32, projection: &mut Projection) -> bool {
        let size = SurfaceSize::new(width, height);
        // no-op unless the projection drifted from the surface
        projection.set_aspect(size.aspect());
        if size == self.size {
            return false;
        }
        log::debug!(
            "viewport resized from {}x{} to {}x{}",
            self.size.width,
            self.size.height,
            size.width,
            size.height
        );
        self.size = size;
        true
    }

    /// Applies a change of device pixel ratio. Returns whether it changed.
    pub fn on_scale_factor(&mut self, pixel_ratio: f64) -> bool {
        let pixel_ratio = sanitize_ratio(pixel_ratio);
        if pixel_ratio == self.pixel_ratio {
            return false;
        }
        self.pixel_ratio = pixel_ratio;
        true
    }
}

fn sanitize_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}
