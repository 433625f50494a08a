//! The seam between the viewer and a rendering engine.
//!
//! The frame loop only knows [`RenderBackend`]. The wgpu implementation lives
//! in [`crate::gpu`]; tests plug in a backend that just records what it was
//! asked to draw.

use crate::{
    camera::{Camera, Projection},
    data_structures::scene_graph::Scene,
    error::Result,
    viewport::SurfaceSize,
};

pub trait RenderBackend {
    /// Resizes the output surface's backing store.
    fn resize(&mut self, size: SurfaceSize);

    /// Draws `scene` as seen through `camera`. The projection has already been
    /// refreshed for this frame.
    ///
    /// The scene may be empty or partially loaded.
    fn render(&mut self, scene: &Scene, camera: &Camera, projection: &Projection) -> Result<()>;
}

impl<B: RenderBackend + ?Sized> RenderBackend for Box<B> {
    fn resize(&mut self, size: SurfaceSize) {
        (**self).resize(size)
    }

    fn render(&mut self, scene: &Scene, camera: &Camera, projection: &Projection) -> Result<()> {
        (**self).render(scene, camera, projection)
    }
}
