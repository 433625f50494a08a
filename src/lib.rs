//! house-viewer
//!
//! A single-scene 3D viewer for native windows and the browser: a textured
//! ground plane, sky and sun lights, an environment map and an imported house
//! model, seen through an orbit camera.
//!
//! High-level modules
//! - `config`: TOML configuration with defaults for the stock scene
//! - `context`: `ViewerContext`, the single owner of all mutable viewer state
//! - `controls`: the orbit camera controller
//! - `viewport`: surface size and pixel density, kept in sync with the camera
//! - `data_structures`: scene graph, transforms, colours, meshes and textures
//! - `resources`: asynchronous asset loading (glTF/GLB, HDR, images)
//! - `house`: assembly of the house scene
//! - `frame`: the per-frame update and render driver
//! - `render` / `gpu`: the rendering seam and its wgpu implementation
//! - `flow`: the winit application shell
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod controls;
pub mod data_structures;
pub mod diagnostics;
pub mod error;
pub mod flow;
pub mod frame;
pub mod gpu;
pub mod house;
pub mod render;
pub mod resources;
pub mod viewport;

// Re-exports commonly used types for convenience in downstream code.
pub use config::ViewerConfig;
pub use context::ViewerContext;
pub use error::{Result, ViewerError};
pub use flow::run;
pub use winit::event::WindowEvent;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Entry point of the web build. The page provides a `<canvas id="canvas">`.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> std::result::Result<(), JsValue> {
    run(ViewerConfig::default()).map_err(|e| JsValue::from_str(&format!("{:#}", e)))
}
