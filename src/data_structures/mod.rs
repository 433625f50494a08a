//! Viewer data structures: scene graph, transforms, renderable payloads and
//! GPU textures.
//!
//! - `color` holds RGB colours with hex and HSL constructors
//! - `transform` holds local transforms and their composition
//! - `mesh` contains geometry, materials, lights and CPU-side image resources
//! - `scene_graph` is the node ownership tree plus scene-level environment
//! - `texture` contains the GPU texture wrapper

pub mod color;
pub mod mesh;
pub mod scene_graph;
pub mod texture;
pub mod transform;
