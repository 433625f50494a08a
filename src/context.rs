//! The viewer's single owner of mutable state.
//!
//! One [`ViewerContext`] exists per viewer. It owns the scene, camera,
//! projection, orbit controller, viewport and diagnostics, plus the ledger of
//! Loader Requests and their continuations. Everything here is touched from
//! the viewer thread only; asynchronous loads report back through
//! [`ViewerContext::complete`].

use std::collections::HashMap;

use winit::event::WindowEvent;

use crate::{
    camera::{Camera, Projection},
    config::ViewerConfig,
    controls::OrbitController,
    data_structures::scene_graph::Scene,
    diagnostics::Diagnostics,
    error::Result,
    resources::{AssetLoader, LoadCompletion, LoaderRequest, PendingLoad, RequestId, RequestState, Resource},
    viewport::{SurfaceSize, Viewport},
};

/// Runs on the viewer thread with the resolved resource. Returning an error
/// marks the request failed.
pub type Continuation = Box<dyn FnOnce(&mut Scene, Resource) -> Result<()>>;

pub struct ViewerContext {
    pub scene: Scene,
    pub camera: Camera,
    pub projection: Projection,
    pub controller: OrbitController,
    pub viewport: Viewport,
    pub diagnostics: Diagnostics,
    loader: AssetLoader,
    continuations: HashMap<RequestId, Continuation>,
    requests: HashMap<RequestId, RequestState>,
    torn_down: bool,
}

impl std::fmt::Debug for ViewerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerContext")
            .field("scene", &self.scene)
            .field("camera", &self.camera)
            .field("viewport", &self.viewport)
            .field("requests", &self.requests)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl ViewerContext {
    /// Builds the context with a loader for the configured asset root.
    pub fn new(config: &ViewerConfig, viewport: Viewport) -> Result<Self> {
        Self::with_loader(config, viewport, AssetLoader::from_config(config))
    }

    pub fn with_loader(config: &ViewerConfig, viewport: Viewport, loader: AssetLoader) -> Result<Self> {
        config.validate()?;
        let camera = Camera::from_config(&config.camera);
        let projection = Projection::from_config(&config.camera, viewport.width(), viewport.height());
        let mut controller = OrbitController::new(config.controls.clone());
        controller.set_viewport_height(viewport.height());
        Ok(Self {
            scene: Scene::new(),
            camera,
            projection,
            controller,
            viewport,
            diagnostics: Diagnostics::new(),
            loader,
            continuations: HashMap::new(),
            requests: HashMap::new(),
            torn_down: false,
        })
    }

    pub fn loader(&self) -> &AssetLoader {
        &self.loader
    }

    /// Registers `continuation` to run once `request` resolves and returns
    /// the future that performs the load. The continuation runs at most once,
    /// inside [`ViewerContext::complete`], and never if the load fails.
    pub fn issue<F>(&mut self, request: LoaderRequest, continuation: F) -> PendingLoad
    where
        F: FnOnce(&mut Scene, Resource) -> Result<()> + 'static,
    {
        let id = request.id();
        self.requests.insert(id, RequestState::Pending);
        self.continuations.insert(id, Box::new(continuation));
        PendingLoad::new(request)
    }

    /// Applies a finished load. Returns the request's new state, or `None`
    /// when the completion was not applied: unknown or already settled
    /// requests, and everything after teardown.
    pub fn complete(&mut self, completion: LoadCompletion) -> Option<RequestState> {
        let LoadCompletion { id, path, result } = completion;
        if self.torn_down {
            log::debug!("Dropping completion of {} ({}) after teardown", id, path);
            return None;
        }
        if self.requests.get(&id) != Some(&RequestState::Pending) {
            log::warn!("Ignoring completion of {} ({}): not pending", id, path);
            return None;
        }
        let continuation = self.continuations.remove(&id)?;

        let state = match result {
            Ok(resource) => {
                self.requests.insert(id, RequestState::Resolved);
                match continuation(&mut self.scene, resource) {
                    Ok(()) => {
                        log::info!("Loaded {}", path);
                        RequestState::Attached
                    }
                    Err(e) => {
                        log::warn!("Could not attach {}: {}", path, e);
                        RequestState::Failed
                    }
                }
            }
            Err(e) => {
                log::warn!("Could not load {}: {}", path, e);
                RequestState::Failed
            }
        };
        self.requests.insert(id, state);
        Some(state)
    }

    pub fn request_state(&self, id: RequestId) -> Option<RequestState> {
        self.requests.get(&id).copied()
    }

    /// Requests that have neither attached nor failed yet.
    pub fn pending_requests(&self) -> usize {
        self.requests
            .values()
            .filter(|state| !state.is_terminal())
            .count()
    }

    /// Host resize. Returns the new backing-store size when the surface has
    /// to be reconfigured.
    pub fn on_resize(&mut self, width: u32, height: u32) -> Option<SurfaceSize> {
        let resized = self.viewport.on_resize(width, height, &mut self.projection);
        self.controller.set_viewport_height(self.viewport.height());
        resized.then(|| self.viewport.backing_size())
    }

    pub fn on_scale_factor(&mut self, pixel_ratio: f64) -> bool {
        self.viewport.on_scale_factor(pixel_ratio)
    }

    /// Routes pointer input to the camera controller.
    pub fn handle_input(&mut self, event: &WindowEvent) -> bool {
        self.controller
            .handle_window_event(event, &self.camera, &self.projection)
    }

    /// Abandons in-flight requests. Their completions become no-ops.
    /// Calling it again does nothing.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        let abandoned = self.continuations.len();
        self.continuations.clear();
        self.torn_down = true;
        log::info!("Viewer torn down, {} load(s) abandoned", abandoned);
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}
