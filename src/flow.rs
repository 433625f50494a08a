//! Application shell and event loop.
//!
//! [`run`] opens the window, builds the [`ViewerContext`] and the wgpu
//! backend, assembles the house scene and then lets winit drive everything:
//!
//! 1. window input goes to the orbit controller
//! 2. resizes go to the viewport, then to the surface
//! 3. finished loads arrive as [`ViewerEvent::Loaded`] and are applied on
//!    this thread
//! 4. every redraw runs one [`FrameLoop::tick`]
//!
//! Loads run on a tokio runtime natively and on the browser's task queue on
//! the web. They never touch the scene themselves.

use std::{fmt::Debug, sync::Arc};

use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{Window, WindowId},
};

use crate::{
    config::ViewerConfig,
    context::ViewerContext,
    frame::FrameLoop,
    gpu::GpuBackend,
    house,
    render::RenderBackend,
    resources::{LoadCompletion, PendingLoad},
    viewport::Viewport,
};

/// Everything that exists once the window and the GPU are up.
#[derive(Debug)]
pub struct Viewer {
    ctx: ViewerContext,
    backend: GpuBackend,
    frame_loop: FrameLoop,
}

impl Viewer {
    async fn new(window: Arc<Window>, config: ViewerConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let pixel_ratio = config
            .renderer
            .pixel_ratio
            .unwrap_or_else(|| window.scale_factor());
        let backend = GpuBackend::new(window, config.renderer.clone()).await?;
        let viewport = Viewport::new(size.width, size.height, pixel_ratio);
        let ctx = ViewerContext::new(&config, viewport)?;
        Ok(Self {
            ctx,
            backend,
            frame_loop: FrameLoop::with_limit(config.window.exit_after_frames),
        })
    }

    fn window(&self) -> &Arc<Window> {
        self.backend.window()
    }

    fn shut_down(&mut self) {
        self.frame_loop.stop();
        self.ctx.teardown();
    }
}

pub enum ViewerEvent {
    /// The web build initializes asynchronously and reports back here.
    #[cfg(target_arch = "wasm32")]
    Initialized(Box<anyhow::Result<Viewer>>),
    Loaded(LoadCompletion),
}

impl Debug for ViewerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(target_arch = "wasm32")]
            Self::Initialized(_) => f.write_str("Initialized"),
            Self::Loaded(completion) => f
                .debug_tuple("Loaded")
                .field(&completion.id)
                .field(&completion.path)
                .finish(),
        }
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<ViewerEvent>,
    config: ViewerConfig,
    viewer: Option<Viewer>,
    started: bool,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(event_loop: &EventLoop<ViewerEvent>, config: ViewerConfig) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            config,
            viewer: None,
            started: false,
            error: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if let Some(viewer) = &mut self.viewer {
            viewer.shut_down();
        }
        self.error = Some(error);
        event_loop.exit();
    }

    /// Assembles the scene of a freshly initialized viewer and starts its
    /// loads.
    fn start(&mut self, event_loop: &ActiveEventLoop, mut viewer: Viewer) {
        let pending = match house::assemble(&mut viewer.ctx, &self.config) {
            Ok(pending) => pending,
            Err(e) => return self.fail(event_loop, e.into()),
        };
        for load in pending {
            self.spawn_load(load);
        }
        let size = viewer.ctx.viewport.backing_size();
        viewer.backend.resize(size);
        viewer.window().request_redraw();
        self.viewer = Some(viewer);
    }

    fn spawn_load(&self, load: PendingLoad) {
        let proxy = self.proxy.clone();
        let fut = async move {
            let completion = load.await;
            if proxy.send_event(ViewerEvent::Loaded(completion)).is_err() {
                log::debug!("Event loop closed before a load finished");
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            self.async_runtime.spawn(fut);
        }

        #[cfg(target_arch = "wasm32")]
        {
            wasm_bindgen_futures::spawn_local(fut);
        }
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.started {
            return;
        }
        self.started = true;

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(LogicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(CANVAS_ID));
            match canvas {
                Some(canvas) => {
                    window_attributes =
                        window_attributes.with_canvas(Some(canvas.unchecked_into()));
                }
                None => log::warn!("No #{} element, letting winit create a canvas", CANVAS_ID),
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => return self.fail(event_loop, e.into()),
        };

        let init_future = Viewer::new(window, self.config.clone());

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(init_future) {
                Ok(viewer) => self.start(event_loop, viewer),
                Err(e) => self.fail(event_loop, e),
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let viewer = init_future.await;
                if proxy
                    .send_event(ViewerEvent::Initialized(Box::new(viewer)))
                    .is_err()
                {
                    log::error!("Event loop closed during initialization");
                }
            });
        }
    }

    #[cfg_attr(not(target_arch = "wasm32"), allow(unused_variables))]
    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            #[cfg(target_arch = "wasm32")]
            ViewerEvent::Initialized(viewer) => match *viewer {
                Ok(viewer) => self.start(event_loop, viewer),
                Err(e) => self.fail(event_loop, e),
            },
            ViewerEvent::Loaded(completion) => {
                if let Some(viewer) = &mut self.viewer {
                    viewer.ctx.complete(completion);
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let viewer = match &mut self.viewer {
            Some(viewer) => viewer,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => {
                viewer.shut_down();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(backing) = viewer.ctx.on_resize(size.width, size.height) {
                    viewer.backend.resize(backing);
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if self.config.renderer.pixel_ratio.is_none() {
                    viewer.ctx.on_scale_factor(scale_factor);
                }
            }
            WindowEvent::RedrawRequested => {
                let outcome = viewer.frame_loop.tick(&mut viewer.ctx, &mut viewer.backend);
                if let Some(stats) = outcome.stats() {
                    viewer
                        .window()
                        .set_title(&format!("{} | {}", self.config.window.title, stats));
                }
                if !viewer.frame_loop.is_running() {
                    viewer.shut_down();
                    event_loop.exit();
                }
            }
            other => {
                viewer.ctx.handle_input(&other);
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = &mut self.viewer {
            viewer.shut_down();
        }
    }
}

/// Runs the viewer until its window closes or, with
/// `window.exit_after_frames`, until the frame limit is reached.
pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info)
            .map_err(|e| anyhow::anyhow!("Could not initialize logger: {}", e))?;
    }

    #[cfg(all(feature = "integration-tests", target_os = "linux"))]
    let event_loop: EventLoop<ViewerEvent> = {
        use winit::platform::wayland::EventLoopBuilderExtWayland;

        EventLoop::with_user_event().with_any_thread(true).build()?
    };

    #[cfg(all(feature = "integration-tests", target_os = "windows"))]
    let event_loop: EventLoop<ViewerEvent> = {
        use winit::platform::windows::EventLoopBuilderExtWindows;

        EventLoop::with_user_event().with_any_thread(true).build()?
    };

    #[cfg(not(all(
        feature = "integration-tests",
        any(target_os = "linux", target_os = "windows")
    )))]
    let event_loop: EventLoop<ViewerEvent> = EventLoop::with_user_event().build()?;

    let mut app = App::new(&event_loop, config)?;

    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
