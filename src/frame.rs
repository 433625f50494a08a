//! The per-frame driver.
//!
//! The host calls [`FrameLoop::tick`] once per display refresh. Each tick
//! advances the orbit controller, refreshes the projection, renders and then
//! updates the diagnostics, always in that order. `&mut self` keeps ticks from
//! overlapping.

use crate::{context::ViewerContext, diagnostics::FrameStats, render::RenderBackend};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutcome {
    Drawn { stats: Option<FrameStats> },
    /// The backend reported an error. The frame still counts.
    RenderFailed { stats: Option<FrameStats> },
    /// The loop was stopped; nothing happened.
    Stopped,
}

impl TickOutcome {
    /// The diagnostics sample completed by this tick, if any.
    pub fn stats(&self) -> Option<FrameStats> {
        match self {
            TickOutcome::Drawn { stats } | TickOutcome::RenderFailed { stats } => *stats,
            TickOutcome::Stopped => None,
        }
    }
}

#[derive(Debug)]
pub struct FrameLoop {
    running: bool,
    frames: u64,
    limit: Option<u64>,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLoop {
    pub fn new() -> Self {
        Self {
            running: true,
            frames: 0,
            limit: None,
        }
    }

    /// A loop that stops itself after `limit` ticks. `None` runs until
    /// [`FrameLoop::stop`].
    pub fn with_limit(limit: Option<u64>) -> Self {
        Self {
            limit,
            ..Self::new()
        }
    }

    pub fn tick(&mut self, ctx: &mut ViewerContext, backend: &mut dyn RenderBackend) -> TickOutcome {
        if ctx.is_torn_down() {
            self.stop();
        }
        if !self.running {
            return TickOutcome::Stopped;
        }

        ctx.controller.update(&mut ctx.camera);
        ctx.projection.refresh();

        let rendered = backend.render(&ctx.scene, &ctx.camera, &ctx.projection);
        if let Err(e) = &rendered {
            log::error!("Unable to render frame {}: {}", self.frames, e);
        }

        let stats = ctx.diagnostics.update();

        self.frames += 1;
        if self.limit.is_some_and(|limit| self.frames >= limit) {
            log::info!("Frame limit of {} reached", self.frames);
            self.stop();
        }

        match rendered {
            Ok(()) => TickOutcome::Drawn { stats },
            Err(_) => TickOutcome::RenderFailed { stats },
        }
    }

    /// Stops scheduling. Further ticks do nothing. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.running {
            log::info!("Frame loop stopped after {} frames", self.frames);
        }
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
