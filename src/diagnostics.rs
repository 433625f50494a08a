//! Frame-rate diagnostics.
//!
//! [`Diagnostics`] is the model behind the on-screen counter: it is ticked
//! once per frame and publishes a [`FrameStats`] sample roughly once per
//! second. How the sample is shown is up to the shell.

use std::fmt;

use instant::{Duration, Instant};

const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    /// Mean time between frames in milliseconds.
    pub frame_ms: f32,
}

impl fmt::Display for FrameStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0} FPS ({:.1} ms)", self.fps, self.frame_ms)
    }
}

#[derive(Debug)]
pub struct Diagnostics {
    window_start: Option<Instant>,
    frames_in_window: u32,
    total_frames: u64,
    latest: Option<FrameStats>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            window_start: None,
            frames_in_window: 0,
            total_frames: 0,
            latest: None,
        }
    }

    pub fn update(&mut self) -> Option<FrameStats> {
        self.update_at(Instant::now())
    }

    /// Counts one frame at `now`. Returns a fresh sample when a full window
    /// has elapsed since the previous one. The very first frame only opens
    /// the window.
    pub fn update_at(&mut self, now: Instant) -> Option<FrameStats> {
        self.total_frames += 1;
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };
        self.frames_in_window += 1;

        let elapsed = now.duration_since(start);
        if elapsed < SAMPLE_WINDOW {
            return None;
        }
        let seconds = elapsed.as_secs_f32();
        let stats = FrameStats {
            fps: self.frames_in_window as f32 / seconds,
            frame_ms: seconds * 1000.0 / self.frames_in_window as f32,
        };
        log::debug!("{}", stats);
        self.latest = Some(stats);
        self.window_start = Some(now);
        self.frames_in_window = 0;
        Some(stats)
    }

    pub fn latest(&self) -> Option<FrameStats> {
        self.latest
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}
