//! Orbit camera controller.
//!
//! The controller keeps the camera on a sphere around its target point.
//! Pointer gestures accumulate deltas (azimuth, polar angle, zoom scale,
//! target pan) and [`OrbitController::update`], called once per frame, folds
//! them into the camera subject to the configured limits. With damping
//! enabled only a fraction of each pending delta is applied per frame and the
//! rest decays, so motion eases out over several frames.

use std::f32::consts::{PI, TAU};

use cgmath::{InnerSpace, Vector3, Zero};
use serde::Deserialize;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

use crate::camera::{Camera, Projection};

const EPS: f32 = 1e-6;

/// What a mouse button drag does.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MouseAction {
    Rotate,
    Dolly,
    Pan,
}

/// Button assignment. An unbound button does nothing.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MouseBindings {
    pub left: Option<MouseAction>,
    pub middle: Option<MouseAction>,
    pub right: Option<MouseAction>,
}

impl Default for MouseBindings {
    fn default() -> Self {
        Self {
            left: Some(MouseAction::Rotate),
            middle: Some(MouseAction::Dolly),
            right: Some(MouseAction::Pan),
        }
    }
}

impl MouseBindings {
    pub fn action_for(&self, button: MouseButton) -> Option<MouseAction> {
        match button {
            MouseButton::Left => self.left,
            MouseButton::Middle => self.middle,
            MouseButton::Right => self.right,
            _ => None,
        }
    }
}

/// Named starting points for [`OrbitSettings`].
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrbitPreset {
    /// Free orbit close to the house, no pan, no damping.
    #[default]
    Primary,
    /// See [`OrbitSettings::ground`].
    Ground,
}

impl OrbitPreset {
    pub fn settings(self) -> OrbitSettings {
        match self {
            OrbitPreset::Primary => OrbitSettings::default(),
            OrbitPreset::Ground => OrbitSettings::ground(),
        }
    }
}

/// Limits and behaviour of the [`OrbitController`]. Angles are radians.
///
/// In TOML a `preset` key picks the base settings and every other key
/// overrides one field of it. A `mouse_buttons` table replaces the preset's
/// bindings; buttons it leaves out get the primary bindings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(from = "OrbitSettingsFile")]
pub struct OrbitSettings {
    pub min_distance: f32,
    pub max_distance: f32,
    /// Angle from the up axis; `0` looks straight down.
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub min_azimuth_angle: f32,
    pub max_azimuth_angle: f32,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_rotate: bool,
    pub enable_zoom: bool,
    pub enable_pan: bool,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub mouse_buttons: MouseBindings,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            min_distance: 0.0,
            max_distance: 9.0,
            min_polar_angle: 0.0,
            max_polar_angle: PI / 2.0,
            min_azimuth_angle: f32::NEG_INFINITY,
            max_azimuth_angle: f32::INFINITY,
            enable_damping: false,
            damping_factor: 0.05,
            enable_rotate: true,
            enable_zoom: true,
            enable_pan: false,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            mouse_buttons: MouseBindings::default(),
        }
    }
}

impl OrbitSettings {
    /// Damped navigation that keeps the eye above the ground and away from a
    /// top-down view. Middle button rotates, right button pans.
    pub fn ground() -> Self {
        Self {
            min_distance: 5.0,
            max_distance: 60.0,
            min_polar_angle: PI / 4.0,
            max_polar_angle: PI / 2.0 - 0.05,
            enable_damping: true,
            enable_pan: true,
            mouse_buttons: MouseBindings {
                left: None,
                middle: Some(MouseAction::Rotate),
                right: Some(MouseAction::Pan),
            },
            ..Self::default()
        }
    }

    /// Replaces values [`OrbitController::update`] cannot clamp with: NaN
    /// limits, negative distances, polar limits outside `0..=PI`, inverted
    /// ranges and unusable speeds.
    fn sanitized(mut self) -> Self {
        let fallback = Self::default();
        if !(self.min_distance >= 0.0 && self.min_distance.is_finite()) {
            log::warn!("orbit min_distance {} is unusable, using 0", self.min_distance);
            self.min_distance = 0.0;
        }
        if self.max_distance.is_nan() || self.max_distance < 0.0 {
            log::warn!("orbit max_distance {} is unusable, leaving it open", self.max_distance);
            self.max_distance = f32::INFINITY;
        }
        if self.min_distance > self.max_distance {
            log::warn!("orbit distance limits are inverted, swapping them");
            std::mem::swap(&mut self.min_distance, &mut self.max_distance);
        }

        self.min_polar_angle = polar_or(self.min_polar_angle, 0.0);
        self.max_polar_angle = polar_or(self.max_polar_angle, PI);
        if self.min_polar_angle > self.max_polar_angle {
            log::warn!("orbit polar limits are inverted, swapping them");
            std::mem::swap(&mut self.min_polar_angle, &mut self.max_polar_angle);
        }

        if !(0.0..=1.0).contains(&self.damping_factor) {
            self.damping_factor = fallback.damping_factor;
        }
        for speed in [&mut self.rotate_speed, &mut self.zoom_speed, &mut self.pan_speed] {
            if !speed.is_finite() {
                *speed = 1.0;
            }
        }
        self
    }
}

fn polar_or(angle: f32, fallback: f32) -> f32 {
    if angle.is_nan() {
        log::warn!("orbit polar limit is NaN, using {}", fallback);
        fallback
    } else {
        angle.clamp(0.0, PI)
    }
}

/// The TOML shape of [`OrbitSettings`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrbitSettingsFile {
    preset: OrbitPreset,
    min_distance: Option<f32>,
    max_distance: Option<f32>,
    min_polar_angle: Option<f32>,
    max_polar_angle: Option<f32>,
    min_azimuth_angle: Option<f32>,
    max_azimuth_angle: Option<f32>,
    enable_damping: Option<bool>,
    damping_factor: Option<f32>,
    enable_rotate: Option<bool>,
    enable_zoom: Option<bool>,
    enable_pan: Option<bool>,
    rotate_speed: Option<f32>,
    zoom_speed: Option<f32>,
    pan_speed: Option<f32>,
    mouse_buttons: Option<MouseBindings>,
}

impl From<OrbitSettingsFile> for OrbitSettings {
    fn from(file: OrbitSettingsFile) -> Self {
        let base = file.preset.settings();
        Self {
            min_distance: file.min_distance.unwrap_or(base.min_distance),
            max_distance: file.max_distance.unwrap_or(base.max_distance),
            min_polar_angle: file.min_polar_angle.unwrap_or(base.min_polar_angle),
            max_polar_angle: file.max_polar_angle.unwrap_or(base.max_polar_angle),
            min_azimuth_angle: file.min_azimuth_angle.unwrap_or(base.min_azimuth_angle),
            max_azimuth_angle: file.max_azimuth_angle.unwrap_or(base.max_azimuth_angle),
            enable_damping: file.enable_damping.unwrap_or(base.enable_damping),
            damping_factor: file.damping_factor.unwrap_or(base.damping_factor),
            enable_rotate: file.enable_rotate.unwrap_or(base.enable_rotate),
            enable_zoom: file.enable_zoom.unwrap_or(base.enable_zoom),
            enable_pan: file.enable_pan.unwrap_or(base.enable_pan),
            rotate_speed: file.rotate_speed.unwrap_or(base.rotate_speed),
            zoom_speed: file.zoom_speed.unwrap_or(base.zoom_speed),
            pan_speed: file.pan_speed.unwrap_or(base.pan_speed),
            mouse_buttons: file.mouse_buttons.unwrap_or(base.mouse_buttons),
        }
    }
}

/// Radius, polar angle from +Y and azimuth around +Y.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Spherical {
    radius: f32,
    phi: f32,
    theta: f32,
}

impl Spherical {
    fn from_offset(offset: Vector3<f32>) -> Self {
        let radius = offset.magnitude();
        if radius == 0.0 {
            return Self {
                radius,
                phi: 0.0,
                theta: 0.0,
            };
        }
        Self {
            radius,
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
            theta: offset.x.atan2(offset.z),
        }
    }

    fn to_offset(self) -> Vector3<f32> {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vector3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Drag {
    action: Option<MouseAction>,
    button: Option<MouseButton>,
}

/// The Camera Controller.
#[derive(Debug)]
pub struct OrbitController {
    settings: OrbitSettings,
    delta_theta: f32,
    delta_phi: f32,
    scale: f32,
    pan_offset: Vector3<f32>,
    drag: Drag,
    cursor: Option<(f64, f64)>,
    viewport_height: f32,
}

impl OrbitController {
    pub fn new(settings: OrbitSettings) -> Self {
        Self {
            settings: settings.sanitized(),
            delta_theta: 0.0,
            delta_phi: 0.0,
            scale: 1.0,
            pan_offset: Vector3::zero(),
            drag: Drag::default(),
            cursor: None,
            viewport_height: 1.0,
        }
    }

    pub fn settings(&self) -> &OrbitSettings {
        &self.settings
    }

    /// Drag distances are measured relative to this height in pixels.
    pub fn set_viewport_height(&mut self, height: u32) {
        self.viewport_height = height.max(1) as f32;
    }

    /// Orbits by a pointer drag of `dx`, `dy` pixels.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        if !self.settings.enable_rotate {
            return;
        }
        let per_pixel = TAU / self.viewport_height * self.settings.rotate_speed;
        self.delta_theta -= dx * per_pixel;
        self.delta_phi -= dy * per_pixel;
    }

    /// Moves the target by a pointer drag of `dx`, `dy` pixels so that the
    /// point under the cursor follows it at the target's depth.
    pub fn pan(&mut self, dx: f32, dy: f32, camera: &Camera, projection: &Projection) {
        if !self.settings.enable_pan {
            return;
        }
        let half_fov = projection.fovy().0 / 2.0;
        let target_distance = camera.distance() * half_fov.tan();
        let per_pixel = 2.0 * target_distance / self.viewport_height * self.settings.pan_speed;
        let (right, up) = camera.screen_axes();
        self.pan_offset += right * (-dx * per_pixel) + up * (dy * per_pixel);
    }

    /// Zooms by a wheel step. Negative `delta_y` (wheel away from the user)
    /// moves closer.
    pub fn dolly(&mut self, delta_y: f32) {
        if !self.settings.enable_zoom || delta_y == 0.0 {
            return;
        }
        let step = 0.95_f32.powf(self.settings.zoom_speed);
        if delta_y < 0.0 {
            self.scale *= step;
        } else {
            self.scale /= step;
        }
    }

    pub fn pointer_down(&mut self, button: MouseButton, x: f64, y: f64) {
        if self.drag.action.is_some() {
            return;
        }
        self.drag = Drag {
            action: self.settings.mouse_buttons.action_for(button),
            button: Some(button),
        };
        self.cursor = Some((x, y));
    }

    pub fn pointer_move(&mut self, x: f64, y: f64, camera: &Camera, projection: &Projection) {
        let last = self.cursor.replace((x, y));
        let (Some(action), Some((last_x, last_y))) = (self.drag.action, last) else {
            return;
        };
        let (dx, dy) = ((x - last_x) as f32, (y - last_y) as f32);
        match action {
            MouseAction::Rotate => self.rotate(dx, dy),
            MouseAction::Pan => self.pan(dx, dy, camera, projection),
            MouseAction::Dolly => self.dolly(dy),
        }
    }

    pub fn pointer_up(&mut self, button: MouseButton) {
        if self.drag.button == Some(button) {
            self.drag = Drag::default();
        }
    }

    /// Feeds a window event into the controller. Returns whether it was a
    /// pointer event.
    pub fn handle_window_event(
        &mut self,
        event: &WindowEvent,
        camera: &Camera,
        projection: &Projection,
    ) -> bool {
        match event {
            WindowEvent::MouseInput { state, button, .. } => {
                match state {
                    ElementState::Pressed => {
                        let (x, y) = self.cursor.unwrap_or_default();
                        self.pointer_down(*button, x, y);
                    }
                    ElementState::Released => self.pointer_up(*button),
                }
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.pointer_move(position.x, position.y, camera, projection);
                true
            }
            WindowEvent::CursorLeft { .. } => {
                self.drag = Drag::default();
                self.cursor = None;
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                // winit reports scrolling away from the user as positive
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -*y,
                    MouseScrollDelta::PixelDelta(position) => -position.y as f32,
                };
                self.dolly(delta_y);
                true
            }
            _ => false,
        }
    }

    /// Applies pending input to `camera` within the configured limits.
    /// Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        let settings = &self.settings;
        let mut spherical = Spherical::from_offset(camera.offset());

        let factor = if settings.enable_damping {
            settings.damping_factor
        } else {
            1.0
        };
        spherical.theta += self.delta_theta * factor;
        spherical.phi += self.delta_phi * factor;

        spherical.theta = clamp_azimuth(
            spherical.theta,
            settings.min_azimuth_angle,
            settings.max_azimuth_angle,
        );
        spherical.phi = spherical
            .phi
            .clamp(settings.min_polar_angle, settings.max_polar_angle)
            .clamp(EPS, PI - EPS);
        spherical.radius = (spherical.radius * self.scale)
            .clamp(settings.min_distance, settings.max_distance)
            .max(EPS);

        let target = camera.target + self.pan_offset * factor;
        let position = target + spherical.to_offset();

        if settings.enable_damping {
            self.delta_theta *= 1.0 - factor;
            self.delta_phi *= 1.0 - factor;
            self.pan_offset *= 1.0 - factor;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vector3::zero();
        }
        self.scale = 1.0;

        let moved = (position - camera.position).magnitude2() > EPS
            || (target - camera.target).magnitude2() > EPS;
        camera.target = target;
        camera.position = position;
        moved
    }
}

fn clamp_azimuth(theta: f32, min: f32, max: f32) -> f32 {
    if !(min.is_finite() && max.is_finite()) {
        return theta;
    }
    let wrap = |angle: f32| {
        if angle < -PI {
            angle + TAU
        } else if angle > PI {
            angle - TAU
        } else {
            angle
        }
    };
    let (min, max) = (wrap(min), wrap(max));
    if min <= max {
        theta.clamp(min, max)
    } else if theta > (min + max) / 2.0 {
        theta.max(min)
    } else {
        theta.min(max)
    }
}
