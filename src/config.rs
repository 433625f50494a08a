//! Viewer configuration.
//!
//! [`ViewerConfig`] is read from TOML. Every section and every field has a
//! default, so an empty file (or no file at all) yields the stock house
//! scene. Set `HOUSE_VIEWER_CONFIG` to point [`ViewerConfig::from_env`] at a
//! file.
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [controls]
//! preset = "ground"
//! max_distance = 12.0
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::{
    controls::OrbitSettings,
    error::{Result, ViewerError},
};

pub const CONFIG_ENV_VAR: &str = "HOUSE_VIEWER_CONFIG";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    pub window: WindowConfig,
    pub camera: CameraConfig,
    pub controls: OrbitSettings,
    pub scene: SceneConfig,
    pub assets: AssetsConfig,
    pub decoder: DecoderConfig,
    pub renderer: RendererConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Tear the viewer down after this many frames. Runs forever if unset.
    pub exit_after_frames: Option<u64>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "house-viewer".to_string(),
            width: 800,
            height: 600,
            exit_after_frames: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 40.0,
            near: 0.1,
            far: 100.0,
            position: [0.0, 0.0, 8.0],
            target: [0.0, 0.5, 0.0],
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct FogConfig {
    pub color: u32,
    pub near: f32,
    pub far: f32,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            color: 0x333333,
            near: 10.0,
            far: 20.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GroundConfig {
    /// Edge length of the square ground plane.
    pub size: f32,
    /// How often the ground texture tiles across the plane, per axis.
    pub texture_repeat: f32,
    pub anisotropy: u16,
    /// Hue, saturation, lightness in `0.0..=1.0`.
    pub color_hsl: [f32; 3],
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            size: 10_000.0,
            texture_repeat: 10_000.0,
            anisotropy: 16,
            color_hsl: [0.095, 1.0, 0.75],
        }
    }
}

/// Placement applied to the imported model once it is loaded.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelPlacement {
    pub scale: f32,
    pub position: [f32; 3],
    /// Euler angles handed to the rotation unchanged, i.e. read as radians.
    pub rotation: [f32; 3],
}

impl Default for ModelPlacement {
    fn default() -> Self {
        Self {
            scale: 0.1,
            position: [0.0, -0.04, 0.0],
            rotation: [0.0, -90.0, 0.0],
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    pub background: u32,
    pub fog: Option<FogConfig>,
    pub ground: GroundConfig,
    pub model: ModelPlacement,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            background: 0x333333,
            fog: Some(FogConfig::default()),
            ground: GroundConfig::default(),
            model: ModelPlacement::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssetsConfig {
    /// Directory all asset paths are relative to. On the web this is a path
    /// below the page origin.
    pub root: String,
    pub model: String,
    /// The model's meshes are compressed and need the external decoder.
    pub model_compressed: bool,
    pub environment: String,
    pub ground_texture: String,
    /// Glyph resource reserved for text labels. Accepted but never loaded.
    pub font: Option<String>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: "assets".to_string(),
            model: "models/house.glb".to_string(),
            model_compressed: true,
            environment: "textures/texture.hdr".to_string(),
            ground_texture: "Images/land.jpeg".to_string(),
            font: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecoderConfig {
    /// Location of the compressed-mesh decoder, relative to the asset root.
    pub path: Option<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            path: Some("draco/".to_string()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    pub shadows: bool,
    pub antialias: bool,
    pub exposure: f32,
    /// Overrides the host's device pixel ratio.
    pub pixel_ratio: Option<f64>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            shadows: true,
            antialias: true,
            exposure: 0.85,
            pixel_ratio: None,
        }
    }
}

impl ViewerConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: ViewerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ViewerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Loads the file named by `HOUSE_VIEWER_CONFIG`, or the defaults when the
    /// variable is unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => {
                log::info!("Loading configuration from {}", path);
                Self::load(path)
            }
            Err(_) => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let camera = &self.camera;
        if !(camera.fov_degrees > 0.0 && camera.fov_degrees < 180.0) {
            return Err(ViewerError::Config(format!(
                "camera.fov_degrees must be in (0, 180), got {}",
                camera.fov_degrees
            )));
        }
        if !(camera.near > 0.0 && camera.far > camera.near && camera.far.is_finite()) {
            return Err(ViewerError::Config(format!(
                "camera clip planes need 0 < near < far < inf, got near {} and far {}",
                camera.near, camera.far
            )));
        }

        // written so that NaN fails every check
        let controls = &self.controls;
        let distances_ok = controls.min_distance >= 0.0
            && controls.min_distance.is_finite()
            && controls.max_distance >= controls.min_distance;
        if !distances_ok {
            return Err(ViewerError::Config(format!(
                "controls distance range {}..{} is empty or not a number",
                controls.min_distance, controls.max_distance
            )));
        }
        let polar_ok = controls.min_polar_angle >= 0.0
            && controls.max_polar_angle <= std::f32::consts::PI
            && controls.min_polar_angle <= controls.max_polar_angle;
        if !polar_ok {
            return Err(ViewerError::Config(format!(
                "controls polar range {}..{} must lie within 0..PI",
                controls.min_polar_angle, controls.max_polar_angle
            )));
        }
        if controls.min_azimuth_angle.is_nan() || controls.max_azimuth_angle.is_nan() {
            return Err(ViewerError::Config(
                "controls azimuth limits must be numbers".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&controls.damping_factor) {
            return Err(ViewerError::Config(format!(
                "controls.damping_factor must be in 0..=1, got {}",
                controls.damping_factor
            )));
        }
        let speeds = [controls.rotate_speed, controls.zoom_speed, controls.pan_speed];
        if !speeds.iter().all(|speed| speed.is_finite()) {
            return Err(ViewerError::Config(format!(
                "controls speeds must be finite, got {:?}",
                speeds
            )));
        }

        if let Some(fog) = &self.scene.fog {
            if !(fog.near <= fog.far) {
                return Err(ViewerError::Config(format!(
                    "fog starts at {} but ends at {}",
                    fog.near, fog.far
                )));
            }
        }

        let decoder_missing = self
            .decoder
            .path
            .as_deref()
            .is_none_or(|path| path.trim().is_empty());
        if self.assets.model_compressed && decoder_missing {
            return Err(ViewerError::DecoderNotConfigured {
                path: self.assets.model.clone(),
            });
        }
        Ok(())
    }
}
