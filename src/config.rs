use glam::Vec3;
use serde::Deserialize;

use crate::error::Result;

/// Runtime settings for the viewer. Every field has a default, so a partial
/// TOML file only overrides what it names.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    pub model_path: String,
    pub mount_id: String,
    /// Height of the fitted model in meters
    pub model_height: f32,
    pub group_home: [f32; 3],
    pub camera_home: [f32; 3],
    pub orbit_target: [f32; 3],
    pub interaction: InteractionConfig,
    pub orbit: OrbitConfig,
    pub animation: AnimationConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InteractionConfig {
    pub deadzone: f32,
    /// Rig displacement per reference frame at full stick deflection
    pub move_speed: f32,
    pub move_axes: [usize; 2],
    pub reset_button: usize,
    pub scale_button: usize,
    pub scale_rate: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub reference_fps: f32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrbitConfig {
    pub damping: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnimationConfig {
    pub placeholder_spin: f32,
    pub idle_spin: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            model_path: "models/lung.glb".to_string(),
            mount_id: "canvas-container".to_string(),
            model_height: 0.30,
            group_home: [0.0, 1.3, 0.0],
            camera_home: [0.5, 1.6, 1.5],
            orbit_target: [0.0, 1.3, 0.0],
            interaction: InteractionConfig::default(),
            orbit: OrbitConfig::default(),
            animation: AnimationConfig::default(),
        }
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            deadzone: 0.1,
            move_speed: 0.02,
            move_axes: [2, 3],
            reset_button: 4,
            scale_button: 1,
            scale_rate: 0.01,
            min_scale: 0.1,
            max_scale: 3.0,
            reference_fps: 60.0,
        }
    }
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            damping: 0.08,
            min_distance: 0.3,
            max_distance: 5.0,
            rotate_speed: 0.005,
            zoom_speed: 0.001,
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            placeholder_spin: 0.01,
            idle_spin: 0.002,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        Ok(toml::from_str(src)?)
    }

    /// Read `path` if it exists, otherwise fall back to defaults.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_or_default(path: &std::path::Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(src) => Self::from_toml_str(&src),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn group_home(&self) -> Vec3 { Vec3::from_array(self.group_home) }

    pub fn camera_home(&self) -> Vec3 { Vec3::from_array(self.camera_home) }

    pub fn orbit_target(&self) -> Vec3 { Vec3::from_array(self.orbit_target) }
}

impl InteractionConfig {
    /// Number of reference frames covered by `dt` seconds
    pub fn frame_scale(&self, dt: f32) -> f32 {
        dt * self.reference_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = ViewerConfig::from_toml_str(
            r#"
            model_path = "assets/other.glb"

            [interaction]
            deadzone = 0.2
            "#,
        )
        .unwrap();

        assert_eq!(cfg.model_path, "assets/other.glb");
        assert_eq!(cfg.interaction.deadzone, 0.2);
        assert_eq!(cfg.interaction.max_scale, 3.0);
        assert_eq!(cfg.orbit, OrbitConfig::default());
        assert_eq!(cfg.group_home(), Vec3::new(0.0, 1.3, 0.0));
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let err = ViewerConfig::from_toml_str("interaction = 3").unwrap_err();
        assert!(matches!(err, crate::error::ViewerError::Config(_)));
    }

    #[test]
    fn test_frame_scale_at_reference_rate() {
        let cfg = InteractionConfig::default();
        assert!((cfg.frame_scale(1.0 / 60.0) - 1.0).abs() < 1e-6);
    }
}
