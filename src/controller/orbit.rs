use glam::Vec3;

use crate::config::{OrbitConfig, ViewerConfig};
use crate::model::{Camera, Transform};

const MAX_ELEVATION: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// Damped orbit camera for the desktop view. Produces the camera pose
/// relative to the rig.
pub struct OrbitController {
    pub enabled: bool,
    config: OrbitConfig,
    home_eye: Vec3,
    home_target: Vec3,
    target: Vec3,
    yaw: f32,
    elevation: f32,
    distance: f32,
    // input not yet applied
    pending_yaw: f32,
    pending_elevation: f32,
}

impl OrbitController {
    pub fn new(config: &ViewerConfig) -> Self {
        let mut orbit = Self {
            enabled: true,
            config: config.orbit.clone(),
            home_eye: config.camera_home(),
            home_target: config.orbit_target(),
            target: config.orbit_target(),
            yaw: 0.0,
            elevation: 0.0,
            distance: 1.0,
            pending_yaw: 0.0,
            pending_elevation: 0.0,
        };
        orbit.reset();
        orbit
    }

    /// Back to the home eye and target, dropping any motion in flight
    pub fn reset(&mut self) {
        let offset = self.home_eye - self.home_target;
        self.target = self.home_target;
        self.distance = offset.length().clamp(self.config.min_distance, self.config.max_distance);
        self.yaw = offset.x.atan2(offset.z);
        self.elevation = (offset.y / offset.length().max(f32::EPSILON))
            .clamp(-1.0, 1.0)
            .asin()
            .clamp(-MAX_ELEVATION, MAX_ELEVATION);
        self.pending_yaw = 0.0;
        self.pending_elevation = 0.0;
    }

    /// Mouse drag in pixels
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        if !self.enabled {
            return;
        }
        self.pending_yaw -= dx * self.config.rotate_speed;
        self.pending_elevation += dy * self.config.rotate_speed;
    }

    /// Wheel delta; positive moves away from the target
    pub fn zoom(&mut self, delta_y: f32) {
        if !self.enabled {
            return;
        }
        let factor = (delta_y * self.config.zoom_speed).exp();
        self.distance = (self.distance * factor).clamp(self.config.min_distance, self.config.max_distance);
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn eye(&self) -> Vec3 {
        let (sin_y, cos_y) = self.yaw.sin_cos();
        let (sin_e, cos_e) = self.elevation.sin_cos();
        self.target + Vec3::new(cos_e * sin_y, sin_e, cos_e * cos_y) * self.distance
    }

    /// Advance damping by `frames` reference frames and return the camera pose
    pub fn update(&mut self, frames: f32) -> Transform {
        let keep = (1.0 - self.config.damping).powf(frames.max(0.0));
        let applied = 1.0 - keep;

        self.yaw += self.pending_yaw * applied;
        self.elevation = (self.elevation + self.pending_elevation * applied).clamp(-MAX_ELEVATION, MAX_ELEVATION);
        self.pending_yaw *= keep;
        self.pending_elevation *= keep;

        Camera::look_at(self.eye(), self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orbit() -> OrbitController {
        OrbitController::new(&ViewerConfig::default())
    }

    #[test]
    fn test_starts_at_home() {
        let mut o = orbit();
        let pose = o.update(1.0);
        assert!(pose.translation.abs_diff_eq(Vec3::new(0.5, 1.6, 1.5), 1e-5));
    }

    #[test]
    fn test_rotation_is_damped() {
        let mut o = orbit();
        let start = o.eye();
        o.rotate(100.0, 0.0);
        o.update(1.0);
        let first = o.eye();
        assert!(!first.abs_diff_eq(start, 1e-6));

        // partial after one frame, converges after many
        let yaw_after_one = o.yaw;
        o.update(500.0);
        let total = yaw_after_one - o.yaw;
        assert!(total.abs() > 0.0);
        assert!((o.pending_yaw).abs() < 1e-6);
        // distance is untouched by rotation
        assert!((o.eye() - o.target).length() - o.distance() < 1e-5);
    }

    #[test]
    fn test_zoom_clamps() {
        let mut o = orbit();
        o.zoom(-100_000.0);
        assert_eq!(o.distance(), 0.3);
        o.zoom(100_000.0);
        assert_eq!(o.distance(), 5.0);
    }

    #[test]
    fn test_disabled_ignores_input() {
        let mut o = orbit();
        o.enabled = false;
        let before = o.eye();
        o.rotate(300.0, 200.0);
        o.zoom(1000.0);
        o.update(100.0);
        assert!(o.eye().abs_diff_eq(before, 1e-6));
    }

    #[test]
    fn test_elevation_is_limited() {
        let mut o = orbit();
        o.rotate(0.0, 100_000.0);
        o.update(1000.0);
        assert!(o.elevation <= MAX_ELEVATION);
        let pose = o.update(1.0);
        assert!(pose.translation.is_finite());
    }

    #[test]
    fn test_reset_restores_home() {
        let mut o = orbit();
        o.rotate(250.0, -80.0);
        o.zoom(500.0);
        o.update(30.0);
        o.reset();
        let pose = o.update(1.0);
        assert!(pose.translation.abs_diff_eq(Vec3::new(0.5, 1.6, 1.5), 1e-5));
    }
}
