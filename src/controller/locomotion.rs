use glam::{Mat4, Vec2, Vec3};

use crate::config::InteractionConfig;
use crate::controller::xr_input::GamepadSnapshot;
use crate::model::Camera;

/// Values whose magnitude does not exceed `deadzone` read as zero
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() > deadzone {
        value
    } else {
        0.0
    }
}

/// Forward and right vectors on the floor plane for a camera with the given
/// world matrix. Both are zero when the camera looks straight up or down.
pub fn horizontal_basis(camera_world: &Mat4) -> (Vec3, Vec3) {
    let mut forward = Camera::world_direction(camera_world);
    forward.y = 0.0;
    let forward = forward.normalize_or_zero();
    let right = forward.cross(Vec3::Y).normalize_or_zero();
    (forward, right)
}

/// Thumbstick driven rig translation
#[derive(Debug, Clone)]
pub struct Locomotion {
    pub deadzone: f32,
    pub speed: f32,
    pub axes: [usize; 2],
}

impl Locomotion {
    pub fn from_config(config: &InteractionConfig) -> Self {
        Self {
            deadzone: config.deadzone,
            speed: config.move_speed,
            axes: config.move_axes,
        }
    }

    /// Stick deflection with the deadzone applied per axis
    pub fn stick(&self, gamepad: &GamepadSnapshot) -> Vec2 {
        Vec2::new(
            apply_deadzone(gamepad.axis(self.axes[0]), self.deadzone),
            apply_deadzone(gamepad.axis(self.axes[1]), self.deadzone),
        )
    }

    /// Rig displacement for one gamepad over `frames` reference frames.
    /// Pushing the stick forward reports a negative y and moves the rig
    /// along the camera's view.
    pub fn displacement(&self, gamepad: &GamepadSnapshot, camera_world: &Mat4, frames: f32) -> Vec3 {
        let stick = self.stick(gamepad);
        if stick == Vec2::ZERO {
            return Vec3::ZERO;
        }
        let (forward, right) = horizontal_basis(camera_world);
        (right * stick.x - forward * stick.y) * self.speed * frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(x: f32, y: f32) -> GamepadSnapshot {
        GamepadSnapshot { buttons: Vec::new(), axes: vec![0.0, 0.0, x, y] }
    }

    fn loco() -> Locomotion {
        Locomotion::from_config(&InteractionConfig::default())
    }

    #[test]
    fn test_deadzone_boundary() {
        assert_eq!(apply_deadzone(0.1, 0.1), 0.0);
        assert_eq!(apply_deadzone(-0.1, 0.1), 0.0);
        assert_eq!(apply_deadzone(0.05, 0.1), 0.0);
        assert_eq!(apply_deadzone(0.11, 0.1), 0.11);
        assert_eq!(apply_deadzone(-0.5, 0.1), -0.5);
    }

    #[test]
    fn test_small_input_does_not_move() {
        let d = loco().displacement(&pad(0.1, -0.1), &Mat4::IDENTITY, 1.0);
        assert_eq!(d, Vec3::ZERO);
    }

    #[test]
    fn test_forward_push_moves_along_view() {
        // identity camera looks down -Z
        let d = loco().displacement(&pad(0.0, -1.0), &Mat4::IDENTITY, 1.0);
        assert!(d.abs_diff_eq(Vec3::new(0.0, 0.0, -0.02), 1e-6));
    }

    #[test]
    fn test_right_push_strafes() {
        let d = loco().displacement(&pad(1.0, 0.0), &Mat4::IDENTITY, 1.0);
        assert!(d.abs_diff_eq(Vec3::new(0.02, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn test_only_live_axis_contributes() {
        // x inside the deadzone, y outside
        let d = loco().displacement(&pad(0.08, 0.5), &Mat4::IDENTITY, 1.0);
        assert_eq!(d.x, 0.0);
        assert!(d.z > 0.0);
    }

    #[test]
    fn test_pitch_is_ignored_and_time_scales() {
        let tilted = Mat4::from_rotation_x(-0.6);
        let d = loco().displacement(&pad(0.0, -1.0), &tilted, 2.0);
        assert_eq!(d.y, 0.0);
        assert!(d.abs_diff_eq(Vec3::new(0.0, 0.0, -0.04), 1e-6));
    }

    #[test]
    fn test_missing_axes_read_as_centered() {
        let d = loco().displacement(&GamepadSnapshot::default(), &Mat4::IDENTITY, 1.0);
        assert_eq!(d, Vec3::ZERO);
    }
}
