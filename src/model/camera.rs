use glam::{Mat4, Vec3};

use crate::model::Transform;

/// Projection parameters. The camera's pose lives in the scene graph as a
/// child of the rig.
pub struct Camera {
    pub fov_y: f32,
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            fov_y: 60f32.to_radians(),
            aspect: width as f32 / height.max(1) as f32,
            z_near: 0.01,
            z_far: 100.0,
        }
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) { self.aspect = width as f32 / height.max(1) as f32; }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far)
    }

    /// `camera_world` is the world matrix of the camera node
    pub fn view_proj(&self, camera_world: &Mat4) -> Mat4 {
        self.projection() * camera_world.inverse()
    }

    /// Pose of a camera at `eye` looking at `target` (camera looks down its -Z)
    pub fn look_at(eye: Vec3, target: Vec3) -> Transform {
        Transform::from_matrix(Mat4::look_at_rh(eye, target, Vec3::Y).inverse())
    }

    /// Look direction of a camera with the given world matrix
    pub fn world_direction(camera_world: &Mat4) -> Vec3 {
        camera_world.transform_vector3(Vec3::NEG_Z).normalize_or_zero()
    }
}
