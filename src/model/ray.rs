use glam::{Mat4, Vec3};

/// A ray in 3D space. `direction` is not required to be unit length so that
/// hit parameters survive affine transforms unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Ray starting at the translation of `world` and pointing along its -Z axis
    pub fn from_pose(world: &Mat4) -> Self {
        let origin = world.transform_point3(Vec3::ZERO);
        let direction = world.transform_vector3(Vec3::NEG_Z).normalize_or_zero();
        Self { origin, direction }
    }

    /// Möller-Trumbore test against triangle `abc`, front and back faces alike.
    /// Returns the hit parameter, or None when the triangle is missed, behind
    /// the origin or degenerate.
    pub fn intersect_triangle(&self, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
        const EPS: f32 = 1e-6;
        let e1 = b - a;
        let e2 = c - a;
        let p = self.direction.cross(e2);
        let det = e1.dot(p);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;

        let s = self.origin - a;
        let u = s.dot(p) * inv;
        if !(-EPS..=1.0 + EPS).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = self.direction.dot(q) * inv;
        if v < -EPS || u + v > 1.0 + EPS {
            return None;
        }
        let t = e2.dot(q) * inv;
        (t >= 0.0).then_some(t)
    }

    /// Same ray expressed in the space `m` maps into. The parameter `t` of a
    /// point is preserved.
    pub fn transformed(&self, m: &Mat4) -> Self {
        Self {
            origin: m.transform_point3(self.origin),
            direction: m.transform_vector3(self.direction),
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb { min: self.min.min(other.min), max: self.max.max(other.max) }
    }

    /// Bounds of the eight transformed corners
    pub fn transformed(&self, m: &Mat4) -> Aabb {
        let corners = (0..8).map(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        });
        let pts: Vec<Vec3> = corners.map(|c| m.transform_point3(c)).collect();
        Aabb::from_points(pts).unwrap_or(*self)
    }

    /// Slab test. Returns the entry parameter (clamped to 0 when the origin is
    /// inside the box), or None when the box is missed or behind the ray.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let o = ray.origin[axis];
            let d = ray.direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if d.abs() < 1e-12 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / d;
            let (t0, t1) = {
                let a = (lo - o) * inv;
                let b = (hi - o) * inv;
                if a < b { (a, b) } else { (b, a) }
            };
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        if t_max < 0.0 {
            None
        } else {
            Some(t_min.max(0.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5))
    }

    #[test]
    fn test_ray_hits_box_in_front() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        let t = unit_box().intersect_ray(&ray).unwrap();
        assert!((t - 4.5).abs() < 1e-5);
    }

    #[test]
    fn test_ray_misses_box_behind() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        assert!(unit_box().intersect_ray(&ray).is_none());
    }

    #[test]
    fn test_ray_parallel_outside_slab() {
        let ray = Ray::new(Vec3::new(2.0, 0.0, 5.0), Vec3::NEG_Z);
        assert!(unit_box().intersect_ray(&ray).is_none());
    }

    #[test]
    fn test_origin_inside_box() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        assert_eq!(unit_box().intersect_ray(&ray), Some(0.0));
    }

    #[test]
    fn test_transformed_ray_keeps_parameter() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z);
        let m = Mat4::from_scale(Vec3::splat(2.0));
        let local = ray.transformed(&m.inverse());
        let t_world = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)).intersect_ray(&ray).unwrap();
        let t_local = unit_box().intersect_ray(&local).unwrap();
        assert!((t_world - t_local).abs() < 1e-5);
    }

    #[test]
    fn test_triangle_hit_and_miss() {
        let (a, b, c) = (Vec3::ZERO, Vec3::X, Vec3::Y);
        let ray = Ray::new(Vec3::new(0.25, 0.25, 2.0), Vec3::NEG_Z);
        assert!((ray.intersect_triangle(a, b, c).unwrap() - 2.0).abs() < 1e-6);
        // back face counts too
        assert!(ray.intersect_triangle(a, c, b).is_some());
        // inside the bounding square but beyond the hypotenuse
        let corner = Ray::new(Vec3::new(0.8, 0.8, 2.0), Vec3::NEG_Z);
        assert!(corner.intersect_triangle(a, b, c).is_none());
        // triangle behind the origin
        let away = Ray::new(Vec3::new(0.25, 0.25, 2.0), Vec3::Z);
        assert!(away.intersect_triangle(a, b, c).is_none());
    }

    #[test]
    fn test_triangle_parameter_uses_unnormalised_direction() {
        let ray = Ray::new(Vec3::new(0.25, 0.25, 2.0), Vec3::new(0.0, 0.0, -4.0));
        let t = ray.intersect_triangle(Vec3::ZERO, Vec3::X, Vec3::Y).unwrap();
        assert!((t - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_pose_ray_points_down_negative_z() {
        let pose = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let ray = Ray::from_pose(&pose);
        assert!(ray.direction.abs_diff_eq(Vec3::NEG_X, 1e-5));
    }
}
