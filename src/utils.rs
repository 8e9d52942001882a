use std::f32::consts::TAU;

use bytemuck::NoUninit;
use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::model::{Aabb, Ray};

#[repr(C)]
#[derive(Debug, Clone, Copy, NoUninit)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex {
    pub fn new(pos: Vec3, normal: Vec3, color: [f32; 4]) -> Self {
        Self { pos: pos.to_array(), normal: normal.to_array(), color }
    }
}

/// How the index list of a mesh is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Triangles,
    Lines,
}

pub struct MeshBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub topology: Topology,
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub topology: Topology,
}

impl Mesh {
    pub fn empty(topology: Topology) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            topology,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().map(|v| Vec3::from_array(v.pos)))
    }

    /// Nearest triangle hit along `ray`, in mesh space. Line meshes never hit.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<f32> {
        if self.topology != Topology::Triangles {
            return None;
        }
        self.indices
            .chunks_exact(3)
            .filter_map(|tri| {
                let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| self.vertices.get(i as usize));
                let pos = |v: &Vertex| Vec3::from_array(v.pos);
                ray.intersect_triangle(pos(a?), pos(b?), pos(c?))
            })
            .min_by(|x, y| x.total_cmp(y))
    }

    pub fn upload(&self, device: &wgpu::Device) -> MeshBuffer {
        let vertices = bytemuck::cast_slice(&self.vertices);
        let indices = bytemuck::cast_slice(&self.indices);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: vertices,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: indices,
            usage: wgpu::BufferUsages::INDEX,
        });

        MeshBuffer {
            vertex_buffer,
            index_buffer,
            index_count: self.indices.len() as u32,
            topology: self.topology,
        }
    }
}

pub fn hex_color(rgb: u32) -> [f32; 4] {
    [
        ((rgb >> 16) & 0xff) as f32 / 255.0,
        ((rgb >> 8) & 0xff) as f32 / 255.0,
        (rgb & 0xff) as f32 / 255.0,
        1.0,
    ]
}

/// Axis-aligned box centered at the origin
pub fn create_box_mesh(size: Vec3, color: [f32; 4]) -> Mesh {
    let h = size * 0.5;
    // (normal, tangent u, tangent v) per face
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, u, v) in faces {
        let base = vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let p = (n + u * su + v * sv) * h;
            vertices.push(Vertex::new(p, n, color));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh { vertices, indices, topology: Topology::Triangles }
}

/// Horizontal square plane at y = 0
pub fn create_floor_mesh(size: f32, color: [f32; 4]) -> Mesh {
    let h = size * 0.5;
    let verts = [
        Vec3::new(-h, 0.0, h),
        Vec3::new(h, 0.0, h),
        Vec3::new(h, 0.0, -h),
        Vec3::new(-h, 0.0, -h),
    ];
    Mesh {
        vertices: verts.iter().map(|p| Vertex::new(*p, Vec3::Y, color)).collect(),
        indices: vec![0, 1, 2, 0, 2, 3],
        topology: Topology::Triangles,
    }
}

/// Square grid of lines on the floor; the two center lines use `center_color`
pub fn create_grid_mesh(size: f32, divisions: u32, center_color: [f32; 4], color: [f32; 4]) -> Mesh {
    let h = size * 0.5;
    let step = size / divisions as f32;
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for i in 0..=divisions {
        let k = -h + i as f32 * step;
        let c = if i * 2 == divisions { center_color } else { color };
        for (a, b) in [
            (Vec3::new(-h, 0.0, k), Vec3::new(h, 0.0, k)),
            (Vec3::new(k, 0.0, -h), Vec3::new(k, 0.0, h)),
        ] {
            let base = vertices.len() as u32;
            vertices.push(Vertex::new(a, Vec3::Y, c));
            vertices.push(Vertex::new(b, Vec3::Y, c));
            indices.extend_from_slice(&[base, base + 1]);
        }
    }

    Mesh { vertices, indices, topology: Topology::Lines }
}

/// Red/green/blue lines along +X/+Y/+Z
pub fn create_axes_mesh(length: f32) -> Mesh {
    let axes = [
        (Vec3::X, [1.0, 0.0, 0.0, 1.0]),
        (Vec3::Y, [0.0, 1.0, 0.0, 1.0]),
        (Vec3::Z, [0.0, 0.0, 1.0, 1.0]),
    ];
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for (dir, color) in axes {
        let base = vertices.len() as u32;
        vertices.push(Vertex::new(Vec3::ZERO, Vec3::Y, color));
        vertices.push(Vertex::new(dir * length, Vec3::Y, color));
        indices.extend_from_slice(&[base, base + 1]);
    }
    Mesh { vertices, indices, topology: Topology::Lines }
}

/// Pointer line from the controller origin one meter along -Z, fading out
pub fn create_pointer_ray_mesh() -> Mesh {
    Mesh {
        vertices: vec![
            Vertex::new(Vec3::ZERO, Vec3::Y, [0.5, 0.5, 0.5, 1.0]),
            Vertex::new(Vec3::NEG_Z, Vec3::Y, [0.0, 0.0, 0.0, 1.0]),
        ],
        indices: vec![0, 1],
        topology: Topology::Lines,
    }
}

/// Gaze cursor ring one meter in front of the controller
pub fn create_gaze_ring_mesh(radius: f32, segments: u32) -> Mesh {
    let color = [1.0, 1.0, 1.0, 0.5];
    let vertices: Vec<Vertex> = (0..segments)
        .map(|i| {
            let a = i as f32 / segments as f32 * TAU;
            Vertex::new(Vec3::new(a.cos() * radius, a.sin() * radius, -1.0), Vec3::Z, color)
        })
        .collect();
    let indices = (0..segments).flat_map(|i| [i, (i + 1) % segments]).collect();
    Mesh { vertices, indices, topology: Topology::Lines }
}
