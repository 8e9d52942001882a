use std::collections::HashMap;

use glam::{Mat3, Mat4};
use wgpu::*;

use crate::error::{Result, ViewerError};
use crate::model::{DrawItem, MeshId, SceneGraph};
use crate::utils::{MeshBuffer, Topology, Vertex};

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Per-draw uniforms live in 256 byte slots addressed by dynamic offset
const MODEL_SLOT: u64 = 256;

/// Background #0f172a
const CLEAR_COLOR: Color = Color { r: 0.0588, g: 0.0902, b: 0.1647, a: 1.0 };

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingUniform {
    pub key_dir: [f32; 3],
    pub key_intensity: f32,
    pub fill_dir: [f32; 3],
    pub fill_intensity: f32,
    pub ambient: f32,
    pub _pad1: f32,
    pub _pad2: f32,
    pub _pad3: f32,
}

impl Default for LightingUniform {
    fn default() -> Self {
        Self {
            key_dir: [1.0, 2.0, 1.0],
            key_intensity: 0.8,
            fill_dir: [-1.0, 0.5, -0.5],
            fill_intensity: 0.5,
            ambient: 0.6,
            _pad1: 0.0,
            _pad2: 0.0,
            _pad3: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
    pub params: [f32; 4],
}

impl ModelUniform {
    pub fn new(world: &Mat4, unlit: bool) -> Self {
        let normal = Mat4::from_mat3(Mat3::from_mat4(*world).inverse().transpose());
        Self {
            model: world.to_cols_array_2d(),
            normal: normal.to_cols_array_2d(),
            params: [if unlit { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
        }
    }
}

pub fn create_depth_texture(device: &Device, width: u32, height: u32) -> (Texture, TextureView) {
    let depth_texture = device.create_texture(&TextureDescriptor {
        label: Some("depth_texture"),
        size: Extent3d { width: width.max(1), height: height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&TextureViewDescriptor::default());
    (depth_texture, depth_view)
}

fn uniform_entry(binding: u32, visibility: ShaderStages, dynamic: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_pipeline(
    device: &Device,
    layout: &PipelineLayout,
    shader: &ShaderModule,
    format: TextureFormat,
    topology: PrimitiveTopology,
) -> RenderPipeline {
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(match topology {
            PrimitiveTopology::LineList => "line_pipeline",
            _ => "triangle_pipeline",
        }),
        layout: Some(layout),
        vertex: VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[VertexBufferLayout {
                array_stride: std::mem::size_of::<Vertex>() as BufferAddress,
                step_mode: VertexStepMode::Vertex,
                attributes: &[
                    VertexAttribute { offset: 0, shader_location: 0, format: VertexFormat::Float32x3 },
                    VertexAttribute { offset: 12, shader_location: 1, format: VertexFormat::Float32x3 },
                    VertexAttribute { offset: 24, shader_location: 2, format: VertexFormat::Float32x4 },
                ],
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState { format, blend: Some(BlendState::ALPHA_BLENDING), write_mask: ColorWrites::ALL })],
            compilation_options: Default::default(),
        }),
        primitive: PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: FrontFace::Ccw,
            // the floor and gaze ring are single sided
            cull_mode: None,
            polygon_mode: PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
            stencil: StencilState::default(),
            bias: DepthBiasState::default(),
        }),
        multisample: MultisampleState { count: 1, mask: !0, alpha_to_coverage_enabled: false },
        multiview: None,
        cache: None,
    })
}

/// GPU side of the scene: pipelines, uniforms, uploaded meshes and the egui overlay
pub struct RenderState {
    pub format: TextureFormat,
    pub alpha_mode: CompositeAlphaMode,
    pub width: u32,
    pub height: u32,

    triangle_pipeline: RenderPipeline,
    line_pipeline: RenderPipeline,

    camera_buffer: Buffer,
    frame_bind_group: BindGroup,

    model_layout: BindGroupLayout,
    model_buffer: Buffer,
    model_bind_group: BindGroup,
    model_capacity: u64,

    depth_view: TextureView,
    meshes: HashMap<MeshId, MeshBuffer>,

    // UI
    pub egui_renderer: egui_wgpu::Renderer,
    pub egui_primitives: Option<Vec<egui::ClippedPrimitive>>,
    pub egui_full_output: Option<egui::FullOutput>,
    pub egui_dpr: f32,
}

impl RenderState {
    pub fn new(
        device: &Device,
        queue: &Queue,
        format: TextureFormat,
        alpha_mode: CompositeAlphaMode,
        width: u32,
        height: u32,
    ) -> Self {
        let camera_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("camera_buffer"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let lighting_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("lighting_buffer"),
            size: std::mem::size_of::<LightingUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&lighting_buffer, 0, bytemuck::bytes_of(&LightingUniform::default()));

        let frame_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("frame_bind_group_layout"),
            entries: &[
                uniform_entry(0, ShaderStages::VERTEX, false),
                uniform_entry(1, ShaderStages::FRAGMENT, false),
            ],
        });
        let frame_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("frame_bind_group"),
            layout: &frame_layout,
            entries: &[
                BindGroupEntry { binding: 0, resource: camera_buffer.as_entire_binding() },
                BindGroupEntry { binding: 1, resource: lighting_buffer.as_entire_binding() },
            ],
        });

        let model_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("model_bind_group_layout"),
            entries: &[uniform_entry(0, ShaderStages::VERTEX_FRAGMENT, true)],
        });
        let model_capacity = 64;
        let (model_buffer, model_bind_group) = create_model_buffer(device, &model_layout, model_capacity);

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("scene_shader"),
            source: ShaderSource::Wgsl(include_str!("shaders/scene.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("scene_pipeline_layout"),
            bind_group_layouts: &[&frame_layout, &model_layout],
            push_constant_ranges: &[],
        });
        let triangle_pipeline = create_pipeline(device, &pipeline_layout, &shader, format, PrimitiveTopology::TriangleList);
        let line_pipeline = create_pipeline(device, &pipeline_layout, &shader, format, PrimitiveTopology::LineList);

        let (_, depth_view) = create_depth_texture(device, width, height);
        let egui_renderer = egui_wgpu::Renderer::new(device, format, egui_wgpu::RendererOptions::default());

        Self {
            format,
            alpha_mode,
            width,
            height,
            triangle_pipeline,
            line_pipeline,
            camera_buffer,
            frame_bind_group,
            model_layout,
            model_buffer,
            model_bind_group,
            model_capacity,
            depth_view,
            meshes: HashMap::new(),
            egui_renderer,
            egui_primitives: None,
            egui_full_output: None,
            egui_dpr: 1.0,
        }
    }

    fn surface_config(&self) -> SurfaceConfiguration {
        SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: self.format,
            width: self.width,
            height: self.height,
            present_mode: PresentMode::Fifo,
            alpha_mode: self.alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        }
    }

    /// Reconfigure the surface and depth buffer for a new drawable size
    pub fn resize(&mut self, device: &Device, surface: &Surface, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        surface.configure(device, &self.surface_config());
        self.depth_view = create_depth_texture(device, width, height).1;
    }

    pub fn write_camera(&self, queue: &Queue, view_proj: &Mat4) {
        let data = CameraUniform { view_proj: view_proj.to_cols_array_2d() };
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&data));
    }

    /// Upload meshes new to the graph and release buffers of disposed ones
    pub fn sync_meshes(&mut self, device: &Device, graph: &SceneGraph) {
        self.meshes.retain(|id, _| graph.mesh(*id).is_some());
        for id in graph.mesh_ids() {
            if self.meshes.contains_key(&id) {
                continue;
            }
            if let Some(mesh) = graph.mesh(id).filter(|m| !m.is_empty()) {
                self.meshes.insert(id, mesh.upload(device));
            }
        }
    }

    fn write_models(&mut self, device: &Device, queue: &Queue, items: &[DrawItem]) {
        let needed = items.len() as u64;
        if needed > self.model_capacity {
            self.model_capacity = needed.next_power_of_two();
            let (buffer, bind_group) = create_model_buffer(device, &self.model_layout, self.model_capacity);
            self.model_buffer = buffer;
            self.model_bind_group = bind_group;
        }

        let mut staging = vec![0u8; (needed * MODEL_SLOT) as usize];
        for (i, item) in items.iter().enumerate() {
            let unlit = self
                .meshes
                .get(&item.mesh)
                .is_some_and(|m| m.topology == Topology::Lines);
            let uniform = ModelUniform::new(&item.world, unlit);
            let start = i * MODEL_SLOT as usize;
            let bytes = bytemuck::bytes_of(&uniform);
            staging[start..start + bytes.len()].copy_from_slice(bytes);
        }
        if !staging.is_empty() {
            queue.write_buffer(&self.model_buffer, 0, &staging);
        }
    }

    pub fn draw_frame(
        &mut self,
        device: &Device,
        queue: &Queue,
        surface: &Surface,
        graph: &SceneGraph,
    ) -> Result<()> {
        self.sync_meshes(device, graph);
        let items: Vec<DrawItem> = graph
            .draw_list()
            .into_iter()
            .filter(|item| self.meshes.contains_key(&item.mesh))
            .collect();
        self.write_models(device, queue, &items);

        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Lost | SurfaceError::Outdated) => {
                surface.configure(device, &self.surface_config());
                surface
                    .get_current_texture()
                    .map_err(|e| ViewerError::Gpu(format!("failed to acquire frame after reconfigure: {e}")))?
            }
            Err(SurfaceError::Timeout) => return Ok(()),
            Err(e) => return Err(ViewerError::Gpu(format!("surface error: {e}"))),
        };

        let view = frame.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = device.create_command_encoder(&CommandEncoderDescriptor { label: Some("encoder") });

        {
            let mut rp = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations { load: LoadOp::Clear(CLEAR_COLOR), store: StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(Operations { load: LoadOp::Clear(1.0), store: StoreOp::Store }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_bind_group(0, &self.frame_bind_group, &[]);

            for (i, item) in items.iter().enumerate() {
                let Some(mesh) = self.meshes.get(&item.mesh) else { continue };
                rp.set_pipeline(match mesh.topology {
                    Topology::Triangles => &self.triangle_pipeline,
                    Topology::Lines => &self.line_pipeline,
                });
                rp.set_bind_group(1, &self.model_bind_group, &[(i as u64 * MODEL_SLOT) as u32]);
                rp.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                rp.set_index_buffer(mesh.index_buffer.slice(..), IndexFormat::Uint32);
                rp.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        if let (Some(primitives), Some(full_output)) = (self.egui_primitives.take(), self.egui_full_output.take()) {
            let screen_descriptor = egui_wgpu::ScreenDescriptor {
                size_in_pixels: [self.width, self.height],
                pixels_per_point: self.egui_dpr,
            };
            for (id, image_delta) in &full_output.textures_delta.set {
                self.egui_renderer.update_texture(device, queue, *id, image_delta);
            }
            self.egui_renderer
                .update_buffers(device, queue, &mut encoder, &primitives, &screen_descriptor);
            {
                let egui_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                    label: Some("egui_render_pass"),
                    color_attachments: &[Some(RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: Operations { load: LoadOp::Load, store: StoreOp::Store },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                self.egui_renderer
                    .render(&mut egui_pass.forget_lifetime(), &primitives, &screen_descriptor);
            }
            for id in &full_output.textures_delta.free {
                self.egui_renderer.free_texture(id);
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

fn create_model_buffer(device: &Device, layout: &BindGroupLayout, capacity: u64) -> (Buffer, BindGroup) {
    let buffer = device.create_buffer(&BufferDescriptor {
        label: Some("model_buffer"),
        size: capacity * MODEL_SLOT,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&BindGroupDescriptor {
        label: Some("model_bind_group"),
        layout,
        entries: &[BindGroupEntry {
            binding: 0,
            resource: BindingResource::Buffer(BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: BufferSize::new(std::mem::size_of::<ModelUniform>() as u64),
            }),
        }],
    });
    (buffer, bind_group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_uniform_layouts_match_shader() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 64);
        assert_eq!(std::mem::size_of::<LightingUniform>(), 48);
        assert_eq!(std::mem::size_of::<ModelUniform>(), 144);
        assert!(std::mem::size_of::<ModelUniform>() as u64 <= MODEL_SLOT);
    }

    #[test]
    fn test_normal_matrix_undoes_scale() {
        let world = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let u = ModelUniform::new(&world, false);
        let normal = Mat4::from_cols_array_2d(&u.normal);
        let n = normal.transform_vector3(Vec3::X);
        assert!(n.abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-6));
        assert_eq!(u.params[0], 0.0);
        assert_eq!(ModelUniform::new(&world, true).params[0], 1.0);
    }
}
