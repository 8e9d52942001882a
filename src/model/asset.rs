//! Model asset loading: GLB decoding via `gltf`, flattening into a single
//! vertex-coloured mesh, and fitting the result to a target height.

use glam::{Mat3, Mat4, Vec3};
use tracing::{debug, info};

use crate::error::{Result, ViewerError};
use crate::model::{Aabb, Transform};
use crate::utils::{Mesh, Topology, Vertex};

/// A decoded model in its own coordinate space
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub mesh: Mesh,
    pub bounds: Aabb,
}

/// Notifications produced while a model loads
#[derive(Debug)]
pub enum LoadEvent {
    Progress { loaded: u64, total: Option<u64> },
    Loaded(LoadedModel),
    Failed(ViewerError),
}

/// Decode a binary glTF file. All triangle primitives of the default scene
/// are merged with their node transforms applied.
pub fn parse_glb(bytes: &[u8]) -> Result<LoadedModel> {
    let (document, buffers, _images) = gltf::import_slice(bytes)?;
    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(ViewerError::EmptyModel)?;

    let mut mesh = Mesh::empty(Topology::Triangles);
    for node in scene.nodes() {
        append_node(&node, Mat4::IDENTITY, &buffers, &mut mesh);
    }

    if mesh.is_empty() {
        return Err(ViewerError::EmptyModel);
    }
    let bounds = mesh.bounds().ok_or(ViewerError::EmptyModel)?;
    debug!(vertices = mesh.vertices.len(), triangles = mesh.indices.len() / 3, "decoded model");
    Ok(LoadedModel { mesh, bounds })
}

fn append_node(node: &gltf::Node, parent: Mat4, buffers: &[gltf::buffer::Data], out: &mut Mesh) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                continue;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
            let Some(positions) = reader.read_positions() else { continue };
            let positions: Vec<Vec3> = positions
                .map(|p| world.transform_point3(Vec3::from_array(p)))
                .collect();

            let indices: Vec<u32> = match reader.read_indices() {
                Some(ix) => ix.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            let normals: Vec<Vec3> = match reader.read_normals() {
                Some(ns) => ns
                    .map(|n| (normal_matrix * Vec3::from_array(n)).normalize_or_zero())
                    .collect(),
                None => compute_normals(&positions, &indices),
            };

            let base_color = primitive.material().pbr_metallic_roughness().base_color_factor();
            let colors: Vec<[f32; 4]> = match reader.read_colors(0) {
                Some(cs) => cs
                    .into_rgba_f32()
                    .map(|c| [c[0] * base_color[0], c[1] * base_color[1], c[2] * base_color[2], c[3] * base_color[3]])
                    .collect(),
                None => vec![base_color; positions.len()],
            };

            let offset = out.vertices.len() as u32;
            out.vertices.extend(positions.iter().enumerate().map(|(i, p)| {
                Vertex::new(
                    *p,
                    normals.get(i).copied().unwrap_or(Vec3::Y),
                    colors.get(i).copied().unwrap_or(base_color),
                )
            }));
            out.indices.extend(valid_triangles(&indices, positions.len(), offset));
        }
    }

    for child in node.children() {
        append_node(&child, world, buffers, out);
    }
}

/// Indices of the triangles whose corners all exist, shifted by `offset`.
/// A triangle with any out-of-range corner is dropped whole.
fn valid_triangles(indices: &[u32], vertex_count: usize, offset: u32) -> impl Iterator<Item = u32> + '_ {
    indices
        .chunks_exact(3)
        .filter(move |tri| tri.iter().all(|i| (*i as usize) < vertex_count))
        .flatten()
        .map(move |i| i + offset)
}

/// Area-weighted vertex normals for meshes that ship without them
fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let n = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += n;
        normals[b] += n;
        normals[c] += n;
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}

/// Transform that centers `bounds` on the origin and scales it to `target_height`.
/// Flat models (zero height) are treated as one unit tall.
pub fn fit_transform(bounds: &Aabb, target_height: f32) -> Transform {
    let height = bounds.size().y;
    let scale = if height > f32::EPSILON { target_height / height } else { target_height };
    Transform {
        translation: -bounds.center() * scale,
        rotation: glam::Quat::IDENTITY,
        scale: Vec3::splat(scale),
    }
}

/// Logs load progress once per 10 % step
#[derive(Debug, Default)]
pub struct ProgressLog {
    last_step: Option<u64>,
}

impl ProgressLog {
    /// Returns the percentage step that was logged, if any
    pub fn observe(&mut self, loaded: u64, total: Option<u64>) -> Option<u64> {
        let total = total.filter(|t| *t > 0)?;
        let step = (loaded.saturating_mul(100) / total).min(100) / 10 * 10;
        if self.last_step.map_or(true, |last| step > last) {
            self.last_step = Some(step);
            info!("loading model: {step}%");
            Some(step)
        } else {
            None
        }
    }
}

/// Read and decode a model from disk, reporting through `sink`.
#[cfg(not(target_arch = "wasm32"))]
pub fn load_from_path(path: &std::path::Path, mut sink: impl FnMut(LoadEvent)) {
    let result = std::fs::read(path)
        .map_err(ViewerError::from)
        .and_then(|bytes| {
            let len = bytes.len() as u64;
            sink(LoadEvent::Progress { loaded: len, total: Some(len) });
            parse_glb(&bytes)
        });
    match result {
        Ok(model) => sink(LoadEvent::Loaded(model)),
        Err(e) => sink(LoadEvent::Failed(e)),
    }
}

/// Fetch and decode a model over HTTP, reporting through `sink`.
#[cfg(target_arch = "wasm32")]
pub async fn fetch_model(path: &str, mut sink: impl FnMut(LoadEvent)) {
    let result = fetch_bytes(path, &mut sink).await.and_then(|bytes| parse_glb(&bytes));
    match result {
        Ok(model) => sink(LoadEvent::Loaded(model)),
        Err(e) => sink(LoadEvent::Failed(e)),
    }
}

#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(path: &str, sink: &mut impl FnMut(LoadEvent)) -> Result<Vec<u8>> {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    let window = web_sys::window().ok_or_else(|| ViewerError::Js("no global `window`".into()))?;
    let resp: web_sys::Response = JsFuture::from(window.fetch_with_str(path)).await?.dyn_into()?;
    if !resp.ok() {
        return Err(ViewerError::AssetFetch {
            path: path.to_string(),
            reason: format!("HTTP {}", resp.status()),
        });
    }

    let total = resp
        .headers()
        .get("content-length")
        .ok()
        .flatten()
        .and_then(|v| v.parse::<u64>().ok());
    sink(LoadEvent::Progress { loaded: 0, total });

    let buf = JsFuture::from(resp.array_buffer()?).await?;
    let bytes = js_sys::Uint8Array::new(&buf).to_vec();
    let len = bytes.len() as u64;
    sink(LoadEvent::Progress { loaded: len, total: total.or(Some(len)) });
    Ok(bytes)
}
