// MODEL: scene graph, camera and assets
pub mod transform;
pub mod ray;
pub mod scene_graph;
pub mod camera;
pub mod asset;
pub mod scene;

pub use transform::Transform;
pub use ray::{Aabb, Ray};
pub use scene_graph::{DrawItem, MeshId, NodeId, NodeKind, RayHit, SceneGraph};
pub use camera::Camera;
pub use asset::{LoadEvent, LoadedModel};
pub use scene::{LoadState, LungScene, TargetRayMode, CONTROLLER_COUNT};
