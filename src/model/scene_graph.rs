use glam::Mat4;

use crate::error::{Result, ViewerError};
use crate::model::{Aabb, Ray, Transform};
use crate::utils::{Mesh, Topology};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Group,
    Mesh(MeshId),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub local: Transform,
    pub visible: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

struct MeshEntry {
    mesh: Mesh,
    bounds: Option<Aabb>,
}

/// A ray intersection with a mesh node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub node: NodeId,
    pub t: f32,
}

/// A mesh ready to be drawn
#[derive(Debug, Clone, Copy)]
pub struct DrawItem {
    pub mesh: MeshId,
    pub world: Mat4,
}

/// Arena-backed transform hierarchy. Removed nodes leave a hole so that
/// `NodeId`s are never reused.
pub struct SceneGraph {
    nodes: Vec<Option<Node>>,
    meshes: Vec<Option<MeshEntry>>,
    root: NodeId,
}

impl SceneGraph {
    pub fn new() -> Self {
        let root = Node {
            name: "scene".to_string(),
            kind: NodeKind::Group,
            local: Transform::IDENTITY,
            visible: true,
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![Some(root)],
            meshes: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let bounds = mesh.bounds();
        self.meshes.push(Some(MeshEntry { mesh, bounds }));
        MeshId(self.meshes.len() - 1)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)?.as_ref().map(|e| &e.mesh)
    }

    /// Drop the CPU copy of a mesh; renderers release their buffers on the next sync
    pub fn dispose_mesh(&mut self, id: MeshId) {
        if let Some(slot) = self.meshes.get_mut(id.0) {
            *slot = None;
        }
    }

    pub fn mesh_ids(&self) -> impl Iterator<Item = MeshId> + '_ {
        self.meshes
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_some())
            .map(|(i, _)| MeshId(i))
    }

    pub fn add_node(&mut self, parent: NodeId, name: &str, kind: NodeKind, local: Transform) -> Result<NodeId> {
        self.node(parent)?;
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            name: name.to_string(),
            kind,
            local,
            visible: true,
            parent: Some(parent),
            children: Vec::new(),
        }));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .and_then(|n| n.as_ref())
            .ok_or(ViewerError::UnknownNode(id.0))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.as_mut())
            .ok_or(ViewerError::UnknownNode(id.0))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok()?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn local(&self, id: NodeId) -> Result<Transform> {
        Ok(self.node(id)?.local)
    }

    pub fn set_local(&mut self, id: NodeId, local: Transform) -> Result<()> {
        self.node_mut(id)?.local = local;
        Ok(())
    }

    pub fn world_matrix(&self, id: NodeId) -> Result<Mat4> {
        let node = self.node(id)?;
        let local = node.local.matrix();
        match node.parent {
            Some(parent) => Ok(self.world_matrix(parent)? * local),
            None => Ok(local),
        }
    }

    pub fn world_transform(&self, id: NodeId) -> Result<Transform> {
        Ok(Transform::from_matrix(self.world_matrix(id)?))
    }

    /// True when `ancestor` is `id` itself or lies on its parent chain
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if n == ancestor {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Move `id` under `new_parent` without changing where it sits in the world.
    pub fn attach(&mut self, id: NodeId, new_parent: NodeId) -> Result<()> {
        self.node(new_parent)?;
        if self.is_ancestor(id, new_parent) {
            return Err(ViewerError::CyclicAttach { node: id.0, parent: new_parent.0 });
        }

        let world = self.world_matrix(id)?;
        let parent_world = self.world_matrix(new_parent)?;

        self.detach(id)?;
        self.node_mut(new_parent)?.children.push(id);
        let node = self.node_mut(id)?;
        node.parent = Some(new_parent);
        node.local = Transform::from_matrix(parent_world.inverse() * world);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) -> Result<()> {
        if let Some(parent) = self.node(id)?.parent {
            self.node_mut(parent)?.children.retain(|c| *c != id);
        }
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Remove `id` and its subtree; returns the meshes the subtree referenced.
    pub fn remove(&mut self, id: NodeId) -> Result<Vec<MeshId>> {
        if id == self.root {
            return Err(ViewerError::UnknownNode(id.0));
        }
        let subtree = self.descendants(id);
        self.detach(id)?;

        let mut meshes = Vec::new();
        for n in subtree {
            if let Some(node) = self.nodes[n.0].take() {
                if let NodeKind::Mesh(m) = node.kind {
                    meshes.push(m);
                }
            }
        }
        Ok(meshes)
    }

    /// `id` followed by all nodes below it, depth first
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if !self.contains(n) {
                continue;
            }
            out.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        out
    }

    /// Intersect `ray` with the triangles of every mesh in the scene. Mesh
    /// bounds reject misses early. Hits are sorted nearest first.
    pub fn raycast(&self, ray: &Ray) -> Vec<RayHit> {
        let mut hits = Vec::new();
        for id in self.descendants(self.root) {
            let Ok(node) = self.node(id) else { continue };
            let NodeKind::Mesh(mesh_id) = node.kind else { continue };
            let Some(Some(entry)) = self.meshes.get(mesh_id.0) else { continue };
            if entry.mesh.topology != Topology::Triangles {
                continue;
            }
            let Some(bounds) = entry.bounds else { continue };
            let Ok(world) = self.world_matrix(id) else { continue };

            let local_ray = ray.transformed(&world.inverse());
            if bounds.intersect_ray(&local_ray).is_none() {
                continue;
            }
            if let Some(t) = entry.mesh.intersect_ray(&local_ray) {
                hits.push(RayHit { node: id, t });
            }
        }
        hits.sort_by(|a, b| a.t.total_cmp(&b.t));
        hits
    }

    /// World-space bounds of all meshes at or below `id`
    pub fn subtree_bounds(&self, id: NodeId) -> Option<Aabb> {
        self.descendants(id)
            .into_iter()
            .filter_map(|n| {
                let NodeKind::Mesh(m) = self.node(n).ok()?.kind else { return None };
                let bounds = self.meshes.get(m.0)?.as_ref()?.bounds?;
                Some(bounds.transformed(&self.world_matrix(n).ok()?))
            })
            .reduce(|a, b| a.union(&b))
    }

    /// Visible meshes with their world matrices. A hidden node hides its subtree.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut out = Vec::new();
        let mut stack = vec![(self.root, Mat4::IDENTITY)];
        while let Some((id, parent_world)) = stack.pop() {
            let Ok(node) = self.node(id) else { continue };
            if !node.visible {
                continue;
            }
            let world = parent_world * node.local.matrix();
            if let NodeKind::Mesh(mesh) = node.kind {
                if self.mesh(mesh).is_some() {
                    out.push(DrawItem { mesh, world });
                }
            }
            stack.extend(node.children.iter().map(|c| (*c, world)));
        }
        out
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::create_box_mesh;
    use glam::{Quat, Vec3};

    fn graph_with_box(at: Vec3) -> (SceneGraph, NodeId) {
        let mut g = SceneGraph::new();
        let mesh = g.add_mesh(create_box_mesh(Vec3::ONE, [1.0; 4]));
        let root = g.root();
        let n = g.add_node(root, "box", NodeKind::Mesh(mesh), Transform::from_translation(at)).unwrap();
        (g, n)
    }

    #[test]
    fn test_world_matrix_composes_parents() {
        let mut g = SceneGraph::new();
        let root = g.root();
        let a = g.add_node(root, "a", NodeKind::Group, Transform::from_translation(Vec3::X)).unwrap();
        let b = g.add_node(a, "b", NodeKind::Group, Transform::from_translation(Vec3::Y)).unwrap();
        let p = g.world_matrix(b).unwrap().transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn test_attach_preserves_world_transform() {
        let mut g = SceneGraph::new();
        let root = g.root();
        let holder = g
            .add_node(
                root,
                "holder",
                NodeKind::Group,
                Transform {
                    translation: Vec3::new(0.3, 1.1, -0.4),
                    rotation: Quat::from_euler(glam::EulerRot::YXZ, 0.7, -0.3, 0.2),
                    scale: Vec3::ONE,
                },
            )
            .unwrap();
        let item = g
            .add_node(
                root,
                "item",
                NodeKind::Group,
                Transform {
                    translation: Vec3::new(0.0, 1.3, 0.0),
                    rotation: Quat::from_rotation_x(0.4),
                    scale: Vec3::splat(1.7),
                },
            )
            .unwrap();

        let before = g.world_transform(item).unwrap();
        g.attach(item, holder).unwrap();
        assert_eq!(g.parent(item), Some(holder));
        assert!(g.world_transform(item).unwrap().abs_diff_eq(&before, 1e-4));

        g.attach(item, root).unwrap();
        assert_eq!(g.parent(item), Some(root));
        assert!(g.world_transform(item).unwrap().abs_diff_eq(&before, 1e-4));
        assert!(!g.children(holder).contains(&item));
    }

    #[test]
    fn test_attach_into_descendant_fails() {
        let mut g = SceneGraph::new();
        let root = g.root();
        let a = g.add_node(root, "a", NodeKind::Group, Transform::IDENTITY).unwrap();
        let b = g.add_node(a, "b", NodeKind::Group, Transform::IDENTITY).unwrap();
        assert!(matches!(g.attach(a, b), Err(ViewerError::CyclicAttach { .. })));
    }

    #[test]
    fn test_remove_returns_subtree_meshes() {
        let (mut g, n) = graph_with_box(Vec3::ZERO);
        let mesh = g.add_mesh(create_box_mesh(Vec3::ONE, [1.0; 4]));
        let child = g.add_node(n, "child", NodeKind::Mesh(mesh), Transform::IDENTITY).unwrap();

        let removed = g.remove(n).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!g.contains(n));
        assert!(!g.contains(child));
        assert!(g.children(g.root()).is_empty());
    }

    #[test]
    fn test_raycast_sorts_nearest_first() {
        let (mut g, far) = graph_with_box(Vec3::new(0.0, 0.0, -10.0));
        let mesh = g.add_mesh(create_box_mesh(Vec3::ONE, [1.0; 4]));
        let root = g.root();
        let near = g
            .add_node(root, "near", NodeKind::Mesh(mesh), Transform::from_translation(Vec3::new(0.0, 0.0, -3.0)))
            .unwrap();

        let hits = g.raycast(&Ray::new(Vec3::ZERO, Vec3::NEG_Z));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node, near);
        assert_eq!(hits[1].node, far);
        assert!((hits[0].t - 2.5).abs() < 1e-5);
    }

    #[test]
    fn test_raycast_tests_triangles_not_bounds() {
        use crate::utils::{Mesh, Vertex};
        let mut g = SceneGraph::new();
        let vertices = [Vec3::ZERO, Vec3::X, Vec3::Y]
            .into_iter()
            .map(|p| Vertex::new(p, Vec3::Z, [1.0; 4]))
            .collect();
        let mesh = g.add_mesh(Mesh { vertices, indices: vec![0, 1, 2], topology: Topology::Triangles });
        let root = g.root();
        let n = g
            .add_node(root, "tri", NodeKind::Mesh(mesh), Transform::from_translation(Vec3::new(0.0, 0.0, -2.0)))
            .unwrap();

        // crosses the bounding square but not the triangle
        assert!(g.raycast(&Ray::new(Vec3::new(0.8, 0.8, 0.0), Vec3::NEG_Z)).is_empty());

        let hits = g.raycast(&Ray::new(Vec3::new(0.2, 0.2, 0.0), Vec3::NEG_Z));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node, n);
        assert!((hits[0].t - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_raycast_ignores_lines() {
        let mut g = SceneGraph::new();
        let mesh = g.add_mesh(crate::utils::create_axes_mesh(1.0));
        let root = g.root();
        g.add_node(root, "axes", NodeKind::Mesh(mesh), Transform::IDENTITY).unwrap();
        assert!(g.raycast(&Ray::new(Vec3::new(0.5, 0.0, 1.0), Vec3::NEG_Z)).is_empty());
    }

    #[test]
    fn test_hidden_node_hides_subtree() {
        let (mut g, n) = graph_with_box(Vec3::ZERO);
        let mesh = g.add_mesh(create_box_mesh(Vec3::ONE, [1.0; 4]));
        g.add_node(n, "child", NodeKind::Mesh(mesh), Transform::IDENTITY).unwrap();
        assert_eq!(g.draw_list().len(), 2);
        g.node_mut(n).unwrap().visible = false;
        assert!(g.draw_list().is_empty());
    }

    #[test]
    fn test_disposed_mesh_is_not_drawn() {
        let (mut g, n) = graph_with_box(Vec3::ZERO);
        let NodeKind::Mesh(m) = g.node(n).unwrap().kind else { panic!("expected mesh") };
        g.dispose_mesh(m);
        assert!(g.draw_list().is_empty());
        assert_eq!(g.mesh_ids().count(), 0);
    }
}
