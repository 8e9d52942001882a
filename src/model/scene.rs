use glam::Vec3;
use tracing::{error, info, warn};

use crate::config::ViewerConfig;
use crate::error::{Result, ViewerError};
use crate::model::asset::{fit_transform, LoadEvent, LoadedModel, ProgressLog};
use crate::model::{NodeId, NodeKind, SceneGraph, Transform};
use crate::utils::{
    create_axes_mesh, create_box_mesh, create_floor_mesh, create_gaze_ring_mesh, create_grid_mesh,
    create_pointer_ray_mesh, hex_color,
};

pub const CONTROLLER_COUNT: usize = 2;

/// Where the model load currently stands
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState {
    Pending,
    Loading { loaded: u64, total: Option<u64> },
    Ready,
    Failed(String),
}

/// How a controller aims, as reported by the XR runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetRayMode {
    #[default]
    TrackedPointer,
    Gaze,
    Screen,
}

/// The lung viewer scene: a movable rig carrying the camera and controllers,
/// and the manipulable group holding the model (or its placeholder).
pub struct LungScene {
    pub graph: SceneGraph,
    pub rig: NodeId,
    pub camera: NodeId,
    pub group: NodeId,
    pub axes: NodeId,
    pub controllers: [NodeId; CONTROLLER_COUNT],
    controller_visuals: [Option<NodeId>; CONTROLLER_COUNT],
    placeholder: Option<NodeId>,
    model: Option<NodeId>,
    load_state: LoadState,
    progress: ProgressLog,
    group_home: Vec3,
    model_height: f32,
    placeholder_spin: f32,
    idle_spin: f32,
}

impl LungScene {
    pub fn new(config: &ViewerConfig) -> Result<Self> {
        let mut graph = SceneGraph::new();
        let root = graph.root();

        let floor_mesh = graph.add_mesh(create_floor_mesh(10.0, hex_color(0x1e293b)));
        graph.add_node(root, "floor", NodeKind::Mesh(floor_mesh), Transform::IDENTITY)?;

        // lifted slightly to avoid z-fighting with the floor
        let grid_mesh = graph.add_mesh(create_grid_mesh(10.0, 20, hex_color(0x334155), hex_color(0x1e293b)));
        graph.add_node(root, "grid", NodeKind::Mesh(grid_mesh), Transform::from_translation(Vec3::Y * 0.001))?;

        let rig = graph.add_node(root, "rig", NodeKind::Group, Transform::IDENTITY)?;
        let camera = graph.add_node(rig, "camera", NodeKind::Group, Transform::from_translation(config.camera_home()))?;
        let controllers = [
            graph.add_node(rig, "controller-0", NodeKind::Group, Transform::IDENTITY)?,
            graph.add_node(rig, "controller-1", NodeKind::Group, Transform::IDENTITY)?,
        ];

        let group = graph.add_node(root, "group", NodeKind::Group, Transform::from_translation(config.group_home()))?;

        let axes_mesh = graph.add_mesh(create_axes_mesh(0.2));
        let axes = graph.add_node(group, "axes", NodeKind::Mesh(axes_mesh), Transform::IDENTITY)?;

        let placeholder_mesh = graph.add_mesh(create_box_mesh(Vec3::new(0.1, 0.3, 0.1), hex_color(0x22c55e)));
        let placeholder = graph.add_node(group, "placeholder", NodeKind::Mesh(placeholder_mesh), Transform::IDENTITY)?;

        Ok(Self {
            graph,
            rig,
            camera,
            group,
            axes,
            controllers,
            controller_visuals: [None; CONTROLLER_COUNT],
            placeholder: Some(placeholder),
            model: None,
            load_state: LoadState::Pending,
            progress: ProgressLog::default(),
            group_home: config.group_home(),
            model_height: config.model_height,
            placeholder_spin: config.animation.placeholder_spin,
            idle_spin: config.animation.idle_spin,
        })
    }

    pub fn placeholder(&self) -> Option<NodeId> {
        self.placeholder
    }

    pub fn model(&self) -> Option<NodeId> {
        self.model
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn group_home(&self) -> Vec3 {
        self.group_home
    }

    /// Handle a loader notification. Failures are logged and leave the
    /// placeholder in place; nothing is propagated to the caller.
    pub fn apply_load_event(&mut self, event: LoadEvent) {
        match event {
            LoadEvent::Progress { loaded, total } => {
                self.progress.observe(loaded, total);
                self.load_state = LoadState::Loading { loaded, total };
            }
            LoadEvent::Loaded(model) => {
                match self.install_model(model) {
                    Ok(_) => {}
                    Err(ViewerError::ModelAlreadyLoaded) => warn!("ignoring second model load"),
                    Err(e) => {
                        error!("failed to install model: {e}");
                        self.load_state = LoadState::Failed(e.to_string());
                    }
                }
            }
            LoadEvent::Failed(e) => {
                error!("failed to load model: {e}");
                self.load_state = LoadState::Failed(e.to_string());
            }
        }
    }

    /// Add the fitted model under the group and drop the placeholder.
    pub fn install_model(&mut self, model: LoadedModel) -> Result<NodeId> {
        if self.model.is_some() {
            return Err(ViewerError::ModelAlreadyLoaded);
        }

        let fit = fit_transform(&model.bounds, self.model_height);
        let mesh = self.graph.add_mesh(model.mesh);
        let node = self.graph.add_node(self.group, "lung", NodeKind::Mesh(mesh), fit)?;
        self.model = Some(node);

        if let Some(placeholder) = self.placeholder.take() {
            for m in self.graph.remove(placeholder)? {
                self.graph.dispose_mesh(m);
            }
        }

        self.load_state = LoadState::Ready;
        info!("lung model loaded");
        Ok(node)
    }

    /// Put the group back at its home pose. The group must already be a child
    /// of the scene root.
    pub fn reset_group(&mut self) -> Result<()> {
        self.graph.set_local(self.group, Transform::from_translation(self.group_home))
    }

    pub fn toggle_axes(&mut self) -> Result<bool> {
        let node = self.graph.node_mut(self.axes)?;
        node.visible = !node.visible;
        Ok(node.visible)
    }

    pub fn axes_visible(&self) -> bool {
        self.graph.node(self.axes).map(|n| n.visible).unwrap_or(false)
    }

    /// Idle animation: the placeholder always spins, the model spins while
    /// presenting in VR and nobody holds it.
    pub fn animate(&mut self, frames: f32, presenting: bool, held: bool) -> Result<()> {
        if let Some(p) = self.placeholder {
            self.graph.node_mut(p)?.local.rotate_y(self.placeholder_spin * frames);
        }
        if let Some(m) = self.model {
            if presenting && !held {
                self.graph.node_mut(m)?.local.rotate_y(self.idle_spin * frames);
            }
        }
        Ok(())
    }

    /// Attach the pointer visual matching `mode` to a controller
    pub fn attach_controller_visual(&mut self, slot: usize, mode: TargetRayMode) -> Result<()> {
        self.detach_controller_visual(slot)?;
        let controller = *self.controllers.get(slot).ok_or(ViewerError::InvalidSlot(slot))?;
        let kind = match mode {
            TargetRayMode::TrackedPointer => NodeKind::Mesh(self.graph.add_mesh(create_pointer_ray_mesh())),
            TargetRayMode::Gaze => NodeKind::Mesh(self.graph.add_mesh(create_gaze_ring_mesh(0.025, 32))),
            TargetRayMode::Screen => NodeKind::Group,
        };
        let visual = self.graph.add_node(controller, "controller-visual", kind, Transform::IDENTITY)?;
        self.controller_visuals[slot] = Some(visual);
        Ok(())
    }

    pub fn detach_controller_visual(&mut self, slot: usize) -> Result<()> {
        let visual = self
            .controller_visuals
            .get_mut(slot)
            .ok_or(ViewerError::InvalidSlot(slot))?
            .take();
        if let Some(visual) = visual {
            for m in self.graph.remove(visual)? {
                self.graph.dispose_mesh(m);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::asset::{parse_glb, tests::triangle_glb};

    fn scene() -> LungScene {
        LungScene::new(&ViewerConfig::default()).unwrap()
    }

    #[test]
    fn test_initial_layout() {
        let s = scene();
        let root = s.graph.root();
        assert_eq!(s.graph.parent(s.group), Some(root));
        assert_eq!(s.graph.parent(s.camera), Some(s.rig));
        assert_eq!(s.graph.parent(s.controllers[0]), Some(s.rig));
        let placeholder = s.placeholder().unwrap();
        assert_eq!(s.graph.parent(placeholder), Some(s.group));
        let p = s.graph.world_matrix(s.group).unwrap().transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 1.3, 0.0), 1e-6));
        assert_eq!(s.load_state(), &LoadState::Pending);
    }

    #[test]
    fn test_load_success_removes_placeholder_once() {
        let mut s = scene();
        let placeholder = s.placeholder().unwrap();
        let meshes_before = s.graph.mesh_ids().count();

        let model = parse_glb(&triangle_glb()).unwrap();
        s.apply_load_event(LoadEvent::Loaded(model.clone()));

        assert_eq!(s.load_state(), &LoadState::Ready);
        assert!(s.placeholder().is_none());
        assert!(!s.graph.contains(placeholder));
        // placeholder mesh disposed, model mesh added
        assert_eq!(s.graph.mesh_ids().count(), meshes_before);
        let lung = s.model().unwrap();
        assert_eq!(s.graph.parent(lung), Some(s.group));

        // a second load is rejected and never brings the placeholder back
        s.apply_load_event(LoadEvent::Loaded(model));
        assert!(s.placeholder().is_none());
        assert_eq!(s.model(), Some(lung));
        assert_eq!(s.load_state(), &LoadState::Ready);
    }

    #[test]
    fn test_load_failure_keeps_placeholder() {
        let mut s = scene();
        let placeholder = s.placeholder().unwrap();
        let err = parse_glb(b"broken").unwrap_err();
        s.apply_load_event(LoadEvent::Failed(err));

        assert_eq!(s.placeholder(), Some(placeholder));
        assert!(s.graph.contains(placeholder));
        assert!(s.model().is_none());
        assert!(matches!(s.load_state(), LoadState::Failed(_)));
    }

    #[test]
    fn test_fitted_model_height() {
        let mut s = scene();
        let lung = s.install_model(parse_glb(&triangle_glb()).unwrap()).unwrap();
        let bounds = s.graph.subtree_bounds(lung).unwrap();
        assert!((bounds.size().y - 0.30).abs() < 1e-5);
        assert!(bounds.center().abs_diff_eq(Vec3::new(0.0, 1.3, 0.0), 1e-5));
    }

    #[test]
    fn test_progress_updates_state() {
        let mut s = scene();
        s.apply_load_event(LoadEvent::Progress { loaded: 10, total: Some(100) });
        assert_eq!(s.load_state(), &LoadState::Loading { loaded: 10, total: Some(100) });
    }

    #[test]
    fn test_toggle_axes() {
        let mut s = scene();
        assert!(s.axes_visible());
        assert!(!s.toggle_axes().unwrap());
        assert!(!s.axes_visible());
        assert!(s.toggle_axes().unwrap());
    }

    #[test]
    fn test_animate_spins_model_only_when_presenting_and_free() {
        let mut s = scene();
        let lung = s.install_model(parse_glb(&triangle_glb()).unwrap()).unwrap();
        let before = s.graph.local(lung).unwrap().rotation;

        s.animate(1.0, false, false).unwrap();
        assert_eq!(s.graph.local(lung).unwrap().rotation, before);
        s.animate(1.0, true, true).unwrap();
        assert_eq!(s.graph.local(lung).unwrap().rotation, before);
        s.animate(1.0, true, false).unwrap();
        assert_ne!(s.graph.local(lung).unwrap().rotation, before);
    }

    #[test]
    fn test_controller_visual_lifecycle() {
        let mut s = scene();
        s.attach_controller_visual(1, TargetRayMode::TrackedPointer).unwrap();
        assert_eq!(s.graph.children(s.controllers[1]).len(), 1);
        s.attach_controller_visual(1, TargetRayMode::Gaze).unwrap();
        assert_eq!(s.graph.children(s.controllers[1]).len(), 1);
        s.detach_controller_visual(1).unwrap();
        assert!(s.graph.children(s.controllers[1]).is_empty());
        assert!(matches!(s.attach_controller_visual(2, TargetRayMode::Gaze), Err(ViewerError::InvalidSlot(2))));
    }
}
