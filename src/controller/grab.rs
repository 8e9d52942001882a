use tracing::{debug, info};

use crate::error::{Result, ViewerError};
use crate::model::{LungScene, Ray, RayHit, CONTROLLER_COUNT};

/// Grab state of one controller
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum GrabState {
    #[default]
    Idle,
    /// The group is parented to this controller. `baseline_scale` is the
    /// group's scale when it was picked up.
    Holding { baseline_scale: f32 },
}

/// Picking and ownership of the manipulable group. At most one controller
/// holds the group at any time.
#[derive(Debug, Default)]
pub struct GrabSystem {
    states: [GrabState; CONTROLLER_COUNT],
}

impl GrabSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, slot: usize) -> GrabState {
        self.states.get(slot).copied().unwrap_or_default()
    }

    pub fn is_holding(&self, slot: usize) -> bool {
        matches!(self.state(slot), GrabState::Holding { .. })
    }

    /// Slot of the controller currently holding the group
    pub fn holder(&self) -> Option<usize> {
        self.states
            .iter()
            .position(|s| matches!(s, GrabState::Holding { .. }))
    }

    /// Nearest hit on the group or anything below it along the controller's
    /// target ray. Other scene geometry never blocks the pick.
    pub fn pick(scene: &LungScene, slot: usize) -> Result<Option<RayHit>> {
        let controller = *scene.controllers.get(slot).ok_or(ViewerError::InvalidSlot(slot))?;
        let ray = Ray::from_pose(&scene.graph.world_matrix(controller)?);
        Ok(scene
            .graph
            .raycast(&ray)
            .into_iter()
            .find(|hit| scene.graph.is_ancestor(scene.group, hit.node)))
    }

    /// Try to pick up the group with `slot`. Returns whether a grab happened.
    pub fn select_start(&mut self, scene: &mut LungScene, slot: usize) -> Result<bool> {
        if slot >= CONTROLLER_COUNT {
            return Err(ViewerError::InvalidSlot(slot));
        }
        if let Some(holder) = self.holder() {
            debug!(slot, holder, "select ignored, group already held");
            return Ok(false);
        }
        let Some(hit) = Self::pick(scene, slot)? else {
            return Ok(false);
        };

        let baseline_scale = scene.graph.world_transform(scene.group)?.uniform_scale();
        scene.graph.attach(scene.group, scene.controllers[slot])?;
        self.states[slot] = GrabState::Holding { baseline_scale };
        info!(slot, t = hit.t, "grabbed group");
        Ok(true)
    }

    /// Drop the group back into world space if `slot` holds it
    pub fn select_end(&mut self, scene: &mut LungScene, slot: usize) -> Result<bool> {
        if slot >= CONTROLLER_COUNT {
            return Err(ViewerError::InvalidSlot(slot));
        }
        if !self.is_holding(slot) {
            return Ok(false);
        }
        self.release(scene, slot)?;
        Ok(true)
    }

    /// Release whatever is held, regardless of input. Returns the former holder.
    pub fn force_release(&mut self, scene: &mut LungScene) -> Result<Option<usize>> {
        let Some(slot) = self.holder() else { return Ok(None) };
        self.release(scene, slot)?;
        info!(slot, "forced release of group");
        Ok(Some(slot))
    }

    fn release(&mut self, scene: &mut LungScene, slot: usize) -> Result<()> {
        let root = scene.graph.root();
        scene.graph.attach(scene.group, root)?;
        self.states[slot] = GrabState::Idle;
        debug!(slot, "released group");
        Ok(())
    }
}
