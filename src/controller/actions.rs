use tracing::info;

use crate::config::InteractionConfig;
use crate::controller::grab::GrabSystem;
use crate::controller::xr_input::{GamepadSnapshot, Handedness, PreviousInputs};
use crate::error::Result;
use crate::model::LungScene;

/// Edge-triggered reset and hold-to-scale
#[derive(Debug, Clone)]
pub struct ButtonActions {
    pub reset_button: usize,
    pub scale_button: usize,
    pub scale_rate: f32,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl ButtonActions {
    pub fn from_config(config: &InteractionConfig) -> Self {
        Self {
            reset_button: config.reset_button,
            scale_button: config.scale_button,
            scale_rate: config.scale_rate,
            min_scale: config.min_scale,
            max_scale: config.max_scale,
        }
    }

    pub fn clamp_scale(&self, scale: f32) -> f32 {
        scale.clamp(self.min_scale, self.max_scale)
    }

    /// Process one controller's buttons for this frame. Returns true when a
    /// reset fired.
    pub fn apply(
        &self,
        scene: &mut LungScene,
        grab: &mut GrabSystem,
        previous: &PreviousInputs,
        slot: usize,
        handedness: Handedness,
        gamepad: &GamepadSnapshot,
        frames: f32,
    ) -> Result<bool> {
        let mut reset = false;
        if previous.rising_edge(handedness, gamepad, self.reset_button) {
            reset_group(scene, grab)?;
            reset = true;
        }

        if grab.is_holding(slot) {
            if let Some(button) = gamepad.button(self.scale_button).filter(|b| b.pressed) {
                let node = scene.graph.node_mut(scene.group)?;
                let next = node.local.uniform_scale() + button.value * self.scale_rate * frames;
                node.local.set_uniform_scale(self.clamp_scale(next));
            }
        }
        Ok(reset)
    }
}

/// Release the group if held and put it back at its home pose with unit scale
pub fn reset_group(scene: &mut LungScene, grab: &mut GrabSystem) -> Result<()> {
    grab.force_release(scene)?;
    scene.reset_group()?;
    info!("group reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::controller::xr_input::ButtonState;
    use crate::model::Transform;
    use glam::{Quat, Vec3};

    fn pad(reset: bool, grip: Option<f32>) -> GamepadSnapshot {
        let mut buttons = vec![ButtonState::default(); 6];
        if let Some(value) = grip {
            buttons[1] = ButtonState { pressed: true, value };
        }
        buttons[4].pressed = reset;
        GamepadSnapshot { buttons, axes: vec![0.0; 4] }
    }

    fn setup() -> (LungScene, GrabSystem, ButtonActions) {
        let scene = LungScene::new(&ViewerConfig::default()).unwrap();
        (scene, GrabSystem::new(), ButtonActions::from_config(&InteractionConfig::default()))
    }

    fn grab_with_slot_0(scene: &mut LungScene, grab: &mut GrabSystem) {
        let pose = Transform::from_translation(Vec3::new(0.0, 1.3, 1.0));
        scene.graph.set_local(scene.controllers[0], pose).unwrap();
        assert!(grab.select_start(scene, 0).unwrap());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (mut s, mut grab, actions) = setup();
        s.graph
            .set_local(
                s.group,
                Transform {
                    translation: Vec3::new(3.0, -1.0, 2.0),
                    rotation: Quat::from_rotation_z(1.0),
                    scale: Vec3::splat(2.5),
                },
            )
            .unwrap();

        let prev = PreviousInputs::default();
        assert!(actions.apply(&mut s, &mut grab, &prev, 0, Handedness::Left, &pad(true, None), 1.0).unwrap());

        let world = s.graph.world_transform(s.group).unwrap();
        let expected = Transform::from_translation(Vec3::new(0.0, 1.3, 0.0));
        assert!(world.abs_diff_eq(&expected, 1e-6));
    }

    #[test]
    fn test_reset_fires_only_on_edge() {
        let (mut s, mut grab, actions) = setup();
        let mut prev = PreviousInputs::default();
        prev.store(Handedness::Right, pad(true, None));
        assert!(!actions.apply(&mut s, &mut grab, &prev, 0, Handedness::Right, &pad(true, None), 1.0).unwrap());
    }

    #[test]
    fn test_reset_while_held_releases_first() {
        let (mut s, mut grab, actions) = setup();
        grab_with_slot_0(&mut s, &mut grab);
        let prev = PreviousInputs::default();
        actions.apply(&mut s, &mut grab, &prev, 1, Handedness::Left, &pad(true, None), 1.0).unwrap();

        assert_eq!(grab.holder(), None);
        assert_eq!(s.graph.parent(s.group), Some(s.graph.root()));
        let p = s.graph.world_matrix(s.group).unwrap().transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 1.3, 0.0), 1e-6));
    }

    #[test]
    fn test_grip_scales_only_holder() {
        let (mut s, mut grab, actions) = setup();
        let prev = PreviousInputs::default();

        // not holding: no change
        actions.apply(&mut s, &mut grab, &prev, 0, Handedness::Right, &pad(false, Some(1.0)), 1.0).unwrap();
        assert_eq!(s.graph.local(s.group).unwrap().uniform_scale(), 1.0);

        grab_with_slot_0(&mut s, &mut grab);
        actions.apply(&mut s, &mut grab, &prev, 1, Handedness::Left, &pad(false, Some(1.0)), 1.0).unwrap();
        assert_eq!(s.graph.local(s.group).unwrap().uniform_scale(), 1.0);

        actions.apply(&mut s, &mut grab, &prev, 0, Handedness::Right, &pad(false, Some(0.5)), 1.0).unwrap();
        assert!((s.graph.local(s.group).unwrap().uniform_scale() - 1.005).abs() < 1e-6);
    }

    #[test]
    fn test_grip_scale_clamps_to_bounds() {
        let (mut s, mut grab, actions) = setup();
        grab_with_slot_0(&mut s, &mut grab);
        let prev = PreviousInputs::default();

        s.graph.node_mut(s.group).unwrap().local.set_uniform_scale(2.999);
        actions.apply(&mut s, &mut grab, &prev, 0, Handedness::Right, &pad(false, Some(1.0)), 10.0).unwrap();
        assert_eq!(s.graph.local(s.group).unwrap().uniform_scale(), 3.0);

        // a negative analog value drives the scale down to the lower bound
        s.graph.node_mut(s.group).unwrap().local.set_uniform_scale(0.1005);
        actions.apply(&mut s, &mut grab, &prev, 0, Handedness::Right, &pad(false, Some(-1.0)), 1.0).unwrap();
        assert_eq!(s.graph.local(s.group).unwrap().uniform_scale(), 0.1);
    }
}
