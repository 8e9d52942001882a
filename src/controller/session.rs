use glam::Vec3;
use tracing::{debug, info, warn};

use crate::config::{InteractionConfig, ViewerConfig};
use crate::controller::actions::{reset_group, ButtonActions};
use crate::controller::grab::GrabSystem;
use crate::controller::locomotion::Locomotion;
use crate::controller::orbit::OrbitController;
use crate::controller::xr_input::{
    ControllerEvent, Handedness, PreviousInputs, SessionEvent, XrEvent, XrFrameInput,
};
use crate::error::{Result, ViewerError};
use crate::model::{LungScene, TargetRayMode, Transform, CONTROLLER_COUNT};

/// Actions raised by page buttons or the overlay panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    ResetView,
    ToggleAxes,
    ExitVr,
}

/// What is known about the input source bound to a controller slot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerSlot {
    pub connected: bool,
    pub handedness: Handedness,
    pub target_ray_mode: TargetRayMode,
}

/// All interaction state of a viewer: grab ownership, previous gamepad
/// snapshots, the desktop orbit and whether an XR session is presenting.
pub struct InteractionSession {
    pub grab: GrabSystem,
    pub orbit: OrbitController,
    locomotion: Locomotion,
    actions: ButtonActions,
    previous: PreviousInputs,
    slots: [ControllerSlot; CONTROLLER_COUNT],
    presenting: bool,
    exit_requested: bool,
    interaction: InteractionConfig,
}

impl InteractionSession {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            grab: GrabSystem::new(),
            orbit: OrbitController::new(config),
            locomotion: Locomotion::from_config(&config.interaction),
            actions: ButtonActions::from_config(&config.interaction),
            previous: PreviousInputs::default(),
            slots: [ControllerSlot::default(); CONTROLLER_COUNT],
            presenting: false,
            exit_requested: false,
            interaction: config.interaction.clone(),
        }
    }

    pub fn presenting(&self) -> bool {
        self.presenting
    }

    pub fn slot(&self, slot: usize) -> Option<&ControllerSlot> {
        self.slots.get(slot)
    }

    pub fn previous_inputs(&self) -> &PreviousInputs {
        &self.previous
    }

    pub fn handle_event(&mut self, scene: &mut LungScene, event: XrEvent) -> Result<()> {
        match event {
            XrEvent::Session(SessionEvent::Started) => {
                self.session_started();
                Ok(())
            }
            XrEvent::Session(SessionEvent::Ended) => self.session_ended(scene),
            XrEvent::Controller(e) => self.handle_controller_event(scene, e),
        }
    }

    pub fn handle_controller_event(&mut self, scene: &mut LungScene, event: ControllerEvent) -> Result<()> {
        match event {
            ControllerEvent::Connected { slot, source } => {
                let entry = self.slots.get_mut(slot).ok_or(ViewerError::InvalidSlot(slot))?;
                *entry = ControllerSlot {
                    connected: true,
                    handedness: source.handedness,
                    target_ray_mode: source.target_ray_mode,
                };
                scene.attach_controller_visual(slot, source.target_ray_mode)?;
                info!(slot, handedness = ?source.handedness, mode = ?source.target_ray_mode, "controller connected");
            }
            ControllerEvent::Disconnected { slot } => {
                let entry = self.slots.get_mut(slot).ok_or(ViewerError::InvalidSlot(slot))?;
                *entry = ControllerSlot::default();
                if self.grab.is_holding(slot) {
                    self.grab.force_release(scene)?;
                }
                scene.detach_controller_visual(slot)?;
                info!(slot, "controller disconnected");
            }
            ControllerEvent::SelectStart { slot } => {
                self.grab.select_start(scene, slot)?;
            }
            ControllerEvent::SelectEnd { slot } => {
                self.grab.select_end(scene, slot)?;
            }
        }
        Ok(())
    }

    /// Presenting begins: desktop orbit is switched off and edge detection
    /// starts from a clean slate
    pub fn session_started(&mut self) {
        self.presenting = true;
        self.orbit.enabled = false;
        self.previous.clear();
        info!("XR session started");
    }

    /// Presenting ends: anything held goes back to the world and the desktop
    /// orbit takes over again
    pub fn session_ended(&mut self, scene: &mut LungScene) -> Result<()> {
        self.presenting = false;
        self.orbit.enabled = true;
        self.previous.clear();
        self.exit_requested = false;
        if let Some(slot) = self.grab.force_release(scene)? {
            debug!(slot, "released group on session end");
        }
        info!("XR session ended");
        Ok(())
    }

    /// Per-frame update. `dt` is in seconds. While presenting, `frame` carries
    /// head and controller poses plus gamepad state; otherwise the orbit
    /// drives the camera.
    pub fn update_frame(&mut self, scene: &mut LungScene, frame: Option<&XrFrameInput>, dt: f32) -> Result<()> {
        let frames = self.interaction.frame_scale(dt);

        if !self.presenting {
            let pose = self.orbit.update(frames);
            return scene.graph.set_local(scene.camera, pose);
        }
        let Some(frame) = frame else { return Ok(()) };

        if let Some(head) = frame.head {
            scene.graph.set_local(scene.camera, Transform::from_matrix(head))?;
        }
        for (slot, source) in frame.sources.iter().enumerate() {
            if let Some(pose) = source.as_ref().and_then(|s| s.pose) {
                scene.graph.set_local(scene.controllers[slot], Transform::from_matrix(pose))?;
            }
        }

        let camera_world = scene.graph.world_matrix(scene.camera)?;
        let mut rig_offset = Vec3::ZERO;
        for (slot, source) in frame.sources.iter().enumerate() {
            let Some(source) = source else { continue };
            let Some(gamepad) = &source.gamepad else { continue };

            rig_offset += self.locomotion.displacement(gamepad, &camera_world, frames);
            self.actions.apply(
                scene,
                &mut self.grab,
                &self.previous,
                slot,
                source.handedness,
                gamepad,
                frames,
            )?;
            self.previous.store(source.handedness, gamepad.clone());
        }

        if rig_offset != Vec3::ZERO {
            scene.graph.node_mut(scene.rig)?.local.translation += rig_offset;
        }
        Ok(())
    }

    pub fn apply_ui_action(&mut self, scene: &mut LungScene, action: UiAction) -> Result<()> {
        match action {
            UiAction::ResetView => {
                if self.presenting {
                    scene.graph.set_local(scene.rig, Transform::IDENTITY)?;
                    reset_group(scene, &mut self.grab)?;
                } else {
                    self.orbit.reset();
                }
            }
            UiAction::ToggleAxes => {
                let visible = scene.toggle_axes()?;
                debug!(visible, "axes toggled");
            }
            UiAction::ExitVr => {
                if self.presenting {
                    self.exit_requested = true;
                } else {
                    warn!("exit requested while not presenting");
                }
            }
        }
        Ok(())
    }

    /// Consume a pending request to leave the XR session
    pub fn take_exit_request(&mut self) -> bool {
        std::mem::take(&mut self.exit_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::xr_input::{ButtonState, GamepadSnapshot, InputSourceState};
    use glam::{Mat4, Quat};

    fn setup() -> (LungScene, InteractionSession) {
        let config = ViewerConfig::default();
        (LungScene::new(&config).unwrap(), InteractionSession::new(&config))
    }

    fn source(handedness: Handedness, pose: Mat4, gamepad: Option<GamepadSnapshot>) -> InputSourceState {
        InputSourceState { handedness, target_ray_mode: TargetRayMode::TrackedPointer, pose: Some(pose), gamepad }
    }

    fn stick(x: f32, y: f32) -> GamepadSnapshot {
        GamepadSnapshot { buttons: vec![ButtonState::default(); 6], axes: vec![0.0, 0.0, x, y] }
    }

    fn pointing_at_group() -> Mat4 {
        Mat4::from_translation(Vec3::new(0.0, 1.3, 1.0))
    }

    fn connect(s: &mut LungScene, session: &mut InteractionSession, slot: usize, handedness: Handedness) {
        session
            .handle_event(
                s,
                XrEvent::Controller(ControllerEvent::Connected {
                    slot,
                    source: source(handedness, Mat4::IDENTITY, None),
                }),
            )
            .unwrap();
    }

    #[test]
    fn test_session_toggles_orbit() {
        let (mut s, mut session) = setup();
        assert!(session.orbit.enabled);
        session.handle_event(&mut s, XrEvent::Session(SessionEvent::Started)).unwrap();
        assert!(session.presenting());
        assert!(!session.orbit.enabled);
        session.handle_event(&mut s, XrEvent::Session(SessionEvent::Ended)).unwrap();
        assert!(!session.presenting());
        assert!(session.orbit.enabled);
    }

    #[test]
    fn test_session_start_forgets_previous_buttons() {
        let (mut s, mut session) = setup();
        session.session_started();
        let mut pressed = stick(0.0, 0.0);
        pressed.buttons[4].pressed = true;
        let mut frame = XrFrameInput::default();
        frame.sources[0] = Some(source(Handedness::Right, Mat4::IDENTITY, Some(pressed)));
        session.update_frame(&mut s, Some(&frame), 1.0 / 60.0).unwrap();
        assert!(session.previous_inputs().get(Handedness::Right).is_some());

        // a second start without an end in between still begins clean
        session.session_started();
        assert!(session.previous_inputs().get(Handedness::Right).is_none());
    }

    #[test]
    fn test_session_end_while_holding_releases() {
        let (mut s, mut session) = setup();
        session.session_started();
        connect(&mut s, &mut session, 0, Handedness::Right);

        let mut frame = XrFrameInput::default();
        frame.sources[0] = Some(source(Handedness::Right, pointing_at_group(), Some(stick(0.0, 0.0))));
        session.update_frame(&mut s, Some(&frame), 1.0 / 60.0).unwrap();
        session.handle_event(&mut s, XrEvent::Controller(ControllerEvent::SelectStart { slot: 0 })).unwrap();
        assert_eq!(session.grab.holder(), Some(0));

        let before = s.graph.world_transform(s.group).unwrap();
        session.handle_event(&mut s, XrEvent::Session(SessionEvent::Ended)).unwrap();

        assert_eq!(session.grab.holder(), None);
        assert_eq!(s.graph.parent(s.group), Some(s.graph.root()));
        assert!(session.orbit.enabled);
        let after = s.graph.world_transform(s.group).unwrap();
        assert!(before.abs_diff_eq(&after, 1e-5));
    }

    #[test]
    fn test_disconnect_while_holding_releases() {
        let (mut s, mut session) = setup();
        session.session_started();
        connect(&mut s, &mut session, 1, Handedness::Left);
        s.graph.set_local(s.controllers[1], Transform::from_matrix(pointing_at_group())).unwrap();
        session.handle_controller_event(&mut s, ControllerEvent::SelectStart { slot: 1 }).unwrap();
        assert!(session.grab.is_holding(1));

        session.handle_controller_event(&mut s, ControllerEvent::Disconnected { slot: 1 }).unwrap();
        assert_eq!(session.grab.holder(), None);
        assert_eq!(s.graph.parent(s.group), Some(s.graph.root()));
        assert!(!session.slot(1).unwrap().connected);
        assert!(s.graph.children(s.controllers[1]).is_empty());
    }

    #[test]
    fn test_locomotion_only_while_presenting() {
        let (mut s, mut session) = setup();
        let mut frame = XrFrameInput::default();
        frame.head = Some(Mat4::from_translation(Vec3::new(0.0, 1.6, 0.0)));
        frame.sources[0] = Some(source(Handedness::Left, Mat4::IDENTITY, Some(stick(0.0, -1.0))));

        session.update_frame(&mut s, Some(&frame), 1.0 / 60.0).unwrap();
        assert_eq!(s.graph.local(s.rig).unwrap().translation, Vec3::ZERO);

        session.session_started();
        session.update_frame(&mut s, Some(&frame), 1.0 / 60.0).unwrap();
        let rig = s.graph.local(s.rig).unwrap().translation;
        assert!(rig.abs_diff_eq(Vec3::new(0.0, 0.0, -0.02), 1e-5));
    }

    #[test]
    fn test_deadzone_input_leaves_rig() {
        let (mut s, mut session) = setup();
        session.session_started();
        let mut frame = XrFrameInput::default();
        frame.head = Some(Mat4::IDENTITY);
        frame.sources[0] = Some(source(Handedness::Left, Mat4::IDENTITY, Some(stick(0.1, -0.1))));
        frame.sources[1] = Some(source(Handedness::Right, Mat4::IDENTITY, Some(stick(-0.05, 0.09))));
        session.update_frame(&mut s, Some(&frame), 1.0 / 60.0).unwrap();
        assert_eq!(s.graph.local(s.rig).unwrap().translation, Vec3::ZERO);
    }

    #[test]
    fn test_reset_button_edge_and_snapshot() {
        let (mut s, mut session) = setup();
        session.session_started();
        s.graph
            .set_local(
                s.group,
                Transform { translation: Vec3::new(1.0, 0.5, -2.0), rotation: Quat::from_rotation_y(0.4), scale: Vec3::splat(2.0) },
            )
            .unwrap();

        let mut pressed = stick(0.0, 0.0);
        pressed.buttons[4].pressed = true;
        let mut frame = XrFrameInput::default();
        frame.sources[0] = Some(source(Handedness::Right, Mat4::IDENTITY, Some(pressed)));
        session.update_frame(&mut s, Some(&frame), 1.0 / 60.0).unwrap();

        let expected = Transform::from_translation(Vec3::new(0.0, 1.3, 0.0));
        assert!(s.graph.world_transform(s.group).unwrap().abs_diff_eq(&expected, 1e-6));
        assert!(session.previous_inputs().get(Handedness::Right).unwrap().is_pressed(4));

        // held button does not fire again
        s.graph.node_mut(s.group).unwrap().local.set_uniform_scale(1.5);
        session.update_frame(&mut s, Some(&frame), 1.0 / 60.0).unwrap();
        assert_eq!(s.graph.local(s.group).unwrap().uniform_scale(), 1.5);
    }

    #[test]
    fn test_grip_scale_through_frame() {
        let (mut s, mut session) = setup();
        session.session_started();
        let mut grip = stick(0.0, 0.0);
        grip.buttons[1] = ButtonState { pressed: true, value: 1.0 };

        let mut frame = XrFrameInput::default();
        frame.sources[0] = Some(source(Handedness::Right, pointing_at_group(), Some(grip)));
        session.update_frame(&mut s, Some(&frame), 1.0 / 60.0).unwrap();
        // not holding yet
        assert_eq!(s.graph.local(s.group).unwrap().uniform_scale(), 1.0);

        session.handle_controller_event(&mut s, ControllerEvent::SelectStart { slot: 0 }).unwrap();
        for _ in 0..1000 {
            session.update_frame(&mut s, Some(&frame), 1.0 / 60.0).unwrap();
        }
        assert_eq!(s.graph.local(s.group).unwrap().uniform_scale(), 3.0);
    }

    #[test]
    fn test_ui_reset_view() {
        let (mut s, mut session) = setup();
        // desktop: orbit goes home, rig untouched
        session.orbit.rotate(200.0, 50.0);
        session.orbit.update(100.0);
        session.apply_ui_action(&mut s, UiAction::ResetView).unwrap();
        session.update_frame(&mut s, None, 1.0 / 60.0).unwrap();
        let cam = s.graph.local(s.camera).unwrap().translation;
        assert!(cam.abs_diff_eq(Vec3::new(0.5, 1.6, 1.5), 1e-4));

        // presenting: rig back at the origin, group at home
        session.session_started();
        s.graph.set_local(s.rig, Transform::from_translation(Vec3::new(3.0, 0.0, 1.0))).unwrap();
        s.graph.set_local(s.group, Transform::from_translation(Vec3::new(0.2, 0.2, 0.2))).unwrap();
        session.apply_ui_action(&mut s, UiAction::ResetView).unwrap();
        assert_eq!(s.graph.local(s.rig).unwrap(), Transform::IDENTITY);
        assert_eq!(s.graph.local(s.group).unwrap(), Transform::from_translation(Vec3::new(0.0, 1.3, 0.0)));
    }

    #[test]
    fn test_ui_toggle_axes_and_exit() {
        let (mut s, mut session) = setup();
        session.apply_ui_action(&mut s, UiAction::ToggleAxes).unwrap();
        assert!(!s.axes_visible());

        session.apply_ui_action(&mut s, UiAction::ExitVr).unwrap();
        assert!(!session.take_exit_request());

        session.session_started();
        session.apply_ui_action(&mut s, UiAction::ExitVr).unwrap();
        assert!(session.take_exit_request());
        assert!(!session.take_exit_request());
    }

    #[test]
    fn test_connect_attaches_visual() {
        let (mut s, mut session) = setup();
        connect(&mut s, &mut session, 0, Handedness::Left);
        let slot = session.slot(0).unwrap();
        assert!(slot.connected);
        assert_eq!(slot.handedness, Handedness::Left);
        assert_eq!(s.graph.children(s.controllers[0]).len(), 1);
        assert!(matches!(
            session.handle_controller_event(&mut s, ControllerEvent::Disconnected { slot: 4 }),
            Err(ViewerError::InvalidSlot(4))
        ));
    }
}
