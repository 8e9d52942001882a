use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};
use wgpu::{Device, Queue, Surface};

use crate::config::{InteractionConfig, ViewerConfig};
use crate::controller::input::InputState;
use crate::controller::session::{InteractionSession, UiAction};
use crate::controller::xr_input::XrInbox;
use crate::model::{Camera, LoadEvent, LungScene};
use crate::ui::{self, UiStatus};
use crate::view::RenderState;

/// Everything the per-frame callback touches. Event sources (DOM listeners,
/// the asset loader, the XR bridge) only push into queues; the queues are
/// drained here, once per frame, in a fixed order.
///
/// Two loops can drive it. The window's animation frame ticks while on the
/// desktop; during an immersive session the host's `XRSession` animation
/// frame ticks through [`FrameLoopContext::xr_step`] and the window loop
/// only applies session events.
pub struct FrameLoopContext {
    pub scene: LungScene,
    pub session: InteractionSession,
    pub camera: Camera,
    pub input_state: Rc<RefCell<InputState>>,
    pub load_events: Rc<RefCell<Vec<LoadEvent>>>,
    pub ui_actions: Rc<RefCell<Vec<UiAction>>>,
    pub egui_ctx: egui::Context,
    pub egui_events: Rc<RefCell<Vec<egui::Event>>>,
    pub last_time: f64,
    last_dt: f32,
    interaction: InteractionConfig,
    mount_id: String,
}

impl FrameLoopContext {
    pub fn new(config: &ViewerConfig, scene: LungScene, camera: Camera, now: f64) -> Self {
        Self {
            scene,
            session: InteractionSession::new(config),
            camera,
            input_state: Rc::new(RefCell::new(InputState::new())),
            load_events: Rc::new(RefCell::new(Vec::new())),
            ui_actions: Rc::new(RefCell::new(Vec::new())),
            egui_ctx: egui::Context::default(),
            egui_events: Rc::new(RefCell::new(Vec::new())),
            last_time: now,
            last_dt: 0.0,
            interaction: config.interaction.clone(),
            mount_id: config.mount_id.clone(),
        }
    }

    /// Seconds since the previous frame, clamped to avoid jumps after a stall
    pub fn tick(&mut self, now: f64) -> f32 {
        let dt = ((now - self.last_time) / 1000.0).clamp(0.0, 0.1) as f32;
        self.last_time = now;
        self.last_dt = dt;
        dt
    }

    fn apply_xr_events(&mut self, inbox: &mut XrInbox) {
        for event in inbox.drain_events() {
            if let Err(e) = self.session.handle_event(&mut self.scene, event) {
                warn!("xr event failed: {e}");
            }
        }
    }

    /// Window animation frame. While presenting it leaves ticking to the XR
    /// loop and only applies queued XR events, so a session end still lands.
    /// Returns the frame time shown by the overlay.
    pub fn window_step(&mut self, inbox: &mut XrInbox, now: f64) -> f32 {
        self.apply_xr_events(inbox);
        if self.session.presenting() {
            return self.last_dt;
        }
        let dt = self.tick(now);
        self.step(inbox, dt);
        dt
    }

    /// XR animation frame, called by the host once per `XRSession` frame.
    /// Returns false when no session is presenting and nothing ran.
    pub fn xr_step(&mut self, inbox: &mut XrInbox, now: f64) -> bool {
        self.apply_xr_events(inbox);
        if !self.session.presenting() {
            debug!("xr frame outside an immersive session ignored");
            return false;
        }
        let dt = self.tick(now);
        self.step(inbox, dt);
        true
    }

    /// Apply all queued input and advance the scene by `dt` seconds.
    /// Failures are logged; the frame always completes.
    pub fn step(&mut self, inbox: &mut XrInbox, dt: f32) {
        self.apply_xr_events(inbox);

        let load_events: Vec<LoadEvent> = self.load_events.borrow_mut().drain(..).collect();
        for event in load_events {
            self.scene.apply_load_event(event);
        }

        let actions: Vec<UiAction> = self.ui_actions.borrow_mut().drain(..).collect();
        for action in actions {
            self.apply_ui_action(action);
        }

        {
            let mut input = self.input_state.borrow_mut();
            let (dx, dy) = input.consume_drag();
            let wheel = input.consume_wheel();
            if !self.session.presenting() && !self.egui_ctx.wants_pointer_input() {
                self.session.orbit.rotate(dx, dy);
                self.session.orbit.zoom(wheel);
            }
        }

        let frame = inbox.take_frame();
        if let Err(e) = self.session.update_frame(&mut self.scene, frame.as_ref(), dt) {
            warn!("interaction update failed: {e}");
        }

        let frames = self.interaction.frame_scale(dt);
        let held = self.session.grab.holder().is_some();
        if let Err(e) = self.scene.animate(frames, self.session.presenting(), held) {
            warn!("animation failed: {e}");
        }

        if self.session.take_exit_request() {
            inbox.request_exit();
        }
    }

    pub fn apply_ui_action(&mut self, action: UiAction) {
        if let Err(e) = self.session.apply_ui_action(&mut self.scene, action) {
            warn!("ui action {action:?} failed: {e}");
        }
    }

    pub fn status(&self, dt: f32) -> UiStatus {
        UiStatus {
            load: self.scene.load_state().clone(),
            presenting: self.session.presenting(),
            holder: self.session.grab.holder(),
            group_scale: self
                .scene
                .graph
                .world_transform(self.scene.group)
                .map(|t| t.uniform_scale())
                .unwrap_or(1.0),
            axes_visible: self.scene.axes_visible(),
            dt,
        }
    }

    /// Run the overlay and apply whatever it asked for
    pub fn run_ui(&mut self, raw_input: egui::RawInput, dt: f32, dpr: f32, render_state: &mut RenderState) {
        self.egui_ctx.set_pixels_per_point(dpr);
        let status = self.status(dt);
        let (mut full_output, actions) = ui::build_ui(&self.egui_ctx, raw_input, &status);
        for action in actions {
            self.apply_ui_action(action);
        }

        let primitives = self.egui_ctx.tessellate(std::mem::take(&mut full_output.shapes), dpr);
        render_state.egui_primitives = Some(primitives);
        render_state.egui_full_output = Some(full_output);
        render_state.egui_dpr = dpr;
    }

    /// Upload the camera for the current scene state
    pub fn write_camera(&self, queue: &Queue, render_state: &RenderState) {
        match self.scene.graph.world_matrix(self.scene.camera) {
            Ok(world) => render_state.write_camera(queue, &self.camera.view_proj(&world)),
            Err(e) => warn!("camera node missing: {e}"),
        }
    }

    /// One animation frame in the browser
    pub fn update(
        &mut self,
        device: &Device,
        queue: &Queue,
        window: &web_sys::Window,
        surface: &Surface,
        render_state: &mut RenderState,
        inbox: &mut XrInbox,
    ) {
        let now = window.performance().map(|p| p.now()).unwrap_or(0.0);
        let dt = self.window_step(inbox, now);

        self.handle_resize(window, device, surface, render_state);
        self.write_camera(queue, render_state);

        let dpr = window.device_pixel_ratio().min(2.0) as f32;
        let mut raw_input = egui::RawInput::default();
        raw_input.time = Some(now / 1000.0);
        raw_input.screen_rect = Some(egui::Rect::from_min_size(
            egui::Pos2::new(0.0, 0.0),
            egui::vec2(render_state.width as f32 / dpr, render_state.height as f32 / dpr),
        ));
        raw_input.events.extend(self.egui_events.borrow_mut().drain(..));
        self.run_ui(raw_input, dt, dpr, render_state);
    }

    /// Match the drawable to the mount point's size
    fn handle_resize(&mut self, window: &web_sys::Window, device: &Device, surface: &Surface, render_state: &mut RenderState) {
        let Some(container) = window.document().and_then(|d| d.get_element_by_id(&self.mount_id)) else {
            return;
        };
        let rect = container.get_bounding_client_rect();
        let dpr = window.device_pixel_ratio().min(2.0);
        let w = ((rect.width() * dpr).round() as u32).max(1);
        let h = ((rect.height() * dpr).round() as u32).max(1);
        if w == render_state.width && h == render_state.height {
            return;
        }

        if let Some(canvas) = container
            .query_selector("canvas")
            .ok()
            .flatten()
            .and_then(|c| wasm_bindgen::JsCast::dyn_into::<web_sys::HtmlCanvasElement>(c).ok())
        {
            canvas.set_width(w);
            canvas.set_height(h);
        }
        self.camera.set_aspect(w, h);
        render_state.resize(device, surface, w, h);
    }
}
