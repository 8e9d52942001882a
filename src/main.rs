use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};
use winit::{
    dpi::PhysicalPosition,
    event::*,
    event_loop::EventLoop,
    window::Window,
};

// Import from the library crate
use lungxr::{logging, model, view, controller, ViewerConfig, ViewerError};

use controller::{FrameLoopContext, InputEvent, MouseButton as OrbitButton, XrInbox};
use model::{Camera, LungScene};
use view::{GpuContext, RenderState};

const CONFIG_FILE: &str = "lungxr.toml";

/// Pixels a browser reports per wheel notch; orbit zoom is tuned to that scale
const WHEEL_LINE_PIXELS: f32 = 100.0;

struct App {
    window: Arc<Window>,
    gpu: GpuContext,
    render_state: RenderState,
    frame_ctx: FrameLoopContext,
    egui_state: egui_winit::State,

    // Never fed on desktop; the frame loop still drains it
    inbox: XrInbox,

    last_cursor: Option<PhysicalPosition<f64>>,
    started: Instant,
}

impl App {
    async fn new(window: Arc<Window>, config: &ViewerConfig, model_path: &Path) -> Result<Self, ViewerError> {
        let size = window.inner_size();

        let instance = GpuContext::instance();
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| ViewerError::Gpu(e.to_string()))?;
        let gpu = GpuContext::new_native(&instance, surface, size.width, size.height).await?;
        let (width, height) = (gpu.config.width, gpu.config.height);

        let render_state = RenderState::new(
            gpu.device.as_ref(),
            gpu.queue.as_ref(),
            gpu.format,
            gpu.config.alpha_mode,
            width,
            height,
        );

        let scene = LungScene::new(config)?;
        let frame_ctx = FrameLoopContext::new(config, scene, Camera::new(width, height), 0.0);

        // Loading is synchronous on desktop; events are applied on the first frame
        info!("loading model from {}", model_path.display());
        let load_events = frame_ctx.load_events.clone();
        model::asset::load_from_path(model_path, |event| load_events.borrow_mut().push(event));

        let egui_state = egui_winit::State::new(
            frame_ctx.egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            None,
            None,
            None,
        );

        Ok(Self {
            window,
            gpu,
            render_state,
            frame_ctx,
            egui_state,
            inbox: XrInbox::default(),
            last_cursor: None,
            started: Instant::now(),
        })
    }

    fn push_input(&mut self, event: InputEvent) {
        self.frame_ctx.input_state.borrow_mut().process_event(&event);
    }

    fn input(&mut self, event: &WindowEvent) -> bool {
        // First let egui process the event
        let egui_captured = self.egui_state.on_window_event(self.window.as_ref(), event).consumed;

        match event {
            // Cursor tracking and releases must reach the orbit input even over the overlay
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(last) = self.last_cursor {
                    self.push_input(InputEvent::MouseMove {
                        dx: (position.x - last.x) as f32,
                        dy: (position.y - last.y) as f32,
                    });
                }
                self.last_cursor = Some(*position);
                true
            }
            WindowEvent::MouseInput { state: ElementState::Released, button, .. } => {
                if let Some(button) = orbit_button(*button) {
                    self.push_input(InputEvent::MouseUp { button });
                }
                true
            }
            WindowEvent::Focused(false) => {
                self.push_input(InputEvent::FocusLost);
                false
            }
            WindowEvent::MouseInput { state: ElementState::Pressed, button, .. } if !egui_captured => {
                if let Some(button) = orbit_button(*button) {
                    let (x, y) = self.last_cursor.map_or((0.0, 0.0), |p| (p.x as f32, p.y as f32));
                    self.push_input(InputEvent::MouseDown { button, x, y });
                }
                true
            }
            WindowEvent::MouseWheel { delta, .. } if !egui_captured => {
                let delta_y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => -y * WHEEL_LINE_PIXELS,
                    MouseScrollDelta::PixelDelta(p) => -p.y as f32,
                };
                self.push_input(InputEvent::MouseWheel { delta_y });
                true
            }
            WindowEvent::MouseInput { .. } | WindowEvent::MouseWheel { .. } => true,
            _ => false,
        }
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.render_state
                .resize(self.gpu.device.as_ref(), &self.gpu.surface, new_size.width, new_size.height);
            self.frame_ctx.camera.set_aspect(new_size.width, new_size.height);
        }
    }

    fn update(&mut self) {
        let now = self.started.elapsed().as_secs_f64() * 1000.0;
        let dt = self.frame_ctx.tick(now);

        self.frame_ctx.step(&mut self.inbox, dt);
        self.frame_ctx.write_camera(self.gpu.queue.as_ref(), &self.render_state);

        let raw_input = self.egui_state.take_egui_input(&self.window);
        let dpr = self.window.scale_factor() as f32;
        self.frame_ctx.run_ui(raw_input, dt, dpr, &mut self.render_state);
        if let Some(output) = self.render_state.egui_full_output.as_mut() {
            let platform_output = std::mem::take(&mut output.platform_output);
            self.egui_state.handle_platform_output(&self.window, platform_output);
        }
    }

    fn render(&mut self) -> Result<(), ViewerError> {
        self.render_state.draw_frame(
            self.gpu.device.as_ref(),
            self.gpu.queue.as_ref(),
            &self.gpu.surface,
            &self.frame_ctx.scene.graph,
        )
    }
}

fn orbit_button(button: winit::event::MouseButton) -> Option<OrbitButton> {
    match button {
        winit::event::MouseButton::Left => Some(OrbitButton::Left),
        winit::event::MouseButton::Right => Some(OrbitButton::Right),
        winit::event::MouseButton::Middle => Some(OrbitButton::Middle),
        _ => None,
    }
}

/// Config from `lungxr.toml`; a broken file is reported and replaced by defaults
fn load_config() -> ViewerConfig {
    match ViewerConfig::load_or_default(Path::new(CONFIG_FILE)) {
        Ok(config) => config,
        Err(e) => {
            warn!("ignoring {CONFIG_FILE}: {e}");
            ViewerConfig::default()
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config();
    let model_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&config.model_path));

    let event_loop = EventLoop::new()?;
    let window_attributes = Window::default_attributes()
        .with_title("Lung viewer")
        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
    let window = Arc::new(event_loop.create_window(window_attributes)?);

    let mut app = pollster::block_on(App::new(window.clone(), &config, &model_path))?;

    event_loop.run(move |event, elwt| {
        match event {
            Event::WindowEvent {
                ref event,
                window_id,
            } if window_id == app.window.id() => {
                if !app.input(event) {
                    match event {
                        WindowEvent::CloseRequested => elwt.exit(),
                        WindowEvent::Resized(physical_size) => {
                            app.resize(*physical_size);
                        }
                        WindowEvent::RedrawRequested => {
                            app.update();
                            if let Err(e) = app.render() {
                                error!("frame failed: {e}");
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::AboutToWait => {
                app.window.request_redraw();
            }
            _ => {}
        }
    })?;
    Ok(())
}

fn main() {
    logging::init();

    if let Err(e) = run() {
        error!("viewer exited with error: {e}");
        std::process::exit(1);
    }
}
