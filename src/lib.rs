// Re-export all public modules so they can be used from main.rs
pub mod config;
pub mod error;
pub mod logging;
pub mod utils;
pub mod ui;

// MVC Architecture
pub mod model;
pub mod view;
pub mod controller;

pub use config::ViewerConfig;
pub use error::{Result, ViewerError};

#[cfg(target_arch = "wasm32")]
pub use web::*;

/// Browser entry point, DOM wiring and the XR bridge exported to the host page
#[cfg(target_arch = "wasm32")]
mod web {
    use std::cell::RefCell;
    use std::rc::Rc;

    use tracing::{debug, error, info, warn};
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen::{prelude::wasm_bindgen, JsCast, JsValue};
    use web_sys::{Document, Event, HtmlCanvasElement, HtmlElement, MouseEvent, Window};

    use crate::config::ViewerConfig;
    use crate::controller::input::{self, InputEvent, InputState};
    use crate::controller::xr_input::{self, ControllerEvent, SessionEvent, XrEvent, XrInbox};
    use crate::controller::{FrameLoopContext, UiAction};
    use crate::error::ViewerError;
    use crate::logging;
    use crate::model::{asset, Camera, LoadEvent, LungScene};
    use crate::view::{GpuContext, RenderState};

    thread_local! {
        static XR_INBOX: RefCell<XrInbox> = RefCell::new(XrInbox::default());
        // Shared by the window animation frame and the `xr_frame` export
        static FRAME_CTX: RefCell<Option<Rc<RefCell<FrameLoopContext>>>> = const { RefCell::new(None) };
    }

    fn push_xr(event: XrEvent) {
        XR_INBOX.with(|inbox| inbox.borrow_mut().push_event(event));
    }

    #[wasm_bindgen]
    pub fn xr_session_started() {
        push_xr(XrEvent::Session(SessionEvent::Started));
    }

    #[wasm_bindgen]
    pub fn xr_session_ended() {
        push_xr(XrEvent::Session(SessionEvent::Ended));
    }

    #[wasm_bindgen]
    pub fn xr_controller_connected(slot: usize, source: JsValue) {
        match xr_input::wasm::input_source_from_js(&source, None) {
            Some(source) => push_xr(XrEvent::Controller(ControllerEvent::Connected { slot, source })),
            None => warn!("controller {slot} connected without an input source"),
        }
    }

    #[wasm_bindgen]
    pub fn xr_controller_disconnected(slot: usize) {
        push_xr(XrEvent::Controller(ControllerEvent::Disconnected { slot }));
    }

    #[wasm_bindgen]
    pub fn xr_select_start(slot: usize) {
        push_xr(XrEvent::Controller(ControllerEvent::SelectStart { slot }));
    }

    #[wasm_bindgen]
    pub fn xr_select_end(slot: usize) {
        push_xr(XrEvent::Controller(ControllerEvent::SelectEnd { slot }));
    }

    /// Head and controller poses for the coming frame
    #[wasm_bindgen]
    pub fn xr_submit_frame(frame: JsValue) {
        let frame = xr_input::wasm::frame_from_js(&frame);
        XR_INBOX.with(|inbox| inbox.borrow_mut().submit_frame(frame));
    }

    /// Drive one interaction frame from the host's `XRSession.requestAnimationFrame`
    /// callback. Browsers may stop the window's animation frame while a headset
    /// presents, so this is what ticks the scene during a session. `frame` has
    /// the `xr_submit_frame` shape and may be null.
    #[wasm_bindgen]
    pub fn xr_frame(time: f64, frame: JsValue) {
        if !frame.is_undefined() && !frame.is_null() {
            xr_submit_frame(frame);
        }
        let Some(ctx) = FRAME_CTX.with(|c| c.borrow().clone()) else {
            debug!("xr frame before the viewer started");
            return;
        };
        let Ok(mut ctx) = ctx.try_borrow_mut() else {
            warn!("xr frame arrived while another frame was running");
            return;
        };
        XR_INBOX.with(|inbox| {
            ctx.xr_step(&mut inbox.borrow_mut(), time);
        });
    }

    /// True once after the viewer asked to leave the immersive session
    #[wasm_bindgen]
    pub fn xr_take_exit_request() -> bool {
        XR_INBOX.with(|inbox| inbox.borrow_mut().take_exit_request())
    }

    #[wasm_bindgen(start)]
    pub async fn start() -> Result<(), JsValue> {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        logging::init();
        let window = web_sys::window().ok_or_else(|| js_error("no global `window`"))?;
        logging::install_global_error_listener(&window)?;

        let config = ViewerConfig::default();
        let (document, canvas) = match init_canvas(&window, &config.mount_id) {
            Ok(found) => found,
            Err(e) => {
                error!("{e}");
                return Err(e.into());
            }
        };
        setup_app(&window, &document, &canvas, config).await
    }

    /// Main application setup for WASM
    async fn setup_app(
        window: &Window,
        document: &Document,
        canvas: &HtmlCanvasElement,
        config: ViewerConfig,
    ) -> Result<(), JsValue> {
        let width = canvas.width();
        let height = canvas.height();

        let gpu = GpuContext::new(canvas, width, height).await.map_err(|e| {
            error!("{e}");
            JsValue::from(e)
        })?;
        let width = gpu.config.width;
        let height = gpu.config.height;

        let scene = LungScene::new(&config)?;
        let now = window.performance().map(|p| p.now()).unwrap_or(0.0);
        let frame_ctx = FrameLoopContext::new(&config, scene, Camera::new(width, height), now);
        let mut render_state = RenderState::new(
            gpu.device.as_ref(),
            gpu.queue.as_ref(),
            gpu.format,
            gpu.config.alpha_mode,
            width,
            height,
        );

        setup_input_listeners(
            document,
            window,
            canvas,
            frame_ctx.input_state.clone(),
            frame_ctx.egui_events.clone(),
        )?;
        setup_page_buttons(document, frame_ctx.ui_actions.clone())?;

        // Model loading runs beside the frame loop and reports through the queue
        {
            let load_events = frame_ctx.load_events.clone();
            let path = config.model_path.clone();
            info!("loading model from {path}");
            wasm_bindgen_futures::spawn_local(async move {
                asset::fetch_model(&path, |event: LoadEvent| load_events.borrow_mut().push(event)).await;
            });
        }

        let frame_ctx = Rc::new(RefCell::new(frame_ctx));
        FRAME_CTX.with(|c| *c.borrow_mut() = Some(frame_ctx.clone()));

        // Continuous redraw using requestAnimationFrame
        let f = RcCellCallback::new(window.clone(), {
            let window_for_loop = window.clone();

            move || {
                let Ok(mut frame_ctx) = frame_ctx.try_borrow_mut() else {
                    warn!("animation frame skipped, frame loop busy");
                    return;
                };
                XR_INBOX.with(|inbox| {
                    frame_ctx.update(
                        gpu.device.as_ref(),
                        gpu.queue.as_ref(),
                        &window_for_loop,
                        &gpu.surface,
                        &mut render_state,
                        &mut inbox.borrow_mut(),
                    );
                });

                if let Err(e) = render_state.draw_frame(
                    gpu.device.as_ref(),
                    gpu.queue.as_ref(),
                    &gpu.surface,
                    &frame_ctx.scene.graph,
                ) {
                    error!("frame failed: {e}");
                }
            }
        });
        f.start()?;

        info!("viewer started ({width}x{height})");
        Ok(())
    }

    /// Canvas-relative position in CSS pixels, which egui treats as points
    fn canvas_pos(canvas: &HtmlCanvasElement, e: &MouseEvent) -> egui::Pos2 {
        let rect = canvas.get_bounding_client_rect();
        egui::pos2(e.client_x() as f32 - rect.left() as f32, e.client_y() as f32 - rect.top() as f32)
    }

    fn egui_button(button: i16) -> Option<egui::PointerButton> {
        match button {
            0 => Some(egui::PointerButton::Primary),
            1 => Some(egui::PointerButton::Middle),
            2 => Some(egui::PointerButton::Secondary),
            _ => None,
        }
    }

    /// Mouse, wheel and focus listeners feeding the orbit input and the overlay
    fn setup_input_listeners(
        document: &Document,
        window: &Window,
        canvas: &HtmlCanvasElement,
        input_state: Rc<RefCell<InputState>>,
        egui_events: Rc<RefCell<Vec<egui::Event>>>,
    ) -> Result<(), JsValue> {
        // Mouse down starts a drag only on the canvas
        {
            let input_state = input_state.clone();
            let egui_events = egui_events.clone();
            let canvas_for_pos = canvas.clone();
            let mousedown = Closure::wrap(Box::new(move |e: MouseEvent| {
                let pos = canvas_pos(&canvas_for_pos, &e);
                if let Some(button) = egui_button(e.button()) {
                    egui_events.borrow_mut().push(egui::Event::PointerButton {
                        pos,
                        button,
                        pressed: true,
                        modifiers: egui::Modifiers::default(),
                    });
                }
                input_state.borrow_mut().process_event(&input::wasm::mouse_down_to_input(&e));
                e.prevent_default();
            }) as Box<dyn FnMut(MouseEvent)>);
            canvas.add_event_listener_with_callback("mousedown", mousedown.as_ref().unchecked_ref())?;
            mousedown.forget();
        }

        // Mouse up anywhere ends the drag
        {
            let input_state = input_state.clone();
            let egui_events = egui_events.clone();
            let canvas_for_pos = canvas.clone();
            let mouseup = Closure::wrap(Box::new(move |e: MouseEvent| {
                if let Some(button) = egui_button(e.button()) {
                    egui_events.borrow_mut().push(egui::Event::PointerButton {
                        pos: canvas_pos(&canvas_for_pos, &e),
                        button,
                        pressed: false,
                        modifiers: egui::Modifiers::default(),
                    });
                }
                input_state.borrow_mut().process_event(&input::wasm::mouse_up_to_input(&e));
            }) as Box<dyn FnMut(MouseEvent)>);
            document.add_event_listener_with_callback("mouseup", mouseup.as_ref().unchecked_ref())?;
            mouseup.forget();
        }

        // Mouse move
        {
            let input_state = input_state.clone();
            let egui_events = egui_events.clone();
            let canvas_for_pos = canvas.clone();
            let mousemove = Closure::wrap(Box::new(move |e: MouseEvent| {
                egui_events
                    .borrow_mut()
                    .push(egui::Event::PointerMoved(canvas_pos(&canvas_for_pos, &e)));
                input_state.borrow_mut().process_event(&input::wasm::mouse_move_to_input(&e));
            }) as Box<dyn FnMut(MouseEvent)>);
            document.add_event_listener_with_callback("mousemove", mousemove.as_ref().unchecked_ref())?;
            mousemove.forget();
        }

        // Mouse wheel zooms instead of scrolling the page
        {
            let input_state = input_state.clone();
            let wheel = Closure::wrap(Box::new(move |e: Event| {
                if let Some(event) = input::wasm::mouse_wheel_to_input(&e) {
                    input_state.borrow_mut().process_event(&event);
                    e.prevent_default();
                }
            }) as Box<dyn FnMut(Event)>);
            canvas.add_event_listener_with_callback("wheel", wheel.as_ref().unchecked_ref())?;
            wheel.forget();
        }

        // Focus loss ends any drag
        {
            let input_state = input_state.clone();
            let blur = Closure::wrap(Box::new(move |_e: Event| {
                input_state.borrow_mut().process_event(&InputEvent::FocusLost);
            }) as Box<dyn FnMut(Event)>);
            window.add_event_listener_with_callback("blur", blur.as_ref().unchecked_ref())?;
            blur.forget();
        }

        // Context menu prevention
        {
            let contextmenu = Closure::wrap(Box::new(move |e: MouseEvent| {
                e.prevent_default();
            }) as Box<dyn FnMut(MouseEvent)>);
            canvas.add_event_listener_with_callback("contextmenu", contextmenu.as_ref().unchecked_ref())?;
            contextmenu.forget();
        }

        Ok(())
    }

    /// Optional page buttons; the page may omit any of them
    fn setup_page_buttons(document: &Document, ui_actions: Rc<RefCell<Vec<UiAction>>>) -> Result<(), JsValue> {
        let buttons = [
            ("resetCameraBtn", UiAction::ResetView),
            ("toggleAxesBtn", UiAction::ToggleAxes),
            ("mouseModeBtn", UiAction::ExitVr),
        ];
        for (id, action) in buttons {
            let Some(button) = document
                .get_element_by_id(id)
                .and_then(|el| el.dyn_into::<HtmlElement>().ok())
            else {
                debug!("no #{id} button on page");
                continue;
            };
            let ui_actions = ui_actions.clone();
            let click = Closure::wrap(Box::new(move |_e: MouseEvent| {
                ui_actions.borrow_mut().push(action);
            }) as Box<dyn FnMut(MouseEvent)>);
            button.add_event_listener_with_callback("click", click.as_ref().unchecked_ref())?;
            click.forget();
        }
        Ok(())
    }

    /// Create a canvas filling the mount point, sized in device pixels
    fn init_canvas(window: &Window, mount_id: &str) -> Result<(Document, HtmlCanvasElement), ViewerError> {
        let document = window
            .document()
            .ok_or_else(|| ViewerError::Js("no document on window".into()))?;
        let container = document
            .get_element_by_id(mount_id)
            .ok_or_else(|| ViewerError::MissingMountPoint(mount_id.to_string()))?;

        let canvas = document
            .create_element("canvas")?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| ViewerError::Js("failed to create canvas".into()))?;
        canvas.set_attribute("style", "width:100%;height:100%;display:block;touch-action:none")?;

        let rect = container.get_bounding_client_rect();
        let dpr = window.device_pixel_ratio().min(2.0);
        canvas.set_width(((rect.width() * dpr).round() as u32).max(1));
        canvas.set_height(((rect.height() * dpr).round() as u32).max(1));
        container.append_child(&canvas)?;
        Ok((document, canvas))
    }

    fn js_error<E: Into<String>>(msg: E) -> JsValue {
        JsValue::from_str(&msg.into())
    }

    struct RcCellCallback {
        inner: Rc<RefCell<Box<dyn FnMut()>>>,
        window: Window,
    }

    impl RcCellCallback {
        fn new(window: Window, f: impl FnMut() + 'static) -> Self {
            Self {
                inner: Rc::new(RefCell::new(Box::new(f))),
                window,
            }
        }

        fn start(self) -> Result<(), JsValue> {
            let inner = self.inner.clone();
            let window = self.window.clone();

            let callback = Rc::new(RefCell::new(None::<Closure<dyn FnMut()>>));
            let callback_clone = callback.clone();

            *callback.borrow_mut() = Some(Closure::wrap(Box::new(move || {
                inner.borrow_mut().as_mut()();

                // Recursively schedule next frame
                let cb_ref = callback_clone.borrow();
                if let Some(cb) = cb_ref.as_ref() {
                    if let Err(e) = window.request_animation_frame(cb.as_ref().unchecked_ref()) {
                        error!("requestAnimationFrame failed, frame loop stopped: {e:?}");
                    }
                }
            }) as Box<dyn FnMut()>));

            if let Some(cb) = callback.borrow().as_ref() {
                self.window.request_animation_frame(cb.as_ref().unchecked_ref())?;
            }

            // Leak the closure to keep it alive
            std::mem::forget(callback);
            Ok(())
        }
    }
}
