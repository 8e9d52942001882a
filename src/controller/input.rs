/// Platform-agnostic desktop mouse input for the orbit camera

/// Platform-independent input events
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    MouseDown { button: MouseButton, x: f32, y: f32 },
    MouseUp { button: MouseButton },
    MouseMove { dx: f32, dy: f32 },
    MouseWheel { delta_y: f32 },
    FocusLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn from_web_button(button: i16) -> Self {
        match button {
            0 => MouseButton::Left,
            1 => MouseButton::Middle,
            2 => MouseButton::Right,
            _ => MouseButton::Left,
        }
    }
}

/// Accumulated mouse input between two frames
#[derive(Debug, Default)]
pub struct InputState {
    pub dragging: bool,
    pub mouse_pos: (f32, f32),
    drag_delta: (f32, f32),
    wheel_delta: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process an input event and update state
    pub fn process_event(&mut self, event: &InputEvent) {
        match event {
            InputEvent::MouseDown { button: MouseButton::Left, x, y } => {
                self.dragging = true;
                self.mouse_pos = (*x, *y);
            }
            InputEvent::MouseUp { button: MouseButton::Left } | InputEvent::FocusLost => {
                self.dragging = false;
            }
            InputEvent::MouseMove { dx, dy } => {
                if self.dragging {
                    self.drag_delta.0 += dx;
                    self.drag_delta.1 += dy;
                }
            }
            InputEvent::MouseWheel { delta_y } => {
                self.wheel_delta += delta_y;
            }
            _ => {}
        }
    }

    pub fn consume_drag(&mut self) -> (f32, f32) {
        std::mem::take(&mut self.drag_delta)
    }

    pub fn consume_wheel(&mut self) -> f32 {
        std::mem::take(&mut self.wheel_delta)
    }
}

pub mod wasm {
    use super::*;
    use web_sys::{Event, MouseEvent};

    pub fn mouse_down_to_input(e: &MouseEvent) -> InputEvent {
        InputEvent::MouseDown {
            button: MouseButton::from_web_button(e.button()),
            x: e.client_x() as f32,
            y: e.client_y() as f32,
        }
    }

    pub fn mouse_up_to_input(e: &MouseEvent) -> InputEvent {
        InputEvent::MouseUp { button: MouseButton::from_web_button(e.button()) }
    }

    pub fn mouse_move_to_input(e: &MouseEvent) -> InputEvent {
        InputEvent::MouseMove { dx: e.movement_x() as f32, dy: e.movement_y() as f32 }
    }

    pub fn mouse_wheel_to_input(e: &Event) -> Option<InputEvent> {
        let js_val = wasm_bindgen::JsValue::from(e.clone());
        let delta_y = js_sys::Reflect::get(&js_val, &wasm_bindgen::JsValue::from_str("deltaY")).ok()?;
        delta_y.as_f64().map(|dy| InputEvent::MouseWheel { delta_y: dy as f32 })
    }
}
