//! Snapshots of WebXR input forwarded by the host page, and the inbox that
//! queues them until the next frame.
use std::collections::{HashMap, VecDeque};

use glam::Mat4;

use crate::model::{TargetRayMode, CONTROLLER_COUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Handedness {
    #[default]
    None,
    Left,
    Right,
}

impl Handedness {
    pub fn parse(s: &str) -> Self {
        match s {
            "left" => Handedness::Left,
            "right" => Handedness::Right,
            _ => Handedness::None,
        }
    }
}

impl TargetRayMode {
    /// Unrecognised modes get no pointer visual, like `screen`
    pub fn parse(s: &str) -> Self {
        match s {
            "tracked-pointer" => TargetRayMode::TrackedPointer,
            "gaze" => TargetRayMode::Gaze,
            _ => TargetRayMode::Screen,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ButtonState {
    pub pressed: bool,
    pub value: f32,
}

/// Buttons and axes of one gamepad at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamepadSnapshot {
    pub buttons: Vec<ButtonState>,
    pub axes: Vec<f32>,
}

impl GamepadSnapshot {
    pub fn button(&self, index: usize) -> Option<ButtonState> {
        self.buttons.get(index).copied()
    }

    pub fn is_pressed(&self, index: usize) -> bool {
        self.button(index).is_some_and(|b| b.pressed)
    }

    /// Missing axes read as centered
    pub fn axis(&self, index: usize) -> f32 {
        self.axes.get(index).copied().unwrap_or(0.0)
    }
}

/// State of one connected input source during a frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSourceState {
    pub handedness: Handedness,
    pub target_ray_mode: TargetRayMode,
    /// Target-ray pose relative to the rig
    pub pose: Option<Mat4>,
    pub gamepad: Option<GamepadSnapshot>,
}

/// Everything the XR runtime reported for one frame. `sources` is indexed by
/// controller slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XrFrameInput {
    /// Viewer pose relative to the rig
    pub head: Option<Mat4>,
    pub sources: [Option<InputSourceState>; CONTROLLER_COUNT],
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    Connected { slot: usize, source: InputSourceState },
    Disconnected { slot: usize },
    SelectStart { slot: usize },
    SelectEnd { slot: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Started,
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XrEvent {
    Session(SessionEvent),
    Controller(ControllerEvent),
}

/// Last gamepad snapshot per handedness, for edge detection
#[derive(Debug, Default)]
pub struct PreviousInputs {
    snapshots: HashMap<Handedness, GamepadSnapshot>,
}

impl PreviousInputs {
    /// True only on a not-pressed -> pressed transition
    pub fn rising_edge(&self, handedness: Handedness, current: &GamepadSnapshot, index: usize) -> bool {
        let was_pressed = self
            .snapshots
            .get(&handedness)
            .is_some_and(|prev| prev.is_pressed(index));
        current.is_pressed(index) && !was_pressed
    }

    pub fn store(&mut self, handedness: Handedness, snapshot: GamepadSnapshot) {
        self.snapshots.insert(handedness, snapshot);
    }

    pub fn get(&self, handedness: Handedness) -> Option<&GamepadSnapshot> {
        self.snapshots.get(&handedness)
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

/// Events and frame input pushed by the page between two animation frames
#[derive(Debug, Default)]
pub struct XrInbox {
    events: VecDeque<XrEvent>,
    frame: Option<XrFrameInput>,
    exit_requested: bool,
}

impl XrInbox {
    pub fn push_event(&mut self, event: XrEvent) {
        self.events.push_back(event);
    }

    /// Only the most recent frame input is kept
    pub fn submit_frame(&mut self, frame: XrFrameInput) {
        self.frame = Some(frame);
    }

    pub fn drain_events(&mut self) -> Vec<XrEvent> {
        self.events.drain(..).collect()
    }

    pub fn take_frame(&mut self) -> Option<XrFrameInput> {
        self.frame.take()
    }

    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub fn take_exit_request(&mut self) -> bool {
        std::mem::take(&mut self.exit_requested)
    }
}

/// Conversion of WebXR objects handed over from JavaScript
pub mod wasm {
    use super::*;
    use wasm_bindgen::JsValue;

    fn field(obj: &JsValue, key: &str) -> Option<JsValue> {
        js_sys::Reflect::get(obj, &JsValue::from_str(key))
            .ok()
            .filter(|v| !v.is_undefined() && !v.is_null())
    }

    /// Column-major 16 element array-like into a matrix
    pub fn matrix_from_js(value: &JsValue) -> Option<Mat4> {
        if value.is_undefined() || value.is_null() {
            return None;
        }
        let values = js_sys::Float32Array::new(value).to_vec();
        (values.len() == 16).then(|| Mat4::from_cols_slice(&values))
    }

    pub fn gamepad_from_js(gamepad: &JsValue) -> GamepadSnapshot {
        let buttons = field(gamepad, "buttons")
            .map(|b| {
                js_sys::Array::from(&b)
                    .iter()
                    .map(|button| ButtonState {
                        pressed: field(&button, "pressed").and_then(|v| v.as_bool()).unwrap_or(false),
                        value: field(&button, "value").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let axes = field(gamepad, "axes")
            .map(|a| {
                js_sys::Array::from(&a)
                    .iter()
                    .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                    .collect()
            })
            .unwrap_or_default();
        GamepadSnapshot { buttons, axes }
    }

    /// Read an `XRInputSource`-shaped object. `pose` is supplied separately
    /// because it comes from the frame, not the source.
    pub fn input_source_from_js(source: &JsValue, pose: Option<Mat4>) -> Option<InputSourceState> {
        if source.is_undefined() || source.is_null() {
            return None;
        }
        Some(InputSourceState {
            handedness: field(source, "handedness")
                .and_then(|v| v.as_string())
                .map(|s| Handedness::parse(&s))
                .unwrap_or_default(),
            target_ray_mode: field(source, "targetRayMode")
                .and_then(|v| v.as_string())
                .map(|s| TargetRayMode::parse(&s))
                .unwrap_or(TargetRayMode::Screen),
            pose,
            gamepad: field(source, "gamepad").map(|g| gamepad_from_js(&g)),
        })
    }

    /// Read `{ head, poses: [m16|null, m16|null], sources: [XRInputSource|null, ...] }`
    pub fn frame_from_js(frame: &JsValue) -> XrFrameInput {
        let head = field(frame, "head").and_then(|h| matrix_from_js(&h));
        let poses = field(frame, "poses").map(|p| js_sys::Array::from(&p));
        let sources = field(frame, "sources").map(|s| js_sys::Array::from(&s));

        let mut out = XrFrameInput { head, ..Default::default() };
        for (slot, entry) in out.sources.iter_mut().enumerate() {
            let pose = poses
                .as_ref()
                .and_then(|p| matrix_from_js(&p.get(slot as u32)));
            *entry = sources
                .as_ref()
                .and_then(|s| input_source_from_js(&s.get(slot as u32), pose));
        }
        out
    }
}
