// CONTROLLER: input, interaction logic and the frame loop
pub mod input;
pub mod xr_input;
pub mod grab;
pub mod locomotion;
pub mod actions;
pub mod orbit;
pub mod session;
pub mod frame_loop;

pub use input::{InputEvent, InputState, MouseButton};
pub use xr_input::{
    ControllerEvent, GamepadSnapshot, Handedness, InputSourceState, SessionEvent, XrEvent, XrFrameInput, XrInbox,
};
pub use grab::{GrabState, GrabSystem};
pub use locomotion::Locomotion;
pub use actions::ButtonActions;
pub use orbit::OrbitController;
pub use session::{ControllerSlot, InteractionSession, UiAction};
pub use frame_loop::FrameLoopContext;
