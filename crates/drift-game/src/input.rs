//! Input system with action-based mapping
//!
//! Provides an abstraction layer between raw input events and player
//! intent: keyboard actions, pointer look, touch joystick and pan, and XR
//! controller state.

use std::collections::{HashMap, HashSet};

use glam::{Quat, Vec2};
use serde::{Deserialize, Serialize};
use winit::event::{ElementState, MouseScrollDelta};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Outer radius of the virtual joystick, in pixels
pub const STICK_OUTER_RADIUS: f32 = 50.0;
/// Inner (knob) radius of the virtual joystick, in pixels
pub const STICK_INNER_RADIUS: f32 = 25.0;
/// Touch travel before the joystick engages, in pixels
pub const STICK_ACTIVATION: f32 = 3.0;

/// Player intents that can be triggered by input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputAction {
    /// Move forward (W by default)
    MoveForward,
    /// Move backward (S by default)
    MoveBackward,
    /// Move left (A by default)
    MoveLeft,
    /// Move right (D by default)
    MoveRight,
    /// Jump, or fly up (Space by default)
    Jump,
    /// Run modifier, doubles fly thrust (Shift by default)
    Sprint,
    /// Fly down (C by default)
    Descend,
}

/// A left-half touch acting as a movement joystick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchStick {
    pub touch: u64,
    pub center: Vec2,
    pub position: Vec2,
    pub active: bool,
}

impl TouchStick {
    fn new(touch: u64, position: Vec2) -> Self {
        Self {
            touch,
            center: position,
            position,
            active: false,
        }
    }

    /// Stick deflection in `[-1, 1]` per axis once engaged.
    ///
    /// Dragging beyond the stick's travel pulls the center along behind the
    /// touch, so reversing direction responds immediately.
    pub fn axis(&mut self) -> Option<Vec2> {
        if !self.active {
            self.active = self.center.distance(self.position) > STICK_ACTIVATION;
        }
        if !self.active {
            return None;
        }
        let travel = STICK_OUTER_RADIUS - STICK_INNER_RADIUS;
        let offset = self.center - self.position;
        let distance = offset.length();
        if distance > travel {
            self.center = self.position + offset * (travel / distance);
        }
        Some((self.position - self.center) / travel)
    }
}

/// A right-half touch panning the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPan {
    pub touch: u64,
    pub position: Vec2,
    /// Movement since the last frame
    pub delta: Vec2,
}

/// XR controller and headset state for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrInput {
    /// Left thumbstick; `y` is forward/back in stick space (forward is negative)
    pub left_stick: Vec2,
    pub right_stick: Vec2,
    /// Right controller primary button held
    pub jump_down: bool,
    /// Right controller primary button pressed this frame
    pub jump_pressed: bool,
    /// Headset orientation relative to the rig
    pub head_rotation: Quat,
}

impl Default for XrInput {
    fn default() -> Self {
        Self {
            left_stick: Vec2::ZERO,
            right_stick: Vec2::ZERO,
            jump_down: false,
            jump_pressed: false,
            head_rotation: Quat::IDENTITY,
        }
    }
}

/// Current state of all inputs for a frame
#[derive(Debug, Clone, Default)]
pub struct InputState {
    /// Actions currently held down
    pub held: HashSet<InputAction>,
    /// Actions that were just pressed this frame
    pub just_pressed: HashSet<InputAction>,
    /// Actions that were just released this frame
    pub just_released: HashSet<InputAction>,
    /// Pointer movement delta for this frame, in pixels
    pub mouse_delta: Vec2,
    /// Scroll wheel delta for this frame
    pub scroll_delta: f32,
    /// Whether the pointer is locked to the window
    pub cursor_captured: bool,
    /// Width of the touch surface, splitting stick and pan halves
    pub screen_width: f32,
    pub stick: Option<TouchStick>,
    pub pan: Option<TouchPan>,
    /// Present while an XR session is running
    pub xr: Option<XrInput>,
}

impl InputState {
    /// Create a new empty input state
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an action is currently held
    pub fn is_held(&self, action: InputAction) -> bool {
        self.held.contains(&action)
    }

    /// Check if an action was just pressed this frame
    pub fn is_just_pressed(&self, action: InputAction) -> bool {
        self.just_pressed.contains(&action)
    }

    /// Check if an action was just released this frame
    pub fn is_just_released(&self, action: InputAction) -> bool {
        self.just_released.contains(&action)
    }

    /// Clear frame-specific data (call at end of frame)
    pub fn clear_frame(&mut self) {
        self.just_pressed.clear();
        self.just_released.clear();
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
        if let Some(pan) = self.pan.as_mut() {
            pan.delta = Vec2::ZERO;
        }
        if let Some(xr) = self.xr.as_mut() {
            xr.jump_pressed = false;
        }
    }

    /// Clear all input state
    pub fn clear_all(&mut self) {
        self.held.clear();
        self.clear_frame();
        self.stick = None;
        self.pan = None;
    }

    fn press(&mut self, action: InputAction) {
        if self.held.insert(action) {
            self.just_pressed.insert(action);
        }
    }

    fn release(&mut self, action: InputAction) {
        if self.held.remove(&action) {
            self.just_released.insert(action);
        }
    }
}

/// Maps physical keys to actions
#[derive(Debug, Clone)]
pub struct InputBindings {
    bindings: HashMap<KeyCode, InputAction>,
}

impl Default for InputBindings {
    fn default() -> Self {
        let mut bindings = Self {
            bindings: HashMap::new(),
        };

        // Default WASD bindings
        bindings.bind(KeyCode::KeyW, InputAction::MoveForward);
        bindings.bind(KeyCode::KeyS, InputAction::MoveBackward);
        bindings.bind(KeyCode::KeyA, InputAction::MoveLeft);
        bindings.bind(KeyCode::KeyD, InputAction::MoveRight);

        // Arrow keys as alternative
        bindings.bind(KeyCode::ArrowUp, InputAction::MoveForward);
        bindings.bind(KeyCode::ArrowDown, InputAction::MoveBackward);
        bindings.bind(KeyCode::ArrowLeft, InputAction::MoveLeft);
        bindings.bind(KeyCode::ArrowRight, InputAction::MoveRight);

        bindings.bind(KeyCode::Space, InputAction::Jump);
        bindings.bind(KeyCode::ShiftLeft, InputAction::Sprint);
        bindings.bind(KeyCode::ShiftRight, InputAction::Sprint);
        bindings.bind(KeyCode::KeyC, InputAction::Descend);

        bindings
    }
}

impl InputBindings {
    /// Create new input bindings with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a key to an action
    pub fn bind(&mut self, key: KeyCode, action: InputAction) {
        self.bindings.insert(key, action);
    }

    /// Unbind a key
    pub fn unbind(&mut self, key: KeyCode) {
        self.bindings.remove(&key);
    }

    /// Get the action for a key, if any
    pub fn get_key_action(&self, key: KeyCode) -> Option<InputAction> {
        self.bindings.get(&key).copied()
    }
}

/// Input handler that processes raw events and updates state
#[derive(Debug)]
pub struct InputHandler {
    /// Current input state
    pub state: InputState,
    /// Input bindings
    pub bindings: InputBindings,
    /// Mouse sensitivity multiplier
    pub mouse_sensitivity: f32,
    /// Invert Y axis
    pub invert_y: bool,
}

impl Default for InputHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHandler {
    /// Create a new input handler with default bindings
    pub fn new() -> Self {
        Self {
            state: InputState::new(),
            bindings: InputBindings::default(),
            mouse_sensitivity: 1.0,
            invert_y: false,
        }
    }

    /// Handle a keyboard event
    pub fn handle_keyboard(&mut self, physical_key: PhysicalKey, element_state: ElementState) {
        if let PhysicalKey::Code(key_code) = physical_key {
            if let Some(action) = self.bindings.get_key_action(key_code) {
                self.set_action(action, element_state == ElementState::Pressed);
            }
        }
    }

    /// Press or release an action directly (on-screen buttons, scripted input)
    pub fn set_action(&mut self, action: InputAction, down: bool) {
        if down {
            self.state.press(action);
        } else {
            self.state.release(action);
        }
    }

    /// Handle mouse movement
    pub fn handle_mouse_motion(&mut self, delta: (f64, f64)) {
        if self.state.cursor_captured {
            let y_mult = if self.invert_y { -1.0 } else { 1.0 };
            self.state.mouse_delta += Vec2::new(
                delta.0 as f32 * self.mouse_sensitivity,
                delta.1 as f32 * self.mouse_sensitivity * y_mult,
            );
        }
    }

    /// Handle scroll wheel
    pub fn handle_scroll(&mut self, delta: MouseScrollDelta) {
        let scroll = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
        };
        self.state.scroll_delta += scroll;
    }

    /// A new touch: the first one on the left half becomes the joystick,
    /// otherwise the first free touch pans the camera
    pub fn handle_touch_start(&mut self, touch: u64, position: Vec2) {
        if self.state.stick.is_none() && position.x < self.state.screen_width / 2.0 {
            self.state.stick = Some(TouchStick::new(touch, position));
        } else if self.state.pan.is_none() {
            self.state.pan = Some(TouchPan {
                touch,
                position,
                delta: Vec2::ZERO,
            });
        }
    }

    pub fn handle_touch_move(&mut self, touch: u64, position: Vec2) {
        if let Some(stick) = self.state.stick.as_mut().filter(|s| s.touch == touch) {
            stick.position = position;
        }
        if let Some(pan) = self.state.pan.as_mut().filter(|p| p.touch == touch) {
            pan.delta += position - pan.position;
            pan.position = position;
        }
    }

    pub fn handle_touch_end(&mut self, touch: u64) {
        if self.state.stick.is_some_and(|s| s.touch == touch) {
            self.state.stick = None;
        }
        if self.state.pan.is_some_and(|p| p.touch == touch) {
            self.state.pan = None;
        }
    }

    pub fn set_screen_width(&mut self, width: f32) {
        self.state.screen_width = width;
    }

    /// Replace XR state for this frame; `None` ends the session
    pub fn set_xr(&mut self, xr: Option<XrInput>) {
        self.state.xr = xr;
    }

    /// Clear frame-specific input data
    pub fn end_frame(&mut self) {
        self.state.clear_frame();
    }

    /// Set cursor capture state
    pub fn set_cursor_captured(&mut self, captured: bool) {
        self.state.cursor_captured = captured;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let bindings = InputBindings::default();
        assert_eq!(
            bindings.get_key_action(KeyCode::KeyW),
            Some(InputAction::MoveForward)
        );
        assert_eq!(
            bindings.get_key_action(KeyCode::Space),
            Some(InputAction::Jump)
        );
        assert_eq!(
            bindings.get_key_action(KeyCode::KeyC),
            Some(InputAction::Descend)
        );
    }

    #[test]
    fn test_input_state() {
        let mut handler = InputHandler::new();
        handler.handle_keyboard(PhysicalKey::Code(KeyCode::KeyW), ElementState::Pressed);
        handler.set_action(InputAction::Jump, true);

        let state = &handler.state;
        assert!(state.is_held(InputAction::MoveForward));
        assert!(state.is_just_pressed(InputAction::Jump));
        assert!(!state.is_held(InputAction::Sprint));

        handler.end_frame();
        // key repeat does not re-trigger a press
        handler.set_action(InputAction::Jump, true);
        assert!(handler.state.is_held(InputAction::MoveForward));
        assert!(!handler.state.is_just_pressed(InputAction::Jump));
    }

    #[test]
    fn touches_split_into_stick_and_pan() {
        let mut handler = InputHandler::new();
        handler.set_screen_width(800.0);
        handler.handle_touch_start(1, Vec2::new(600.0, 300.0));
        handler.handle_touch_start(2, Vec2::new(100.0, 300.0));
        assert_eq!(handler.state.pan.map(|p| p.touch), Some(1));
        assert_eq!(handler.state.stick.map(|s| s.touch), Some(2));

        handler.handle_touch_move(1, Vec2::new(610.0, 295.0));
        assert_eq!(handler.state.pan.map(|p| p.delta), Some(Vec2::new(10.0, -5.0)));
        handler.end_frame();
        assert_eq!(handler.state.pan.map(|p| p.delta), Some(Vec2::ZERO));

        handler.handle_touch_end(2);
        assert!(handler.state.stick.is_none());
    }

    #[test]
    fn stick_engages_and_drags_its_center() {
        let mut stick = TouchStick::new(0, Vec2::new(100.0, 100.0));
        stick.position = Vec2::new(102.0, 100.0);
        assert_eq!(stick.axis(), None);

        stick.position = Vec2::new(110.0, 100.0);
        let axis = stick.axis().unwrap();
        assert!((axis - Vec2::new(0.4, 0.0)).length() < 1e-5);

        // full deflection and beyond: the center trails at the travel radius
        stick.position = Vec2::new(100.0, 200.0);
        let axis = stick.axis().unwrap();
        assert!((axis.length() - 1.0).abs() < 1e-5);
        assert!((stick.center.distance(stick.position) - 25.0).abs() < 1e-3);
    }
}
