//! Locomotion state shared by the fixed and render updates

use drift_physics::{ActorId, CombineMode};
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Animation mode, sent over the wire as its number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Mode {
    #[default]
    Idle = 0,
    Walk = 1,
    Run = 2,
    Jump = 3,
    Fall = 4,
    Fly = 5,
    Talk = 6,
}

impl Mode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Mode> {
        Some(match value {
            0 => Mode::Idle,
            1 => Mode::Walk,
            2 => Mode::Run,
            3 => Mode::Jump,
            4 => Mode::Fall,
            5 => Mode::Fly,
            6 => Mode::Talk,
            _ => return None,
        })
    }
}

/// Body the player stood on last step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformTrack {
    pub actor: ActorId,
    /// Platform transform when last sampled
    pub prev: Mat4,
}

/// External push being integrated into the capsule's velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushForce {
    pub force: Vec3,
    /// Whether the first step of this push has been applied
    pub applied: bool,
}

impl PushForce {
    pub fn new(force: Vec3) -> Self {
        Self {
            force,
            applied: false,
        }
    }

    /// Decay by one step; false once the push has died out
    pub fn decay(&mut self, drag: f32, dt: f32, cutoff: f32) -> bool {
        let factor = 1.0 - drag * dt;
        if factor < 0.0 {
            self.force = Vec3::ZERO;
        } else {
            self.force *= factor;
        }
        self.force.length() >= cutoff
    }
}

/// Per-character locomotion flags, mutated by the fixed update
#[derive(Debug, Clone, PartialEq)]
pub struct LocomotionState {
    pub grounded: bool,
    pub ground_normal: Vec3,
    /// Angle between the ground normal and up, in degrees
    pub ground_angle: f32,
    /// Standing on a surface too steep to walk
    pub slipping: bool,
    /// Jump requested, still on the ground
    pub jumped: bool,
    /// Left the ground from a jump
    pub jumping: bool,
    pub just_left_ground: bool,
    pub fall_timer: f32,
    pub falling: bool,
    pub fall_start_y: f32,
    pub fall_distance: f32,
    pub flying: bool,
    pub last_jump_at: f32,
    pub platform: Option<PlatformTrack>,
    pub push: Option<PushForce>,
    /// Friction combine currently applied to the capsule
    pub friction: Option<CombineMode>,
    pub mode: Mode,
}

impl Default for LocomotionState {
    fn default() -> Self {
        Self {
            grounded: false,
            ground_normal: Vec3::Y,
            ground_angle: 0.0,
            slipping: false,
            jumped: false,
            jumping: false,
            just_left_ground: false,
            fall_timer: 0.0,
            falling: false,
            fall_start_y: 0.0,
            fall_distance: 0.0,
            flying: false,
            last_jump_at: f32::NEG_INFINITY,
            platform: None,
            push: None,
            friction: None,
            mode: Mode::Idle,
        }
    }
}

/// Render-side inputs to mode selection
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeInputs {
    pub emote: bool,
    pub moving: bool,
    pub running: bool,
    pub speaking: bool,
}

impl LocomotionState {
    /// Pick the animation mode; an emote overrides everything with idle
    pub fn select_mode(&self, inputs: ModeInputs, fall_mode_distance: f32) -> Mode {
        if inputs.emote {
            Mode::Idle
        } else if self.flying {
            Mode::Fly
        } else if self.jumping {
            Mode::Jump
        } else if self.falling {
            if self.fall_distance > fall_mode_distance {
                Mode::Fall
            } else {
                Mode::Jump
            }
        } else if inputs.moving {
            if inputs.running {
                Mode::Run
            } else {
                Mode::Walk
            }
        } else if inputs.speaking {
            Mode::Talk
        } else {
            Mode::Idle
        }
    }
}
