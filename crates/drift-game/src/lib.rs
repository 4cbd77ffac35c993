//! Drift Game - Player locomotion and replication
//!
//! Provides the local and remote player controllers, the camera, input
//! handling, and the world that schedules them each frame.

pub mod anchors;
pub mod camera;
pub mod input;
pub mod player;
pub mod world;

pub use anchors::Anchors;
pub use camera::{CameraConfig, CameraController};
pub use input::{InputAction, InputBindings, InputHandler, InputState, TouchPan, TouchStick, XrInput};
pub use player::{
    EffectEnd, LocalPlayer, LocomotionConfig, LocomotionState, Mode, NetworkSync, RemotePlayer,
};
pub use world::{World, WorldConfig};
