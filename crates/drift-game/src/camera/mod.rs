//! Camera system module
//!
//! Player-driven look, first/third person zoom, and the follow camera.

mod config;
mod controller;

pub use config::CameraConfig;
pub use controller::CameraController;
