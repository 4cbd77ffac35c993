//! Camera configuration

use serde::{Deserialize, Serialize};

/// Camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Look speed for a locked pointer (radians per pixel-second)
    pub pointer_look_speed: f32,
    /// Look speed for touch panning
    pub pan_look_speed: f32,
    /// Zoom speed (scroll sensitivity)
    pub zoom_speed: f32,
    /// Minimum zoom (0 = first person)
    pub min_zoom: f32,
    /// Maximum zoom distance for third person
    pub max_zoom: f32,
    /// Zoom when the camera is created
    pub initial_zoom: f32,
    /// Pitch when the camera is created, in degrees
    pub initial_pitch: f32,
    /// XR snap turn step, in degrees
    pub snap_turn: f32,
    /// Minimum pitch angle in degrees
    pub pitch_min: f32,
    /// Maximum pitch angle in degrees
    pub pitch_max: f32,
    /// Height of the orbit pivot above the player's feet
    pub cam_height: f32,
    /// Horizontal offset in third person (shoulder view)
    pub shoulder_offset: f32,
    /// Follow interpolation smoothing (0-1, lower = smoother)
    pub follow_smoothing: f32,
    /// Collision radius for pulling the camera in front of walls
    pub collision_radius: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            pointer_look_speed: 0.1,
            pan_look_speed: 0.4,
            zoom_speed: 2.0,
            min_zoom: 0.0,
            max_zoom: 8.0,
            initial_zoom: 1.5,
            initial_pitch: -15.0,
            snap_turn: 45.0,
            pitch_min: -89.0,
            pitch_max: 89.0,
            cam_height: 1.2,
            shoulder_offset: 0.3,
            follow_smoothing: 0.5,
            collision_radius: 0.2,
        }
    }
}
