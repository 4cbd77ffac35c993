//! Locomotion tuning

use serde::{Deserialize, Serialize};

/// Local character locomotion parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocomotionConfig {
    /// Capsule mass in kilograms
    pub mass: f32,
    /// Downward acceleration while airborne (the capsule ignores world gravity)
    pub gravity: f32,
    /// Peak height of a ground jump
    pub jump_height: f32,
    pub capsule_radius: f32,
    /// Total capsule height including both caps
    pub capsule_height: f32,
    /// Ground sweep sphere is this much thinner than the capsule
    pub sweep_inset: f32,
    /// Ground sweep starts this far inside the capsule
    pub sweep_lift: f32,
    /// Ground sweep reaches this far below the feet
    pub sweep_reach: f32,
    /// Platform probe starts this far above the feet
    pub platform_probe_lift: f32,
    pub platform_probe_distance: f32,
    /// Steepest walkable surface, in degrees
    pub max_slope: f32,
    /// Vertical velocity forced when stepping off an edge
    pub walk_off_velocity: f32,
    /// Extra downward velocity per step while slipping
    pub slip_velocity: f32,
    /// Drag on velocity parallel to the ground, per second
    pub ground_drag: f32,
    /// Decay rate of external pushes, per second
    pub push_drag: f32,
    /// Pushes weaker than this are dropped
    pub push_cutoff: f32,
    pub walk_speed: f32,
    pub run_speed: f32,
    /// Move speed to force conversion
    pub move_force_scale: f32,
    pub fly_force: f32,
    pub fly_drag: f32,
    /// Fly thrust multiplier while running
    pub fly_run_multiplier: f32,
    /// Seconds of descent before a fall is confirmed
    pub fall_confirm: f32,
    /// Falls shorter than this animate as a jump
    pub fall_mode_distance: f32,
    /// Two jump presses within this window toggle flying in build mode
    pub double_jump_window: f32,
    /// Fraction of standard gravity pressed into dynamic platforms
    pub platform_compensation: f32,
    /// Stick deflection that counts as running
    pub run_stick_threshold: f32,
    /// Remaining facing error after one second of turning
    pub facing_smoothing: f32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            mass: 1.0,
            gravity: 20.0,
            jump_height: 1.5,
            capsule_radius: 0.3,
            capsule_height: 1.6,
            sweep_inset: 0.01,
            sweep_lift: 0.12,
            sweep_reach: 0.1,
            platform_probe_lift: 0.2,
            platform_probe_distance: 2.0,
            max_slope: 60.0,
            walk_off_velocity: -5.0,
            slip_velocity: 0.5,
            ground_drag: 10.0,
            push_drag: 20.0,
            push_cutoff: 0.01,
            walk_speed: 3.0,
            run_speed: 6.0,
            move_force_scale: 10.0,
            fly_force: 100.0,
            fly_drag: 300.0,
            fly_run_multiplier: 2.0,
            fall_confirm: 0.1,
            fall_mode_distance: 1.6,
            double_jump_window: 0.4,
            platform_compensation: 0.2,
            run_stick_threshold: 0.9,
            facing_smoothing: 1e-8,
        }
    }
}

impl LocomotionConfig {
    /// Gravity force on the capsule
    pub fn effective_gravity(&self) -> f32 {
        self.gravity * self.mass
    }

    /// Initial vertical velocity that peaks at `jump_height`
    pub fn jump_velocity(&self) -> f32 {
        (2.0 * self.effective_gravity() * self.jump_height).sqrt() / self.mass.sqrt()
    }

    /// Half the distance between the capsule's cap centres
    pub fn capsule_half_height(&self) -> f32 {
        (self.capsule_height - 2.0 * self.capsule_radius) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_values() {
        let config = LocomotionConfig::default();
        assert!((config.jump_velocity() - 60f32.sqrt()).abs() < 1e-5);
        assert!((config.capsule_half_height() - 0.5).abs() < 1e-6);

        let heavy = LocomotionConfig {
            mass: 4.0,
            ..Default::default()
        };
        // twice the gravity force, half the velocity scale
        assert!((heavy.jump_velocity() - 240f32.sqrt() / 2.0).abs() < 1e-4);
    }
}
