//! Frame time and the fixed-timestep accumulator
//!
//! Physics and the local character controller run at a constant rate while
//! rendering runs at whatever rate the host manages. `GameTime` converts a raw
//! frame delta into a number of fixed steps plus an interpolation alpha.

use serde::{Deserialize, Serialize};

/// Configuration for game time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// How many simulated seconds pass per real second
    pub time_scale: f32,
    /// Fixed timestep for physics (in seconds)
    pub fixed_timestep: f32,
    /// Maximum delta time to prevent spiral of death
    pub max_delta_time: f32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            fixed_timestep: 1.0 / 50.0,
            max_delta_time: 1.0 / 30.0,
        }
    }
}

/// Game time tracking
#[derive(Debug, Clone)]
pub struct GameTime {
    /// Configuration
    pub config: TimeConfig,
    /// Time since start in seconds
    pub total_time: f64,
    /// Delta time for this frame (clamped)
    pub delta_time: f32,
    /// Unscaled delta time
    pub unscaled_delta_time: f32,
    /// Frame counter
    pub frame_count: u64,
    /// Whether time is paused
    pub paused: bool,
    /// Accumulated time for fixed timestep
    fixed_accumulator: f32,
}

impl Default for GameTime {
    fn default() -> Self {
        Self::new(TimeConfig::default())
    }
}

impl GameTime {
    /// Create a new game time with custom config
    pub fn new(config: TimeConfig) -> Self {
        Self {
            config,
            total_time: 0.0,
            delta_time: 0.0,
            unscaled_delta_time: 0.0,
            frame_count: 0,
            paused: false,
            fixed_accumulator: 0.0,
        }
    }

    /// Update the game time with the raw delta from the previous frame
    pub fn update(&mut self, raw_delta: f32) {
        self.unscaled_delta_time = raw_delta.clamp(0.0, self.config.max_delta_time);
        self.frame_count += 1;

        if self.paused {
            self.delta_time = 0.0;
            return;
        }

        self.delta_time = self.unscaled_delta_time * self.config.time_scale;
        self.total_time += self.delta_time as f64;
        self.fixed_accumulator += self.delta_time;
    }

    /// The fixed step length in seconds
    pub fn fixed_delta(&self) -> f32 {
        self.config.fixed_timestep
    }

    /// Whether at least one fixed step is due this frame
    pub fn will_fixed_step(&self) -> bool {
        self.fixed_accumulator >= self.config.fixed_timestep
    }

    /// Get the number of fixed timesteps to process this frame
    pub fn fixed_steps(&mut self) -> u32 {
        let mut steps = 0;
        while self.fixed_accumulator >= self.config.fixed_timestep {
            self.fixed_accumulator -= self.config.fixed_timestep;
            steps += 1;
        }
        steps
    }

    /// Interpolation factor for rendering between physics steps, in `[0, 1]`
    pub fn fixed_interpolation(&self) -> f32 {
        (self.fixed_accumulator / self.config.fixed_timestep).clamp(0.0, 1.0)
    }

    /// Seconds elapsed as `f32`, for gesture timers
    pub fn elapsed(&self) -> f32 {
        self.total_time as f32
    }

    /// Pause time
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume time
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Set the time scale (0.0 = frozen, 1.0 = normal, 2.0 = double speed)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.config.time_scale = scale.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_time() {
        let mut time = GameTime::default();
        time.update(0.016);

        assert!(time.delta_time > 0.0);
        assert_eq!(time.frame_count, 1);

        time.pause();
        time.update(0.016);
        assert_eq!(time.delta_time, 0.0);
    }

    #[test]
    fn test_fixed_steps_and_alpha() {
        let mut time = GameTime::new(TimeConfig {
            time_scale: 1.0,
            fixed_timestep: 0.02,
            max_delta_time: 1.0,
        });
        time.update(0.05);
        assert!(time.will_fixed_step());
        assert_eq!(time.fixed_steps(), 2);
        assert!(!time.will_fixed_step());
        assert!((time.fixed_interpolation() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_delta_is_clamped() {
        let mut time = GameTime::default();
        time.update(5.0);
        assert!((time.delta_time - time.config.max_delta_time).abs() < 1e-6);
        time.update(-1.0);
        assert_eq!(time.delta_time, 0.0);
    }
}
