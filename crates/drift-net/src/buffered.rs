//! Jitter-buffered interpolation for remote entities
//!
//! Snapshots arrive at irregular intervals. Rendering `buffer` seconds in
//! the past means there is almost always a pair of samples straddling the
//! render time, so remote motion stays smooth through jitter. Only the last
//! three samples are kept; rendering never looks further back than that.
//! The local clock is kept in f64 so long sessions keep sub-frame precision.

use glam::{Quat, Vec3};

/// Blend between two values of a buffered quantity
pub trait Interpolate: Copy {
    fn interpolate(a: Self, b: Self, t: f32) -> Self;
}

impl Interpolate for Vec3 {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.lerp(b, t)
    }
}

impl Interpolate for Quat {
    fn interpolate(a: Self, b: Self, t: f32) -> Self {
        a.slerp(b, t)
    }
}

const SLOTS: usize = 3;

#[derive(Debug, Clone, Copy)]
struct Sample<T> {
    time: f64,
    value: T,
}

/// Three-slot ring of timestamped samples rendered with a fixed delay
#[derive(Debug, Clone)]
pub struct BufferedLerp<T> {
    value: T,
    buffer: f32,
    local_time: f64,
    snap_token: Option<u32>,
    samples: [Sample<T>; SLOTS],
    write_index: usize,
}

pub type BufferedLerpVec3 = BufferedLerp<Vec3>;
pub type BufferedLerpQuat = BufferedLerp<Quat>;

impl<T: Interpolate> BufferedLerp<T> {
    /// `buffer` should cover at least one send interval plus jitter
    pub fn new(value: T, buffer: f32) -> Self {
        Self {
            value,
            buffer,
            local_time: 0.0,
            snap_token: None,
            samples: [Sample { time: 0.0, value }; SLOTS],
            write_index: 0,
        }
    }

    /// Record an inbound snapshot. A token different from the previous push
    /// marks a discontinuity and replaces every slot with `value`.
    pub fn push(&mut self, value: T, snap_token: u32) {
        if self.snap_token != Some(snap_token) {
            self.snap_token = Some(snap_token);
            for sample in &mut self.samples {
                *sample = Sample {
                    time: self.local_time,
                    value,
                };
            }
            self.write_index = 0;
        } else {
            self.write_index = (self.write_index + 1) % SLOTS;
            self.samples[self.write_index] = Sample {
                time: self.local_time,
                value,
            };
        }
    }

    /// Advance the local clock and recompute the rendered value
    pub fn update(&mut self, delta: f32) -> T {
        self.local_time += f64::from(delta);
        let render_time = self.local_time - f64::from(self.buffer);

        let mut older: Option<&Sample<T>> = None;
        let mut newer: Option<&Sample<T>> = None;
        for sample in &self.samples {
            if sample.time <= render_time && older.map_or(true, |o| sample.time > o.time) {
                older = Some(sample);
            }
            if sample.time >= render_time && newer.map_or(true, |n| sample.time < n.time) {
                newer = Some(sample);
            }
        }

        self.value = match (older, newer) {
            (Some(older), Some(newer)) if newer.time > older.time => {
                let alpha = (render_time - older.time) / (newer.time - older.time);
                T::interpolate(older.value, newer.value, alpha.clamp(0.0, 1.0) as f32)
            }
            // clock ran past every sample: stay on the latest
            (Some(older), _) => older.value,
            // nothing old enough yet: hold the oldest
            (None, Some(newer)) => newer.value,
            (None, None) => self.value,
        };
        self.value
    }

    /// Jump straight to the most recently pushed sample
    pub fn snap(&mut self) {
        let latest = self.samples[self.write_index];
        self.local_time = latest.time + f64::from(self.buffer);
        self.value = latest.value;
    }

    pub fn value(&self) -> T {
        self.value
    }

    pub fn buffer(&self) -> f32 {
        self.buffer
    }

    pub fn local_time(&self) -> f64 {
        self.local_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn assert_vec3_eq(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-4, "{a:?} != {b:?}");
    }

    /// Samples pushed 0.1s apart: x = 0, 1, 2
    fn three_samples() -> BufferedLerpVec3 {
        let mut lerp = BufferedLerpVec3::new(Vec3::ZERO, 0.2);
        lerp.push(Vec3::ZERO, 0);
        lerp.update(0.1);
        lerp.push(Vec3::X, 0);
        lerp.update(0.1);
        lerp.push(Vec3::X * 2.0, 0);
        lerp
    }

    #[test]
    fn new_token_has_no_lag() {
        let mut lerp = BufferedLerpVec3::new(Vec3::ZERO, 0.2);
        lerp.update(1.0);
        let target = Vec3::new(4.0, -2.0, 7.5);
        lerp.push(target, 3);
        assert_eq!(lerp.update(0.0), target);
    }

    #[test]
    fn interpolates_between_bracketing_samples() {
        let mut lerp = three_samples();
        // local 0.35, render 0.15: halfway between the 0.1 and 0.2 samples
        assert_vec3_eq(lerp.update(0.15), Vec3::new(1.5, 0.0, 0.0));
        // render 0.175
        assert_vec3_eq(lerp.update(0.025), Vec3::new(1.75, 0.0, 0.0));
    }

    #[test]
    fn holds_oldest_until_render_time_reaches_samples() {
        let mut lerp = BufferedLerpVec3::new(Vec3::ZERO, 0.2);
        lerp.push(Vec3::Y, 0);
        lerp.update(0.05);
        lerp.push(Vec3::Y * 2.0, 0);
        assert_eq!(lerp.update(0.05), Vec3::Y);
    }

    #[test]
    fn stalled_feed_settles_on_newest() {
        let mut lerp = three_samples();
        assert_eq!(lerp.update(10.0), Vec3::X * 2.0);
    }

    #[test]
    fn snap_uses_most_recent_push() {
        let mut lerp = three_samples();
        lerp.snap();
        assert_eq!(lerp.value(), Vec3::X * 2.0);
        assert!((lerp.local_time() - (0.2 + f64::from(lerp.buffer()))).abs() < 1e-5);
        // rendering resumes exactly at the snapped sample
        assert_eq!(lerp.update(0.0), Vec3::X * 2.0);

        // several pushes within one frame share a timestamp
        let mut lerp = BufferedLerpVec3::new(Vec3::ZERO, 0.5);
        lerp.push(Vec3::X, 1);
        lerp.push(Vec3::Y, 1);
        lerp.push(Vec3::Z, 1);
        lerp.snap();
        assert_eq!(lerp.value(), Vec3::Z);
    }

    #[test]
    fn ring_keeps_three_samples() {
        let mut lerp = three_samples();
        lerp.update(0.1);
        // overwrites the x = 0 sample pushed at t = 0
        lerp.push(Vec3::X * 3.0, 0);
        // render time 0.0 now precedes every retained sample
        lerp.local_time = 0.2;
        assert_vec3_eq(lerp.update(0.0), Vec3::X);
    }

    #[test]
    fn long_sessions_still_interpolate() {
        let mut lerp = BufferedLerpVec3::new(Vec3::ZERO, 0.1);
        // a day of frames; an f32 clock can no longer resolve 1/60 s here
        for _ in 0..(24 * 60 * 60) {
            lerp.update(1.0);
        }
        lerp.push(Vec3::ZERO, 0);
        lerp.update(1.0 / 60.0);
        lerp.push(Vec3::X, 0);
        // render time sits halfway between the two samples
        assert_vec3_eq(lerp.update(0.1 - 1.0 / 120.0), Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn rotation_variant_slerps() {
        let mut lerp = BufferedLerpQuat::new(Quat::IDENTITY, 0.1);
        lerp.push(Quat::IDENTITY, 0);
        lerp.update(0.1);
        lerp.push(Quat::from_rotation_y(FRAC_PI_2), 0);
        // local 0.15, render 0.05: halfway
        let q = lerp.update(0.05);
        let expected = Quat::from_rotation_y(FRAC_PI_2 * 0.5);
        assert!(q.angle_between(expected) < 1e-3);
    }
}
