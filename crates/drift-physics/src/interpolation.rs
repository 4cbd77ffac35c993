//! Fixed-step interpolation
//!
//! Physics produces a pose per fixed step. Render frames land between steps,
//! so each interpolated actor keeps the last two step poses and blends them
//! by the accumulator alpha.

use drift_core::Pose;

/// Double-buffered step poses plus the last blended result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    pub prev: Pose,
    pub next: Pose,
    pub curr: Pose,
    skip: bool,
}

impl Interpolation {
    /// Seed every slot from the body's current pose
    pub fn new(pose: Pose) -> Self {
        Self {
            prev: pose,
            next: pose,
            curr: pose,
            skip: false,
        }
    }

    /// Record the pose produced by a fresh step
    pub fn push(&mut self, pose: Pose) {
        self.prev = self.next;
        self.next = pose;
    }

    /// Hard reset. The next [`sample`](Self::sample) is skipped so the
    /// owner keeps the pose it just wrote.
    pub fn snap(&mut self, pose: Pose) {
        self.prev = pose;
        self.next = pose;
        self.curr = pose;
        self.skip = true;
    }

    /// Blend `prev` toward `next`. Returns `None` for the one sample
    /// following a snap.
    pub fn sample(&mut self, alpha: f32) -> Option<Pose> {
        if self.skip {
            self.skip = false;
            return None;
        }
        self.curr = Pose::interpolate(&self.prev, &self.next, alpha.clamp(0.0, 1.0));
        Some(self.curr)
    }
}
