//! Named attachment points players can be pinned to (seats, vehicles)

use std::collections::HashMap;

use glam::Mat4;

/// World matrices keyed by anchor id, refreshed by whatever owns them
#[derive(Debug, Clone, Default)]
pub struct Anchors {
    matrices: HashMap<String, Mat4>,
}

impl Anchors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: impl Into<String>, matrix: Mat4) {
        self.matrices.insert(id.into(), matrix);
    }

    pub fn get(&self, id: &str) -> Option<Mat4> {
        self.matrices.get(id).copied()
    }

    pub fn remove(&mut self, id: &str) -> Option<Mat4> {
        self.matrices.remove(id)
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }
}
