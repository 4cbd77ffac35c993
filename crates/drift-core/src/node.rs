//! Minimal transform nodes
//!
//! The scene graph proper lives outside Drift. These nodes are the seam it
//! exposes: a local transform plus an optional parent, enough to turn a
//! world-space physics pose into the parent-relative transform an entity owns.

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat4, Quat, Vec3};

use crate::{Pose, Transform};

/// Shared, single-threaded reference to a node
pub type NodeRef = Rc<RefCell<Node>>;

/// A transform node with an optional parent
#[derive(Debug, Default)]
pub struct Node {
    /// Transform relative to the parent (or world when unparented)
    pub transform: Transform,
    /// Parent node, if any
    pub parent: Option<NodeRef>,
}

impl Node {
    /// Create a root node at a world pose
    pub fn new(pose: Pose) -> Self {
        Self {
            transform: Transform::from_position_rotation(pose.position, pose.rotation),
            parent: None,
        }
    }

    /// Create a node parented under `parent` with a local transform
    pub fn with_parent(parent: NodeRef, transform: Transform) -> Self {
        Self {
            transform,
            parent: Some(parent),
        }
    }

    /// Wrap in a shared reference
    pub fn into_ref(self) -> NodeRef {
        Rc::new(RefCell::new(self))
    }

    /// World matrix, walking up the parent chain
    pub fn world_matrix(&self) -> Mat4 {
        match &self.parent {
            Some(parent) => parent.borrow().world_matrix() * self.transform.matrix(),
            None => self.transform.matrix(),
        }
    }

    /// World-space rigid pose
    pub fn world_pose(&self) -> Pose {
        Pose::from_matrix(&self.world_matrix())
    }

    /// Write a world-space pose, converting into parent-local space when parented
    pub fn set_world_pose(&mut self, position: Vec3, rotation: Quat) {
        match &self.parent {
            Some(parent) => {
                let world = Mat4::from_rotation_translation(rotation, position);
                let local = parent.borrow().world_matrix().inverse() * world;
                let (_, local_rotation, local_position) = local.to_scale_rotation_translation();
                self.transform.position = local_position;
                self.transform.rotation = local_rotation.normalize();
            }
            None => {
                self.transform.position = position;
                self.transform.rotation = rotation;
            }
        }
    }
}
