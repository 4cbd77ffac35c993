//! Drift Core - Core types and utilities for Drift
//!
//! This crate provides the foundational types used throughout the workspace:
//! - Mathematical primitives (re-exported from glam)
//! - `Pose` and `Transform` value types
//! - Transform nodes with parent-relative poses
//! - Fixed-timestep game time

pub mod node;
pub mod time;
pub mod types;

pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
pub use node::{Node, NodeRef};
pub use time::{GameTime, TimeConfig};
pub use types::{EntityId, Pose, Transform};
