//! Drift Physics - Actor registry over rapier3d
//!
//! Provides the actor registry that owns physics stepping, pooled contact and
//! trigger dispatch, fixed-step interpolation, collision layers, and the
//! backends it drives (rapier3d, plus an in-memory mock for tests).

pub mod backend;
mod callbacks;
mod error;
mod handle;
pub mod interpolation;
pub mod layers;
pub mod material;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod pool;
pub mod rapier;
mod registry;
mod slots;

pub use backend::{
    BodyDesc, BodyKind, CombineMode, ContactPoint, Geometry, MaterialDesc, PhysicsBackend,
    ShapeDesc, TouchStatus,
};
pub use callbacks::{ContactCallback, Payload, TriggerCallback};
pub use error::{PhysicsError, PhysicsResult};
pub use handle::{
    ActorDesc, ActorHandle, ContactEvent, ContactListener, InterpolateListener, TriggerEvent,
    TriggerListener,
};
pub use interpolation::Interpolation;
pub use layers::{Layer, LayerMask};
pub use material::MaterialCache;
pub use pool::{Pool, Poolable};
pub use rapier::RapierBackend;
pub use registry::{ActorRegistry, QueryHit};
pub use slots::ActorId;

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Physics world configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity vector (default: -9.81 on Y axis)
    pub gravity: Vec3,
    /// Physics timestep (default: 1/50)
    pub timestep: f32,
    /// Whether player capsules collide with each other
    pub player_collision: bool,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            timestep: 1.0 / 50.0,
            player_collision: false,
        }
    }
}
