//! Drift Net - Entity state replication
//!
//! Wire messages exchanged with the relay server and the delayed-render
//! buffers remote entities use to smooth irregular snapshot arrival.
//! Transport framing lives outside this crate; producers hand packets to an
//! [`Outbox`].

pub mod buffered;
mod error;
pub mod wire;

pub use buffered::{BufferedLerp, BufferedLerpQuat, BufferedLerpVec3, Interpolate};
pub use error::{WireError, WireResult};
pub use wire::{Effect, EntityModified, Outbox, Packet};

use serde::{Deserialize, Serialize};

/// Replication timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Minimum seconds between state diffs from one local entity
    pub network_rate: f32,
    /// Remote render delay as a multiple of `network_rate`
    pub buffer_scale: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network_rate: 1.0 / 8.0,
            buffer_scale: 1.5,
        }
    }
}

impl NetworkConfig {
    /// Render delay for remote interpolation buffers
    pub fn buffer_seconds(&self) -> f32 {
        self.network_rate * self.buffer_scale
    }
}
