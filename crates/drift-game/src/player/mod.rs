//! Player controllers
//!
//! The local player is a force-driven dynamic capsule; remote players are
//! kinematic proxies fed from the network.

mod config;
mod effect;
mod local;
mod remote;
mod state;
mod sync;

pub use config::LocomotionConfig;
pub use effect::{EffectEnd, EffectState};
pub use local::{LocalPlayer, PlayerContext};
pub use remote::RemotePlayer;
pub use state::{LocomotionState, Mode, ModeInputs, PlatformTrack, PushForce};
pub use sync::{NetworkSync, Snapshot};
