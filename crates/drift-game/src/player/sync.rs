//! Throttled state diffs for the local player

use drift_core::EntityId;
use drift_net::EntityModified;
use glam::{Quat, Vec3};

use super::Mode;

/// The replicated slice of a player's state
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub position: Vec3,
    pub rotation: Quat,
    pub mode: Mode,
    pub axis: Vec3,
    pub gaze: Vec3,
    pub emote: Option<String>,
}

/// Sends at most one diff per `rate` seconds, carrying only changed fields
#[derive(Debug, Clone)]
pub struct NetworkSync {
    rate: f32,
    since_send: f32,
    last: Option<Snapshot>,
}

impl NetworkSync {
    pub fn new(rate: f32) -> Self {
        Self {
            rate,
            since_send: 0.0,
            last: None,
        }
    }

    /// Advance the throttle. Once a send is due, returns the diff against
    /// the last sent state, or `None` when nothing changed.
    pub fn tick(&mut self, id: EntityId, dt: f32, current: &Snapshot) -> Option<EntityModified> {
        self.since_send += dt;
        if self.since_send < self.rate {
            return None;
        }
        self.since_send = 0.0;

        // the first baseline has no emote so an initial one is announced
        let last = self.last.get_or_insert_with(|| Snapshot {
            emote: None,
            ..current.clone()
        });

        let mut diff = EntityModified::new(id);
        if last.position != current.position {
            diff.p = Some(current.position);
            last.position = current.position;
        }
        if last.rotation != current.rotation {
            diff.q = Some(current.rotation);
            last.rotation = current.rotation;
        }
        if last.mode != current.mode {
            diff.m = Some(current.mode.as_u8());
            last.mode = current.mode;
        }
        if last.axis != current.axis {
            diff.a = Some(current.axis);
            last.axis = current.axis;
        }
        if last.gaze != current.gaze {
            diff.g = Some(current.gaze);
            last.gaze = current.gaze;
        }
        if last.emote != current.emote {
            diff.e = Some(current.emote.clone());
            last.emote = current.emote.clone();
        }
        (!diff.is_empty()).then_some(diff)
    }
}
