use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use drift_core::{EntityId, Quat, Vec3};

use crate::backend::{BodyKind, ContactPoint};
use crate::interpolation::Interpolation;
use crate::ActorId;

/// Payload delivered to contact listeners
#[derive(Debug, Clone, Copy)]
pub struct ContactEvent<'a> {
    /// Tag of the other actor
    pub tag: Option<&'a str>,
    /// Player owning the other actor
    pub player_id: Option<EntityId>,
    /// Contact points; empty for end events
    pub contacts: &'a [ContactPoint],
}

/// Payload delivered to trigger listeners
#[derive(Debug, Clone, Copy)]
pub struct TriggerEvent<'a> {
    /// Tag of the actor entering or leaving
    pub tag: Option<&'a str>,
    pub player_id: Option<EntityId>,
}

pub type ContactListener = Box<dyn FnMut(&ContactEvent<'_>) -> anyhow::Result<()>>;
pub type TriggerListener = Box<dyn FnMut(&TriggerEvent<'_>) -> anyhow::Result<()>>;
pub type InterpolateListener = Box<dyn FnMut(Vec3, Quat)>;

/// What to register alongside a body
#[derive(Default)]
pub struct ActorDesc {
    pub tag: Option<Arc<str>>,
    pub player_id: Option<EntityId>,
    pub on_contact_start: Option<ContactListener>,
    pub on_contact_end: Option<ContactListener>,
    pub on_trigger_enter: Option<TriggerListener>,
    pub on_trigger_leave: Option<TriggerListener>,
    /// Present only for actors whose pose should be interpolated
    pub on_interpolate: Option<InterpolateListener>,
}

impl ActorDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, tag: impl Into<Arc<str>>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn player(mut self, player_id: EntityId) -> Self {
        self.player_id = Some(player_id);
        self
    }

    pub fn on_contact_start(
        mut self,
        f: impl FnMut(&ContactEvent<'_>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.on_contact_start = Some(Box::new(f));
        self
    }

    pub fn on_contact_end(
        mut self,
        f: impl FnMut(&ContactEvent<'_>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.on_contact_end = Some(Box::new(f));
        self
    }

    pub fn on_trigger_enter(
        mut self,
        f: impl FnMut(&TriggerEvent<'_>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.on_trigger_enter = Some(Box::new(f));
        self
    }

    pub fn on_trigger_leave(
        mut self,
        f: impl FnMut(&TriggerEvent<'_>) -> anyhow::Result<()> + 'static,
    ) -> Self {
        self.on_trigger_leave = Some(Box::new(f));
        self
    }

    pub fn on_interpolate(mut self, f: impl FnMut(Vec3, Quat) + 'static) -> Self {
        self.on_interpolate = Some(Box::new(f));
        self
    }
}

/// Listener slot on a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContactSlot {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TriggerSlot {
    Enter,
    Leave,
}

/// Registry-side wrapper around a native body
pub struct ActorHandle<B> {
    pub(crate) body: B,
    pub(crate) kind: BodyKind,
    pub(crate) tag: Option<Arc<str>>,
    pub(crate) player_id: Option<EntityId>,
    /// Actors currently touching this one
    pub(crate) contacted: HashSet<ActorId>,
    /// Triggers this actor is currently inside
    pub(crate) triggered: HashSet<ActorId>,
    pub(crate) interpolation: Option<Interpolation>,
    pub(crate) on_contact_start: Option<ContactListener>,
    pub(crate) on_contact_end: Option<ContactListener>,
    pub(crate) on_trigger_enter: Option<TriggerListener>,
    pub(crate) on_trigger_leave: Option<TriggerListener>,
    pub(crate) on_interpolate: Option<InterpolateListener>,
}

impl<B: Copy> ActorHandle<B> {
    pub(crate) fn new(
        body: B,
        kind: BodyKind,
        desc: ActorDesc,
        interpolation: Option<Interpolation>,
    ) -> Self {
        Self {
            body,
            kind,
            tag: desc.tag,
            player_id: desc.player_id,
            contacted: HashSet::new(),
            triggered: HashSet::new(),
            interpolation,
            on_contact_start: desc.on_contact_start,
            on_contact_end: desc.on_contact_end,
            on_trigger_enter: desc.on_trigger_enter,
            on_trigger_leave: desc.on_trigger_leave,
            on_interpolate: desc.on_interpolate,
        }
    }

    pub fn body(&self) -> B {
        self.body
    }

    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn player_id(&self) -> Option<EntityId> {
        self.player_id
    }

    pub fn contacted(&self) -> &HashSet<ActorId> {
        &self.contacted
    }

    pub fn triggered(&self) -> &HashSet<ActorId> {
        &self.triggered
    }

    pub fn interpolation(&self) -> Option<&Interpolation> {
        self.interpolation.as_ref()
    }

    pub(crate) fn contact_listener(&mut self, slot: ContactSlot) -> &mut Option<ContactListener> {
        match slot {
            ContactSlot::Start => &mut self.on_contact_start,
            ContactSlot::End => &mut self.on_contact_end,
        }
    }

    pub(crate) fn trigger_listener(&mut self, slot: TriggerSlot) -> &mut Option<TriggerListener> {
        match slot {
            TriggerSlot::Enter => &mut self.on_trigger_enter,
            TriggerSlot::Leave => &mut self.on_trigger_leave,
        }
    }
}

impl<B: fmt::Debug> fmt::Debug for ActorHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle")
            .field("body", &self.body)
            .field("kind", &self.kind)
            .field("tag", &self.tag)
            .field("player_id", &self.player_id)
            .field("contacted", &self.contacted.len())
            .field("triggered", &self.triggered.len())
            .field("interpolated", &self.interpolation.is_some())
            .finish()
    }
}
