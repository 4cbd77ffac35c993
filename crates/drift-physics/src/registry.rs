//! The actor registry
//!
//! Owns the backend's stepping loop. Every simulated body the game cares
//! about is registered here and gets an [`ActorId`]; contact and trigger
//! changes reported by the backend are turned into pooled callbacks, and
//! interpolated actors get fresh step poses.

use std::collections::HashMap;
use std::hash::Hash;

use drift_core::{Pose, Vec3};
use tracing::{debug, trace};

use crate::backend::{
    BodyKind, ContactPair, MaterialDesc, PhysicsBackend, SimulationEventSink, TouchStatus,
    TriggerPair,
};
use crate::callbacks::{Dispatcher, Payload};
use crate::handle::{ActorDesc, ActorHandle};
use crate::interpolation::Interpolation;
use crate::layers::LayerMask;
use crate::material::MaterialCache;
use crate::slots::ActorSlots;
use crate::{ActorId, PhysicsError, PhysicsResult};

/// Closest hit of a registry query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryHit<B> {
    /// Registered actor owning the struck body, if any
    pub actor: Option<ActorId>,
    pub body: B,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

pub struct ActorRegistry<B: PhysicsBackend> {
    backend: B,
    actors: ActorSlots<ActorHandle<B::Body>>,
    bodies: HashMap<B::Body, ActorId>,
    dispatcher: Dispatcher,
    /// Interpolated actors that moved during the last step
    active: Vec<ActorId>,
    active_bodies: Vec<B::Body>,
    overlap_bodies: Vec<B::Body>,
    materials: MaterialCache<B::Material>,
    suppress_moves: bool,
}

impl<B: PhysicsBackend> ActorRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            actors: ActorSlots::new(),
            bodies: HashMap::new(),
            dispatcher: Dispatcher::default(),
            active: Vec::new(),
            active_bodies: Vec::new(),
            overlap_bodies: Vec::new(),
            materials: MaterialCache::new(),
            suppress_moves: false,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Register a body the backend already knows about.
    ///
    /// Actors with an interpolation listener get their interpolation seeded
    /// from the body's current pose.
    pub fn add_actor(&mut self, body: B::Body, desc: ActorDesc) -> PhysicsResult<ActorId> {
        if let Some(&existing) = self.bodies.get(&body) {
            return Err(PhysicsError::AlreadyRegistered(existing));
        }
        let kind = self.backend.body_kind(body).ok_or(PhysicsError::UnknownBody)?;
        let pose = self.backend.pose(body).ok_or(PhysicsError::UnknownBody)?;
        let interpolation = desc.on_interpolate.is_some().then(|| Interpolation::new(pose));
        let id = self
            .actors
            .insert(ActorHandle::new(body, kind, desc, interpolation));
        self.bodies.insert(body, id);
        debug!(actor = %id, ?kind, "added actor");
        Ok(id)
    }

    pub fn handle(&self, id: ActorId) -> Option<&ActorHandle<B::Body>> {
        self.actors.get(id)
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.contains(id)
    }

    pub fn actor_for_body(&self, body: B::Body) -> Option<ActorId> {
        self.bodies.get(&body).copied()
    }

    pub fn body(&self, id: ActorId) -> PhysicsResult<B::Body> {
        self.actors
            .get(id)
            .map(|handle| handle.body)
            .ok_or(PhysicsError::UnknownActor(id))
    }

    pub fn pose(&self, id: ActorId) -> PhysicsResult<Pose> {
        let body = self.body(id)?;
        self.backend.pose(body).ok_or(PhysicsError::UnknownBody)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Write a pose from the scene graph into the body.
    ///
    /// Ignored for dynamic bodies inside [`commit`](Self::commit), where the
    /// pose being written is the one the simulation just produced.
    pub fn move_actor(&mut self, id: ActorId, pose: Pose) -> PhysicsResult<()> {
        let handle = self.actors.get(id).ok_or(PhysicsError::UnknownActor(id))?;
        if self.suppress_moves && handle.kind == BodyKind::Dynamic {
            return Ok(());
        }
        let body = handle.body;
        self.backend.set_pose(body, pose)
    }

    /// Pose a kinematic body will reach by the end of the next step
    pub fn set_kinematic_target(&mut self, id: ActorId, pose: Pose) -> PhysicsResult<()> {
        let body = self.body(id)?;
        self.backend.set_kinematic_target(body, pose)
    }

    pub fn kind(&self, id: ActorId) -> Option<BodyKind> {
        self.actors.get(id).map(|handle| handle.kind)
    }

    pub fn linear_velocity(&self, id: ActorId) -> PhysicsResult<Vec3> {
        let body = self.body(id)?;
        self.backend
            .linear_velocity(body)
            .ok_or(PhysicsError::UnknownBody)
    }

    pub fn set_linear_velocity(&mut self, id: ActorId, velocity: Vec3) -> PhysicsResult<()> {
        let body = self.body(id)?;
        self.backend.set_linear_velocity(body, velocity)
    }

    pub fn set_angular_velocity(&mut self, id: ActorId, velocity: Vec3) -> PhysicsResult<()> {
        let body = self.body(id)?;
        self.backend.set_angular_velocity(body, velocity)
    }

    /// Force applied over the next step only
    pub fn add_force(&mut self, id: ActorId, force: Vec3) -> PhysicsResult<()> {
        let body = self.body(id)?;
        self.backend.add_force(body, force)
    }

    pub fn add_force_at_point(&mut self, id: ActorId, force: Vec3, point: Vec3) -> PhysicsResult<()> {
        let body = self.body(id)?;
        self.backend.add_force_at_point(body, force, point)
    }

    /// Take an actor out of the simulation, or put it back
    pub fn set_simulation_enabled(&mut self, id: ActorId, enabled: bool) -> PhysicsResult<()> {
        let body = self.body(id)?;
        debug!(actor = %id, enabled, "simulation toggled");
        self.backend.set_simulation_enabled(body, enabled)
    }

    /// Hard reset: teleport the body and collapse its interpolation onto `pose`
    pub fn snap(&mut self, id: ActorId, pose: Pose) -> PhysicsResult<()> {
        let handle = self
            .actors
            .get_mut(id)
            .ok_or(PhysicsError::UnknownActor(id))?;
        if let Some(lerp) = handle.interpolation.as_mut() {
            lerp.snap(pose);
        }
        let body = handle.body;
        self.backend.set_pose(body, pose)
    }

    /// Remove an actor and its body.
    ///
    /// Every actor still touching it gets a contact end, and every trigger it
    /// is still inside gets a leave, before this returns.
    pub fn destroy(&mut self, id: ActorId) -> PhysicsResult<()> {
        let handle = self.actors.remove(id).ok_or(PhysicsError::UnknownActor(id))?;
        self.bodies.remove(&handle.body);
        self.active.retain(|active| *active != id);

        let payload = Payload::of(&handle);
        for &other in &handle.contacted {
            let Some(peer) = self.actors.get_mut(other) else {
                continue;
            };
            peer.contacted.remove(&id);
            if peer.on_contact_end.is_some() {
                let mut cb = self.dispatcher.contact(false);
                cb.set_target(0, other, payload.clone());
                self.dispatcher.run_contact(cb, &mut self.actors);
            }
        }
        for &trigger in &handle.triggered {
            let listening = self
                .actors
                .get(trigger)
                .is_some_and(|t| t.on_trigger_leave.is_some());
            if listening {
                let mut cb = self.dispatcher.trigger(false);
                cb.set_target(trigger, payload.clone());
                self.dispatcher.run_trigger(cb, &mut self.actors);
            }
        }
        // it may itself have been a trigger others were inside
        for other in self.actors.values_mut() {
            other.triggered.remove(&id);
        }

        self.backend.remove_body(handle.body);
        debug!(actor = %id, "destroyed actor");
        Ok(())
    }

    /// Call before the first fixed step of a frame
    pub fn step_begin(&mut self) {
        self.active.clear();
    }

    /// Simulate one fixed step, dispatch touch changes, refresh interpolation
    pub fn step_end(&mut self, dt: f32) {
        let mut events = StepEvents {
            actors: &mut self.actors,
            bodies: &self.bodies,
            dispatcher: &mut self.dispatcher,
        };
        self.backend.simulate(dt, &mut events);
        let pending = self.dispatcher.pending();
        if pending > 0 {
            trace!(pending, "dispatching touch callbacks");
        }
        self.dispatcher.flush(&mut self.actors);

        self.active_bodies.clear();
        self.backend.active_bodies(&mut self.active_bodies);
        for body in &self.active_bodies {
            let Some(&id) = self.bodies.get(body) else {
                trace!(?body, "active body has no actor");
                continue;
            };
            let Some(handle) = self.actors.get_mut(id) else {
                debug!(actor = %id, "active actor missing from registry");
                continue;
            };
            let Some(lerp) = handle.interpolation.as_mut() else {
                continue;
            };
            let Some(pose) = self.backend.pose(*body) else {
                continue;
            };
            lerp.push(pose);
            if !self.active.contains(&id) {
                self.active.push(id);
            }
        }
    }

    /// Blend every active actor by `alpha` and hand the result to its listener
    pub fn interpolate(&mut self, alpha: f32) {
        for &id in &self.active {
            let Some(handle) = self.actors.get_mut(id) else {
                continue;
            };
            let (Some(lerp), Some(listener)) =
                (handle.interpolation.as_mut(), handle.on_interpolate.as_mut())
            else {
                continue;
            };
            if let Some(pose) = lerp.sample(alpha) {
                listener(pose.position, pose.rotation);
            }
        }
    }

    /// Run scene-graph commits that echo simulation output back as moves
    pub fn commit<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.suppress_moves = true;
        let result = f(self);
        self.suppress_moves = false;
        result
    }

    /// Interpolated actors refreshed by the last step
    pub fn active(&self) -> &[ActorId] {
        &self.active
    }

    /// Callbacks ever allocated, contacts and triggers
    pub fn callback_allocations(&self) -> (usize, usize) {
        self.dispatcher.created()
    }

    /// Shared material for these values
    pub fn material(&mut self, desc: &MaterialDesc) -> PhysicsResult<B::Material> {
        self.materials.get_or_create(&mut self.backend, desc)
    }

    pub fn set_material(&mut self, id: ActorId, desc: &MaterialDesc) -> PhysicsResult<()> {
        let body = self.body(id)?;
        let material = self.material(desc)?;
        self.backend.set_material(body, material)
    }

    pub fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> PhysicsResult<Option<QueryHit<B::Body>>> {
        let direction = check_ray(origin, direction, max_distance)?;
        Ok(self
            .backend
            .raycast(origin, direction, max_distance, mask)
            .map(|hit| QueryHit {
                actor: self.actor_for_body(hit.body),
                body: hit.body,
                point: hit.point,
                normal: hit.normal,
                distance: hit.distance,
            }))
    }

    pub fn sweep_sphere(
        &self,
        radius: f32,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> PhysicsResult<Option<QueryHit<B::Body>>> {
        check_radius(radius)?;
        let direction = check_ray(origin, direction, max_distance)?;
        Ok(self
            .backend
            .sweep_sphere(radius, origin, direction, max_distance, mask)
            .map(|hit| QueryHit {
                actor: self.actor_for_body(hit.body),
                body: hit.body,
                point: hit.point,
                normal: hit.normal,
                distance: hit.distance,
            }))
    }

    /// Registered actors overlapping the sphere, written into `out`
    pub fn overlap_sphere(
        &mut self,
        radius: f32,
        origin: Vec3,
        mask: LayerMask,
        out: &mut Vec<ActorId>,
    ) -> PhysicsResult<()> {
        check_radius(radius)?;
        if !origin.is_finite() {
            return Err(PhysicsError::InvalidQuery {
                what: "origin is not finite",
            });
        }
        out.clear();
        self.overlap_bodies.clear();
        self.backend
            .overlap_sphere(radius, origin, mask, &mut self.overlap_bodies);
        for body in &self.overlap_bodies {
            if let Some(&id) = self.bodies.get(body) {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
        }
        Ok(())
    }
}

fn check_ray(origin: Vec3, direction: Vec3, max_distance: f32) -> PhysicsResult<Vec3> {
    if !origin.is_finite() {
        return Err(PhysicsError::InvalidQuery {
            what: "origin is not finite",
        });
    }
    if !direction.is_finite() || direction.length_squared() < 1e-12 {
        return Err(PhysicsError::InvalidQuery {
            what: "direction must be finite and non-zero",
        });
    }
    if max_distance.is_nan() || max_distance < 0.0 {
        return Err(PhysicsError::InvalidQuery {
            what: "max distance must be non-negative",
        });
    }
    Ok(direction.normalize())
}

fn check_radius(radius: f32) -> PhysicsResult<()> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidQuery {
            what: "radius must be positive",
        })
    }
}

/// Turns backend touch reports into queued callbacks
struct StepEvents<'a, B> {
    actors: &'a mut ActorSlots<ActorHandle<B>>,
    bodies: &'a HashMap<B, ActorId>,
    dispatcher: &'a mut Dispatcher,
}

impl<B: Copy + Eq + Hash> SimulationEventSink<B> for StepEvents<'_, B> {
    fn on_contact(&mut self, pair: ContactPair<'_, B>) {
        if pair.removed {
            return;
        }
        let (Some(&a0), Some(&a1)) = (self.bodies.get(&pair.body0), self.bodies.get(&pair.body1))
        else {
            return;
        };
        if a0 == a1 {
            return;
        }
        let start = pair.status == TouchStatus::Found;
        let mut cb = self.dispatcher.contact(start);
        if start {
            cb.add_contacts(pair.points);
        }
        for (side, (me, other)) in [(a0, a1), (a1, a0)].into_iter().enumerate() {
            let Some(other_payload) = self.actors.get(other).map(Payload::of) else {
                continue;
            };
            let Some(handle) = self.actors.get_mut(me) else {
                continue;
            };
            let changed = if start {
                handle.contacted.insert(other)
            } else {
                handle.contacted.remove(&other)
            };
            if !changed {
                continue;
            }
            let listening = if start {
                handle.on_contact_start.is_some()
            } else {
                handle.on_contact_end.is_some()
            };
            if listening {
                cb.set_target(side, me, other_payload);
            }
        }
        self.dispatcher.queue_contact(cb);
    }

    fn on_trigger(&mut self, pair: TriggerPair<B>) {
        if pair.removed {
            return;
        }
        let (Some(&trigger), Some(&other)) =
            (self.bodies.get(&pair.trigger), self.bodies.get(&pair.other))
        else {
            return;
        };
        let enter = pair.status == TouchStatus::Found;
        let Some(payload) = self.actors.get(other).map(Payload::of) else {
            return;
        };
        let Some(other_handle) = self.actors.get_mut(other) else {
            return;
        };
        let changed = if enter {
            other_handle.triggered.insert(trigger)
        } else {
            other_handle.triggered.remove(&trigger)
        };
        if !changed {
            return;
        }
        let listening = self.actors.get(trigger).is_some_and(|t| {
            if enter {
                t.on_trigger_enter.is_some()
            } else {
                t.on_trigger_leave.is_some()
            }
        });
        if listening {
            let mut cb = self.dispatcher.trigger(enter);
            cb.set_target(trigger, payload);
            self.dispatcher.queue_trigger(cb);
        }
    }
}
