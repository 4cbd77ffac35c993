//! Deterministic in-memory backend
//!
//! Bodies integrate with semi-implicit Euler. Shapes are treated as
//! axis-aligned boxes for queries and for a simple floor resolution, which is
//! enough to stand a capsule on a platform. Contacts and triggers are never
//! detected; tests queue them explicitly and they are reported on the next
//! step.

use std::collections::BTreeMap;

use drift_core::{Pose, Vec3};

use crate::backend::{
    BodyDesc, BodyKind, ContactPair, ContactPoint, Geometry, MaterialDesc, PhysicsBackend,
    RaycastHit, ShapeDesc, SimulationEventSink, SweepHit, TouchStatus, TriggerPair,
};
use crate::layers::LayerMask;
use crate::{PhysicsError, PhysicsResult};

/// Body reference handed out by [`MockBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MockBody(pub u32);

/// Material reference handed out by [`MockBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockMaterial(pub u32);

#[derive(Debug, Clone)]
pub struct MockBodyState {
    pub kind: BodyKind,
    pub pose: Pose,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub mass: f32,
    pub gravity: bool,
    pub enabled: bool,
    pub shapes: Vec<ShapeDesc>,
    pub material: Option<MockMaterial>,
    /// Forces accumulated for the next step
    pub force: Vec3,
    /// Every `add_force_at_point` call since the last step
    pub point_forces: Vec<(Vec3, Vec3)>,
    /// Reported instead of the face normal when a query hits this body
    pub surface_normal: Option<Vec3>,
    kinematic_target: Option<Pose>,
}

struct QueuedContact {
    body0: MockBody,
    body1: MockBody,
    status: TouchStatus,
    removed: bool,
    points: Vec<ContactPoint>,
}

/// In-memory backend for registry and controller tests
pub struct MockBackend {
    gravity: Vec3,
    bodies: BTreeMap<MockBody, MockBodyState>,
    next_body: u32,
    materials: Vec<MaterialDesc>,
    contacts: Vec<QueuedContact>,
    triggers: Vec<TriggerPair<MockBody>>,
    active: Vec<MockBody>,
    steps: u32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_gravity(Vec3::new(0.0, -9.81, 0.0))
    }

    pub fn with_gravity(gravity: Vec3) -> Self {
        Self {
            gravity,
            bodies: BTreeMap::new(),
            next_body: 0,
            materials: Vec::new(),
            contacts: Vec::new(),
            triggers: Vec::new(),
            active: Vec::new(),
            steps: 0,
        }
    }

    pub fn state(&self, body: MockBody) -> Option<&MockBodyState> {
        self.bodies.get(&body)
    }

    pub fn material(&self, material: MockMaterial) -> Option<&MaterialDesc> {
        self.materials.get(material.0 as usize)
    }

    /// Number of completed steps
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Report queries against `body` with this normal, e.g. to fake a slope
    pub fn set_surface_normal(&mut self, body: MockBody, normal: Vec3) {
        if let Some(state) = self.bodies.get_mut(&body) {
            state.surface_normal = Some(normal.normalize());
        }
    }

    pub fn queue_contact(
        &mut self,
        body0: MockBody,
        body1: MockBody,
        status: TouchStatus,
        points: &[ContactPoint],
    ) {
        self.contacts.push(QueuedContact {
            body0,
            body1,
            status,
            removed: false,
            points: points.to_vec(),
        });
    }

    pub fn queue_removed_contact(&mut self, body0: MockBody, body1: MockBody) {
        self.contacts.push(QueuedContact {
            body0,
            body1,
            status: TouchStatus::Lost,
            removed: true,
            points: Vec::new(),
        });
    }

    pub fn queue_trigger(&mut self, trigger: MockBody, other: MockBody, status: TouchStatus) {
        self.triggers.push(TriggerPair {
            trigger,
            other,
            status,
            removed: false,
        });
    }

    pub fn queue_removed_trigger(&mut self, trigger: MockBody, other: MockBody) {
        self.triggers.push(TriggerPair {
            trigger,
            other,
            status: TouchStatus::Lost,
            removed: true,
        });
    }

    fn get_mut(&mut self, body: MockBody) -> PhysicsResult<&mut MockBodyState> {
        self.bodies.get_mut(&body).ok_or(PhysicsError::UnknownBody)
    }

    /// World-space boxes of every enabled, non-trigger shape matching `mask`
    fn boxes(&self, mask: LayerMask) -> impl Iterator<Item = (MockBody, &MockBodyState, Aabb)> + '_ {
        self.bodies
            .iter()
            .filter(|(_, state)| state.enabled)
            .flat_map(move |(body, state)| {
                state
                    .shapes
                    .iter()
                    .filter(move |shape| !shape.trigger && mask.contains(shape.layer.group()))
                    .map(move |shape| (*body, state, Aabb::of(&state.pose, shape)))
            })
    }

    fn resolve_floor(&mut self, body: MockBody, previous_bottom: f32) {
        let Some(state) = self.bodies.get(&body) else {
            return;
        };
        let Some(bottom) = bottom_offset(state) else {
            return;
        };
        let feet = state.pose.position;
        let mask = state
            .shapes
            .first()
            .map(|shape| shape.mask)
            .unwrap_or(LayerMask::NONE);
        let mut floor: Option<f32> = None;
        for (other, _, aabb) in self.boxes(mask) {
            if other == body {
                continue;
            }
            let inside_xz = feet.x >= aabb.min.x
                && feet.x <= aabb.max.x
                && feet.z >= aabb.min.z
                && feet.z <= aabb.max.z;
            let top = aabb.max.y;
            if inside_xz && feet.y + bottom < top && previous_bottom >= top - 0.25 {
                floor = Some(floor.map_or(top, |f: f32| f.max(top)));
            }
        }
        if let (Some(top), Some(state)) = (floor, self.bodies.get_mut(&body)) {
            state.pose.position.y = top - bottom;
            state.linear_velocity.y = state.linear_velocity.y.max(0.0);
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Offset from the body origin to the lowest point of its shapes
fn bottom_offset(state: &MockBodyState) -> Option<f32> {
    state
        .shapes
        .iter()
        .filter(|shape| !shape.trigger)
        .map(|shape| shape.offset.position.y - half_extents(&shape.geometry).y)
        .reduce(f32::min)
}

fn half_extents(geometry: &Geometry) -> Vec3 {
    match *geometry {
        Geometry::Sphere { radius } => Vec3::splat(radius),
        Geometry::Box { half_extents } => half_extents,
        Geometry::Capsule { radius, half_height } => Vec3::new(radius, half_height + radius, radius),
    }
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    fn of(pose: &Pose, shape: &ShapeDesc) -> Self {
        let center = pose.position + pose.rotation * shape.offset.position;
        let half = half_extents(&shape.geometry);
        Self {
            min: center - half,
            max: center + half,
        }
    }

    fn expanded(self, by: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(by),
            max: self.max + Vec3::splat(by),
        }
    }

    /// Slab test; returns entry distance and face normal
    fn ray(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<(f32, Vec3)> {
        let mut t_min = 0.0f32;
        let mut t_max = max_distance;
        let mut normal = Vec3::ZERO;
        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if d.abs() < 1e-8 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let mut t0 = (lo - o) / d;
            let mut t1 = (hi - o) / d;
            let mut face = Vec3::ZERO;
            face[axis] = -d.signum();
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            if t0 > t_min {
                t_min = t0;
                normal = face;
            }
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        // origin inside the box
        if normal == Vec3::ZERO {
            return Some((0.0, -direction));
        }
        Some((t_min, normal))
    }

    fn distance_to(&self, point: Vec3) -> f32 {
        (point.clamp(self.min, self.max) - point).length()
    }
}

impl PhysicsBackend for MockBackend {
    type Body = MockBody;
    type Material = MockMaterial;

    fn create_body(&mut self, desc: &BodyDesc) -> MockBody {
        let body = MockBody(self.next_body);
        self.next_body += 1;
        self.bodies.insert(
            body,
            MockBodyState {
                kind: desc.kind,
                pose: desc.pose,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                mass: desc.mass.unwrap_or(1.0),
                gravity: desc.gravity,
                enabled: true,
                shapes: Vec::new(),
                material: None,
                force: Vec3::ZERO,
                point_forces: Vec::new(),
                surface_normal: None,
                kinematic_target: None,
            },
        );
        body
    }

    fn attach_shape(&mut self, body: MockBody, shape: &ShapeDesc) -> PhysicsResult<()> {
        self.get_mut(body)?.shapes.push(shape.clone());
        Ok(())
    }

    fn remove_body(&mut self, body: MockBody) {
        self.bodies.remove(&body);
        self.active.retain(|active| *active != body);
    }

    fn body_kind(&self, body: MockBody) -> Option<BodyKind> {
        self.bodies.get(&body).map(|state| state.kind)
    }

    fn create_material(&mut self, desc: &MaterialDesc) -> MockMaterial {
        self.materials.push(*desc);
        MockMaterial(self.materials.len() as u32 - 1)
    }

    fn set_material(&mut self, body: MockBody, material: MockMaterial) -> PhysicsResult<()> {
        self.get_mut(body)?.material = Some(material);
        Ok(())
    }

    fn pose(&self, body: MockBody) -> Option<Pose> {
        self.bodies.get(&body).map(|state| state.pose)
    }

    fn set_pose(&mut self, body: MockBody, pose: Pose) -> PhysicsResult<()> {
        let state = self.get_mut(body)?;
        state.pose = pose;
        state.kinematic_target = None;
        Ok(())
    }

    fn set_kinematic_target(&mut self, body: MockBody, pose: Pose) -> PhysicsResult<()> {
        self.get_mut(body)?.kinematic_target = Some(pose);
        Ok(())
    }

    fn linear_velocity(&self, body: MockBody) -> Option<Vec3> {
        self.bodies.get(&body).map(|state| state.linear_velocity)
    }

    fn set_linear_velocity(&mut self, body: MockBody, velocity: Vec3) -> PhysicsResult<()> {
        self.get_mut(body)?.linear_velocity = velocity;
        Ok(())
    }

    fn set_angular_velocity(&mut self, body: MockBody, velocity: Vec3) -> PhysicsResult<()> {
        self.get_mut(body)?.angular_velocity = velocity;
        Ok(())
    }

    fn add_force(&mut self, body: MockBody, force: Vec3) -> PhysicsResult<()> {
        self.get_mut(body)?.force += force;
        Ok(())
    }

    fn add_force_at_point(&mut self, body: MockBody, force: Vec3, point: Vec3) -> PhysicsResult<()> {
        let state = self.get_mut(body)?;
        state.force += force;
        state.point_forces.push((force, point));
        Ok(())
    }

    fn set_simulation_enabled(&mut self, body: MockBody, enabled: bool) -> PhysicsResult<()> {
        self.get_mut(body)?.enabled = enabled;
        Ok(())
    }

    fn simulate(&mut self, dt: f32, sink: &mut dyn SimulationEventSink<MockBody>) {
        self.active.clear();
        let gravity = self.gravity;
        let mut moved = Vec::new();
        for (body, state) in self.bodies.iter_mut() {
            if !state.enabled {
                continue;
            }
            match state.kind {
                BodyKind::Static => {}
                BodyKind::Kinematic => {
                    if let Some(target) = state.kinematic_target.take() {
                        if dt > 0.0 {
                            state.linear_velocity = (target.position - state.pose.position) / dt;
                        }
                        state.pose = target;
                        self.active.push(*body);
                    } else {
                        state.linear_velocity = Vec3::ZERO;
                    }
                }
                BodyKind::Dynamic => {
                    let mut acceleration = state.force / state.mass.max(1e-6);
                    if state.gravity {
                        acceleration += gravity;
                    }
                    let before = state.pose.position;
                    state.linear_velocity += acceleration * dt;
                    state.pose.position += state.linear_velocity * dt;
                    let bottom = bottom_offset(state).unwrap_or(0.0);
                    moved.push((*body, before.y + bottom));
                }
            }
            state.force = Vec3::ZERO;
            state.point_forces.clear();
        }
        for (body, previous_bottom) in moved {
            let before = self.bodies.get(&body).map(|s| s.pose.position);
            self.resolve_floor(body, previous_bottom);
            let Some(state) = self.bodies.get(&body) else {
                continue;
            };
            if state.linear_velocity != Vec3::ZERO || before != Some(state.pose.position) {
                self.active.push(body);
            }
        }

        for contact in self.contacts.drain(..) {
            sink.on_contact(ContactPair {
                body0: contact.body0,
                body1: contact.body1,
                status: contact.status,
                removed: contact.removed,
                points: &contact.points,
            });
        }
        for trigger in self.triggers.drain(..) {
            sink.on_trigger(trigger);
        }
        self.steps += 1;
    }

    fn active_bodies(&self, out: &mut Vec<MockBody>) {
        out.extend_from_slice(&self.active);
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RaycastHit<MockBody>> {
        self.boxes(mask)
            .filter_map(|(body, state, aabb)| {
                let (distance, normal) = aabb.ray(origin, direction, max_distance)?;
                Some(RaycastHit {
                    body,
                    point: origin + direction * distance,
                    normal: state.surface_normal.unwrap_or(normal),
                    distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn sweep_sphere(
        &self,
        radius: f32,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<SweepHit<MockBody>> {
        self.boxes(mask)
            .filter_map(|(body, state, aabb)| {
                let (distance, normal) = aabb.expanded(radius).ray(origin, direction, max_distance)?;
                let normal = state.surface_normal.unwrap_or(normal);
                Some(SweepHit {
                    body,
                    point: origin + direction * distance - normal * radius,
                    normal,
                    distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    fn overlap_sphere(&self, radius: f32, origin: Vec3, mask: LayerMask, out: &mut Vec<MockBody>) {
        for (body, _, aabb) in self.boxes(mask) {
            if aabb.distance_to(origin) <= radius && !out.contains(&body) {
                out.push(body);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Layer;

    struct NullSink;

    impl SimulationEventSink<MockBody> for NullSink {
        fn on_contact(&mut self, _: ContactPair<'_, MockBody>) {}
        fn on_trigger(&mut self, _: TriggerPair<MockBody>) {}
    }

    fn floor(backend: &mut MockBackend) -> MockBody {
        let floor = backend.create_body(&BodyDesc::fixed(Pose::from_position(Vec3::new(0.0, -0.5, 0.0))));
        backend
            .attach_shape(
                floor,
                &ShapeDesc::new(
                    Geometry::Box { half_extents: Vec3::new(10.0, 0.5, 10.0) },
                    Layer::Environment,
                ),
            )
            .unwrap();
        floor
    }

    #[test]
    fn dynamic_body_lands_on_floor() {
        let mut backend = MockBackend::new();
        floor(&mut backend);
        let ball = backend.create_body(&BodyDesc::dynamic(Pose::from_position(Vec3::new(0.0, 1.0, 0.0))));
        backend
            .attach_shape(ball, &ShapeDesc::new(Geometry::Sphere { radius: 0.5 }, Layer::Prop))
            .unwrap();
        for _ in 0..200 {
            backend.simulate(0.02, &mut NullSink);
        }
        let pose = backend.pose(ball).unwrap();
        assert!((pose.position.y - 0.5).abs() < 1e-4);
        assert_eq!(backend.linear_velocity(ball).unwrap().y, 0.0);
    }

    #[test]
    fn sweep_reports_face_or_override_normal() {
        let mut backend = MockBackend::new();
        let floor = floor(&mut backend);
        let hit = backend
            .sweep_sphere(0.29, Vec3::new(0.0, 0.41, 0.0), Vec3::NEG_Y, 0.22, LayerMask::GROUND)
            .unwrap();
        assert!((hit.distance - 0.12).abs() < 1e-5);
        assert_eq!(hit.normal, Vec3::Y);

        let slope = Vec3::new(1.0, 0.3, 0.0).normalize();
        backend.set_surface_normal(floor, slope);
        let hit = backend
            .sweep_sphere(0.29, Vec3::new(0.0, 0.41, 0.0), Vec3::NEG_Y, 0.22, LayerMask::GROUND)
            .unwrap();
        assert!((hit.normal - slope).length() < 1e-5);
    }

    #[test]
    fn kinematic_target_is_reached_in_one_step() {
        let mut backend = MockBackend::new();
        let platform = backend.create_body(&BodyDesc::kinematic(Pose::IDENTITY));
        backend
            .set_kinematic_target(platform, Pose::from_position(Vec3::X))
            .unwrap();
        backend.simulate(0.5, &mut NullSink);
        assert_eq!(backend.pose(platform).unwrap().position, Vec3::X);
        assert_eq!(backend.linear_velocity(platform).unwrap(), Vec3::new(2.0, 0.0, 0.0));
        let mut active = Vec::new();
        backend.active_bodies(&mut active);
        assert_eq!(active, vec![platform]);
    }

    #[test]
    fn disabled_bodies_do_not_move() {
        let mut backend = MockBackend::new();
        let body = backend.create_body(&BodyDesc::dynamic(Pose::IDENTITY));
        backend.set_simulation_enabled(body, false).unwrap();
        backend.simulate(0.02, &mut NullSink);
        assert_eq!(backend.pose(body).unwrap().position, Vec3::ZERO);
    }
}
