//! rapier3d backend

use std::collections::HashMap;

use drift_core::{Pose, Quat, Vec3};
use nalgebra::{Isometry3, Quaternion, Translation3, Unit, UnitQuaternion};
use parking_lot::Mutex;
use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::parry::shape::Ball;
use rapier3d::prelude::*;

use crate::backend::{
    self, BodyDesc, BodyKind, CombineMode, ContactPoint, Geometry, MaterialDesc, PhysicsBackend,
    RaycastHit, ShapeDesc, SimulationEventSink, SweepHit, TouchStatus, TriggerPair,
};
use crate::layers::{Layer, LayerMask};
use crate::{PhysicsConfig, PhysicsError, PhysicsResult};

/// Collects collision events while the pipeline steps
#[derive(Default)]
struct EventCollector {
    collisions: Mutex<Vec<CollisionEvent>>,
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        self.collisions.lock().push(event);
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// Physics backend over a rapier3d world
pub struct RapierBackend {
    /// Configuration
    pub config: PhysicsConfig,

    /// Rigid body storage
    pub rigid_body_set: RigidBodySet,
    /// Collider storage
    pub collider_set: ColliderSet,
    /// Impulse joint storage
    pub impulse_joint_set: ImpulseJointSet,
    /// Multi-body joint storage
    pub multibody_joint_set: MultibodyJointSet,

    /// Integration parameters
    integration_parameters: IntegrationParameters,
    /// Physics pipeline
    physics_pipeline: PhysicsPipeline,
    /// Island manager
    island_manager: IslandManager,
    /// Broad phase collision detection
    broad_phase: DefaultBroadPhase,
    /// Narrow phase collision detection
    narrow_phase: NarrowPhase,
    /// Continuous collision detection solver
    ccd_solver: CCDSolver,
    /// Query pipeline for raycasts and shape casts
    query_pipeline: QueryPipeline,

    events: EventCollector,
    pending: Vec<CollisionEvent>,
    points: Vec<ContactPoint>,
    /// Bodies with forces that must be cleared after the next step
    forced: Vec<RigidBodyHandle>,
    /// Requested total masses, applied to the first attached shape
    masses: HashMap<RigidBodyHandle, f32>,
}

impl RapierBackend {
    /// Create a new physics world with default configuration
    pub fn new() -> Self {
        Self::with_config(PhysicsConfig::default())
    }

    /// Create a new physics world with custom configuration
    pub fn with_config(config: PhysicsConfig) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = config.timestep;

        Self {
            config,
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            events: EventCollector::default(),
            pending: Vec::new(),
            points: Vec::new(),
            forced: Vec::new(),
            masses: HashMap::new(),
        }
    }

    /// Create a fixed ground plane at height `y`
    pub fn create_ground(&mut self, y: f32) -> RigidBodyHandle {
        let body = self
            .rigid_body_set
            .insert(RigidBodyBuilder::fixed().translation(vector![0.0, y, 0.0]));
        let normal = Unit::new_normalize(vector![0.0, 1.0, 0.0]);
        let ground = ColliderBuilder::halfspace(normal)
            .collision_groups(groups(Layer::Environment, Layer::Environment.mask(self.config.player_collision)))
            .friction(0.7)
            .restitution(0.0)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        self.collider_set
            .insert_with_parent(ground, body, &mut self.rigid_body_set);
        self.query_pipeline.update(&self.collider_set);
        body
    }

    /// Create a fixed environment box
    pub fn create_static_box(
        &mut self,
        half_extents: Vec3,
        position: Vec3,
    ) -> PhysicsResult<RigidBodyHandle> {
        let body = self.create_body(&BodyDesc::fixed(Pose::from_position(position)));
        let shape = ShapeDesc::new(Geometry::Box { half_extents }, Layer::Environment)
            .with_mask(Layer::Environment.mask(self.config.player_collision))
            .with_material(MaterialDesc::new(0.7, 0.7, 0.0));
        self.attach_shape(body, &shape)?;
        Ok(body)
    }

    fn parent(&self, collider: ColliderHandle) -> Option<RigidBodyHandle> {
        self.collider_set.get(collider).and_then(|c| c.parent())
    }

    fn collect_points(&mut self, c1: ColliderHandle, c2: ColliderHandle) {
        self.points.clear();
        let Some(pair) = self.narrow_phase.contact_pair(c1, c2) else {
            return;
        };
        let Some(collider1) = self.collider_set.get(pair.collider1) else {
            return;
        };
        for manifold in &pair.manifolds {
            let normal = manifold.data.normal;
            for point in &manifold.points {
                let world = collider1.position() * point.local_p1;
                self.points.push(ContactPoint {
                    position: Vec3::new(world.x, world.y, world.z),
                    normal: Vec3::new(normal.x, normal.y, normal.z),
                    impulse: Vec3::new(normal.x, normal.y, normal.z) * point.data.impulse,
                });
            }
        }
    }

    fn report(&mut self, event: CollisionEvent, sink: &mut dyn SimulationEventSink<RigidBodyHandle>) {
        let (c1, c2) = (event.collider1(), event.collider2());
        // removed colliders no longer resolve to a body
        let (Some(b1), Some(b2)) = (self.parent(c1), self.parent(c2)) else {
            return;
        };
        let status = if event.started() {
            TouchStatus::Found
        } else {
            TouchStatus::Lost
        };
        if event.sensor() {
            let c1_is_trigger = self.collider_set.get(c1).is_some_and(|c| c.is_sensor());
            let (trigger, other) = if c1_is_trigger { (b1, b2) } else { (b2, b1) };
            sink.on_trigger(TriggerPair {
                trigger,
                other,
                status,
                removed: event.removed(),
            });
            return;
        }
        if event.started() {
            self.collect_points(c1, c2);
        } else {
            self.points.clear();
        }
        sink.on_contact(backend::ContactPair {
            body0: b1,
            body1: b2,
            status,
            removed: event.removed(),
            points: &self.points,
        });
    }

    fn body_mut(&mut self, body: RigidBodyHandle) -> PhysicsResult<&mut RigidBody> {
        self.rigid_body_set
            .get_mut(body)
            .ok_or(PhysicsError::UnknownBody)
    }

    fn query_filter(mask: LayerMask) -> QueryFilter<'static> {
        QueryFilter::new()
            .exclude_sensors()
            .groups(InteractionGroups::new(
                Group::ALL,
                Group::from_bits_truncate(mask.bits()),
            ))
    }
}

impl Default for RapierBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn groups(layer: Layer, mask: LayerMask) -> InteractionGroups {
    InteractionGroups::new(
        Group::from_bits_truncate(layer.group().bits()),
        Group::from_bits_truncate(mask.bits()),
    )
}

fn combine_rule(mode: CombineMode) -> CoefficientCombineRule {
    match mode {
        CombineMode::Average => CoefficientCombineRule::Average,
        CombineMode::Min => CoefficientCombineRule::Min,
        CombineMode::Max => CoefficientCombineRule::Max,
        CombineMode::Multiply => CoefficientCombineRule::Multiply,
    }
}

fn to_isometry(pose: &Pose) -> Isometry3<f32> {
    let p = pose.position;
    let q = pose.rotation;
    Isometry3::from_parts(
        Translation3::new(p.x, p.y, p.z),
        UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z)),
    )
}

fn from_isometry(iso: &Isometry3<f32>) -> Pose {
    let t = iso.translation.vector;
    let c = iso.rotation.coords;
    Pose::new(Vec3::new(t.x, t.y, t.z), Quat::from_xyzw(c.x, c.y, c.z, c.w))
}

fn to_vector(v: Vec3) -> Vector<Real> {
    vector![v.x, v.y, v.z]
}

impl PhysicsBackend for RapierBackend {
    type Body = RigidBodyHandle;
    type Material = MaterialDesc;

    fn create_body(&mut self, desc: &BodyDesc) -> RigidBodyHandle {
        let builder = match desc.kind {
            BodyKind::Static => RigidBodyBuilder::fixed(),
            BodyKind::Kinematic => RigidBodyBuilder::kinematic_position_based(),
            BodyKind::Dynamic => RigidBodyBuilder::dynamic(),
        };
        let mut builder = builder
            .position(to_isometry(&desc.pose))
            .ccd_enabled(desc.ccd);
        if !desc.gravity {
            builder = builder.gravity_scale(0.0);
        }
        if desc.upright {
            builder = builder.locked_axes(LockedAxes::ROTATION_LOCKED_X | LockedAxes::ROTATION_LOCKED_Z);
        }
        let handle = self.rigid_body_set.insert(builder);
        if let Some(mass) = desc.mass {
            self.masses.insert(handle, mass);
        }
        handle
    }

    fn attach_shape(&mut self, body: RigidBodyHandle, shape: &ShapeDesc) -> PhysicsResult<()> {
        let first = self
            .rigid_body_set
            .get(body)
            .ok_or(PhysicsError::UnknownBody)?
            .colliders()
            .is_empty();
        let builder = match shape.geometry {
            Geometry::Sphere { radius } => ColliderBuilder::ball(radius),
            Geometry::Box { half_extents: h } => ColliderBuilder::cuboid(h.x, h.y, h.z),
            Geometry::Capsule { radius, half_height } => ColliderBuilder::capsule_y(half_height, radius),
        };
        let rule = combine_rule(shape.material.combine);
        let mut builder = builder
            .position(to_isometry(&shape.offset))
            .collision_groups(groups(shape.layer, shape.mask))
            .solver_groups(groups(shape.layer, shape.mask))
            .friction(shape.material.dynamic_friction)
            .restitution(shape.material.restitution)
            .friction_combine_rule(rule)
            .restitution_combine_rule(rule)
            .sensor(shape.trigger)
            .active_events(ActiveEvents::COLLISION_EVENTS);
        if shape.trigger {
            // sensors also see kinematic bodies, but never other fixed ones
            builder = builder.active_collision_types(
                ActiveCollisionTypes::default() | ActiveCollisionTypes::KINEMATIC_FIXED,
            );
        }
        match self.masses.get(&body) {
            Some(&mass) if first => builder = builder.mass(mass),
            Some(_) => builder = builder.density(0.0),
            None => {}
        }
        self.collider_set
            .insert_with_parent(builder, body, &mut self.rigid_body_set);
        self.query_pipeline.update(&self.collider_set);
        Ok(())
    }

    /// Remove a rigid body and its colliders
    fn remove_body(&mut self, body: RigidBodyHandle) {
        self.rigid_body_set.remove(
            body,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
        self.masses.remove(&body);
        self.forced.retain(|forced| *forced != body);
        self.query_pipeline.update(&self.collider_set);
    }

    fn body_kind(&self, body: RigidBodyHandle) -> Option<BodyKind> {
        self.rigid_body_set.get(body).map(|rb| match rb.body_type() {
            RigidBodyType::Fixed => BodyKind::Static,
            RigidBodyType::Dynamic => BodyKind::Dynamic,
            RigidBodyType::KinematicPositionBased | RigidBodyType::KinematicVelocityBased => {
                BodyKind::Kinematic
            }
        })
    }

    fn create_material(&mut self, desc: &MaterialDesc) -> MaterialDesc {
        *desc
    }

    fn set_material(&mut self, body: RigidBodyHandle, material: MaterialDesc) -> PhysicsResult<()> {
        let rb = self
            .rigid_body_set
            .get(body)
            .ok_or(PhysicsError::UnknownBody)?;
        let rule = combine_rule(material.combine);
        for &handle in rb.colliders() {
            if let Some(collider) = self.collider_set.get_mut(handle) {
                collider.set_friction(material.dynamic_friction);
                collider.set_restitution(material.restitution);
                collider.set_friction_combine_rule(rule);
                collider.set_restitution_combine_rule(rule);
            }
        }
        Ok(())
    }

    fn pose(&self, body: RigidBodyHandle) -> Option<Pose> {
        self.rigid_body_set
            .get(body)
            .map(|rb| from_isometry(rb.position()))
    }

    fn set_pose(&mut self, body: RigidBodyHandle, pose: Pose) -> PhysicsResult<()> {
        self.body_mut(body)?.set_position(to_isometry(&pose), true);
        Ok(())
    }

    fn set_kinematic_target(&mut self, body: RigidBodyHandle, pose: Pose) -> PhysicsResult<()> {
        self.body_mut(body)?
            .set_next_kinematic_position(to_isometry(&pose));
        Ok(())
    }

    fn linear_velocity(&self, body: RigidBodyHandle) -> Option<Vec3> {
        self.rigid_body_set.get(body).map(|rb| {
            let v = rb.linvel();
            Vec3::new(v.x, v.y, v.z)
        })
    }

    fn set_linear_velocity(&mut self, body: RigidBodyHandle, velocity: Vec3) -> PhysicsResult<()> {
        self.body_mut(body)?.set_linvel(to_vector(velocity), true);
        Ok(())
    }

    fn set_angular_velocity(&mut self, body: RigidBodyHandle, velocity: Vec3) -> PhysicsResult<()> {
        self.body_mut(body)?.set_angvel(to_vector(velocity), true);
        Ok(())
    }

    fn add_force(&mut self, body: RigidBodyHandle, force: Vec3) -> PhysicsResult<()> {
        self.body_mut(body)?.add_force(to_vector(force), true);
        self.forced.push(body);
        Ok(())
    }

    fn add_force_at_point(
        &mut self,
        body: RigidBodyHandle,
        force: Vec3,
        point: Vec3,
    ) -> PhysicsResult<()> {
        self.body_mut(body)?
            .add_force_at_point(to_vector(force), point![point.x, point.y, point.z], true);
        self.forced.push(body);
        Ok(())
    }

    fn set_simulation_enabled(&mut self, body: RigidBodyHandle, enabled: bool) -> PhysicsResult<()> {
        self.body_mut(body)?.set_enabled(enabled);
        Ok(())
    }

    fn simulate(&mut self, dt: f32, sink: &mut dyn SimulationEventSink<RigidBodyHandle>) {
        let gravity = to_vector(self.config.gravity);
        self.integration_parameters.dt = dt;

        self.physics_pipeline.step(
            &gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &self.events,
        );

        // Update query pipeline after physics step
        self.query_pipeline.update(&self.collider_set);

        // forces only last one step
        for body in self.forced.drain(..) {
            if let Some(rb) = self.rigid_body_set.get_mut(body) {
                rb.reset_forces(false);
            }
        }

        let mut pending = std::mem::take(&mut self.pending);
        pending.append(&mut self.events.collisions.lock());
        for event in pending.drain(..) {
            self.report(event, sink);
        }
        self.pending = pending;
    }

    fn active_bodies(&self, out: &mut Vec<RigidBodyHandle>) {
        out.extend_from_slice(self.island_manager.active_dynamic_bodies());
        out.extend_from_slice(self.island_manager.active_kinematic_bodies());
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RaycastHit<RigidBodyHandle>> {
        let ray = Ray::new(point![origin.x, origin.y, origin.z], to_vector(direction));
        let (collider, intersection) = self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            max_distance,
            true,
            Self::query_filter(mask),
        )?;
        Some(RaycastHit {
            body: self.parent(collider)?,
            distance: intersection.time_of_impact,
            point: origin + direction * intersection.time_of_impact,
            normal: Vec3::new(
                intersection.normal.x,
                intersection.normal.y,
                intersection.normal.z,
            ),
        })
    }

    fn sweep_sphere(
        &self,
        radius: f32,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<SweepHit<RigidBodyHandle>> {
        let position = Isometry::translation(origin.x, origin.y, origin.z);
        let (collider, hit) = self.query_pipeline.cast_shape(
            &self.rigid_body_set,
            &self.collider_set,
            &position,
            &to_vector(direction),
            &Ball::new(radius),
            ShapeCastOptions::with_max_time_of_impact(max_distance),
            Self::query_filter(mask),
        )?;
        // normal2 is the sphere's outward normal at the contact, in world axes
        let normal = -Vec3::new(hit.normal2.x, hit.normal2.y, hit.normal2.z);
        let witness = Vec3::new(hit.witness2.x, hit.witness2.y, hit.witness2.z);
        Some(SweepHit {
            body: self.parent(collider)?,
            distance: hit.time_of_impact,
            point: origin + direction * hit.time_of_impact + witness,
            normal,
        })
    }

    fn overlap_sphere(
        &self,
        radius: f32,
        origin: Vec3,
        mask: LayerMask,
        out: &mut Vec<RigidBodyHandle>,
    ) {
        let position = Isometry::translation(origin.x, origin.y, origin.z);
        self.query_pipeline.intersections_with_shape(
            &self.rigid_body_set,
            &self.collider_set,
            &position,
            &Ball::new(radius),
            Self::query_filter(mask),
            |collider| {
                if let Some(body) = self.parent(collider) {
                    if !out.contains(&body) {
                        out.push(body);
                    }
                }
                true
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActorDesc, ActorRegistry};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_physics_world_creation() {
        let world = RapierBackend::new();
        assert_eq!(world.config.gravity, Vec3::new(0.0, -9.81, 0.0));
    }

    #[test]
    fn test_ground_creation() {
        let mut world = RapierBackend::new();
        let ground = world.create_ground(0.0);
        assert_eq!(world.body_kind(ground), Some(BodyKind::Static));
        assert_eq!(world.rigid_body_set[ground].colliders().len(), 1);
    }

    #[test]
    fn test_raycast() {
        let mut world = RapierBackend::new();
        let ground = world.create_ground(0.0);

        let hit = world
            .raycast(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y, 100.0, LayerMask::GROUND)
            .unwrap();
        assert_eq!(hit.body, ground);
        assert!((hit.distance - 10.0).abs() < 1e-3);
        assert!((hit.normal - Vec3::Y).length() < 1e-3);

        let filtered = world.raycast(
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::NEG_Y,
            100.0,
            Layer::Player.into(),
        );
        assert!(filtered.is_none());
    }

    #[test]
    fn test_sweep_sphere_finds_floor() {
        let mut world = RapierBackend::new();
        world
            .create_static_box(Vec3::new(5.0, 0.5, 5.0), Vec3::new(0.0, -0.5, 0.0))
            .unwrap();

        let hit = world
            .sweep_sphere(0.29, Vec3::new(0.0, 0.41, 0.0), Vec3::NEG_Y, 0.22, LayerMask::GROUND)
            .unwrap();
        assert!((hit.distance - 0.12).abs() < 1e-2);
        assert!((hit.normal - Vec3::Y).length() < 1e-2);
        assert!(hit.point.y.abs() < 1e-2);
    }

    #[test]
    fn test_overlap_sphere() {
        let mut world = RapierBackend::new();
        let floor = world
            .create_static_box(Vec3::new(5.0, 0.5, 5.0), Vec3::new(0.0, -0.5, 0.0))
            .unwrap();
        let mut out = Vec::new();
        world.overlap_sphere(0.5, Vec3::new(0.0, 0.2, 0.0), LayerMask::ALL, &mut out);
        assert_eq!(out, vec![floor]);
        out.clear();
        world.overlap_sphere(0.5, Vec3::new(0.0, 3.0, 0.0), LayerMask::ALL, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_falling_ball_reports_contact() {
        let mut world = RapierBackend::new();
        let ground = world.create_ground(0.0);
        let ball = world.create_body(&BodyDesc::dynamic(Pose::from_position(Vec3::new(0.0, 2.0, 0.0))));
        world
            .attach_shape(
                ball,
                &ShapeDesc::new(Geometry::Sphere { radius: 0.5 }, Layer::Prop)
                    .with_material(MaterialDesc::new(0.5, 0.5, 0.0)),
            )
            .unwrap();

        let mut registry = ActorRegistry::new(world);
        let touched = Rc::new(RefCell::new(Vec::new()));
        let sink = touched.clone();
        registry
            .add_actor(
                ball,
                ActorDesc::new().on_contact_start(move |e| {
                    sink.borrow_mut().push((e.tag.map(str::to_owned), e.contacts.len()));
                    Ok(())
                }),
            )
            .unwrap();
        registry.add_actor(ground, ActorDesc::new().tag("ground")).unwrap();

        for _ in 0..120 {
            registry.step_begin();
            registry.step_end(1.0 / 60.0);
        }
        let touched = touched.borrow();
        assert!(!touched.is_empty());
        assert!(touched.iter().all(|(tag, _)| tag.as_deref() == Some("ground")));
        assert!(touched[0].1 > 0);

        let rest = registry.pose(registry.actor_for_body(ball).unwrap()).unwrap();
        assert!((rest.position.y - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_sensor_sees_kinematic_but_not_fixed_bodies() {
        let mut world = RapierBackend::new();
        let pad = world.create_body(&BodyDesc::fixed(Pose::IDENTITY));
        world
            .attach_shape(
                pad,
                &ShapeDesc::new(
                    Geometry::Box { half_extents: Vec3::splat(1.0) },
                    Layer::Environment,
                )
                .trigger(),
            )
            .unwrap();
        // overlaps the pad from the start
        let wall = world
            .create_static_box(Vec3::splat(0.5), Vec3::new(0.5, 0.0, 0.0))
            .unwrap();
        let cart = world.create_body(&BodyDesc::kinematic(Pose::from_position(Vec3::new(5.0, 0.0, 0.0))));
        world
            .attach_shape(
                cart,
                &ShapeDesc::new(Geometry::Box { half_extents: Vec3::splat(0.25) }, Layer::Player),
            )
            .unwrap();

        let mut registry = ActorRegistry::new(world);
        let entered = Rc::new(RefCell::new(Vec::new()));
        let sink = entered.clone();
        registry
            .add_actor(
                pad,
                ActorDesc::new().on_trigger_enter(move |e| {
                    sink.borrow_mut().push(e.tag.map(str::to_owned));
                    Ok(())
                }),
            )
            .unwrap();
        registry.add_actor(wall, ActorDesc::new().tag("wall")).unwrap();
        let cart = registry.add_actor(cart, ActorDesc::new().tag("cart")).unwrap();

        registry.set_kinematic_target(cart, Pose::IDENTITY).unwrap();
        for _ in 0..10 {
            registry.step_begin();
            registry.step_end(1.0 / 60.0);
        }
        assert_eq!(*entered.borrow(), vec![Some("cart".to_string())]);
    }
}
