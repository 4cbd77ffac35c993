//! The locally controlled player
//!
//! A dynamic, upright capsule driven by forces each fixed step. The capsule
//! ignores world gravity; the controller applies its own while airborne so
//! a grounded player never creeps down ramps. Render frames read input,
//! steer the camera, pick the animation mode and replicate state.

use drift_core::{EntityId, Node, NodeRef, Pose};
use drift_net::{Effect, EntityModified, NetworkConfig, Outbox, Packet};
use drift_physics::{
    ActorDesc, ActorId, ActorRegistry, BodyDesc, BodyKind, CombineMode, Geometry, Layer,
    LayerMask, MaterialDesc, PhysicsBackend, PhysicsResult, ShapeDesc,
};
use glam::{EulerRot, Mat4, Quat, Vec3};
use tracing::debug;

use crate::anchors::Anchors;
use crate::camera::{CameraConfig, CameraController};
use crate::input::{InputAction, InputState, TouchStick};

use super::effect::{EffectEnd, EffectState};
use super::state::{LocomotionState, ModeInputs, PlatformTrack, PushForce};
use super::sync::{NetworkSync, Snapshot};
use super::{LocomotionConfig, Mode};

const FORWARD: Vec3 = Vec3::NEG_Z;
/// Gravity pressed into dynamic platforms is a fraction of this
const STANDARD_GRAVITY: f32 = 9.81;
/// Gaze tilt in third person, since others usually see us from above
const GAZE_TILT: f32 = 10.0;

/// What a fixed step needs besides the player itself
pub struct PlayerContext<'a, B: PhysicsBackend> {
    pub registry: &'a mut ActorRegistry<B>,
    pub anchors: &'a Anchors,
    /// Build mode enables flying
    pub builder: bool,
    /// World time in seconds
    pub time: f32,
}

pub struct LocalPlayer {
    id: EntityId,
    pub config: LocomotionConfig,
    pub camera: CameraController,
    capsule: ActorId,
    /// Avatar root; position follows the interpolated capsule
    base: NodeRef,
    state: LocomotionState,
    effect: EffectState,
    /// Camera-relative move direction in world space
    move_dir: Vec3,
    fly_dir: Vec3,
    /// Un-rotated move input
    axis: Vec3,
    gaze: Vec3,
    moving: bool,
    running: bool,
    jump_down: bool,
    jump_pressed: bool,
    descend_down: bool,
    speaking: bool,
    emote: Option<String>,
    capsule_disabled: bool,
    sync: NetworkSync,
}

impl LocalPlayer {
    /// Create the capsule at `pose` and register it
    pub fn spawn<B: PhysicsBackend>(
        registry: &mut ActorRegistry<B>,
        id: EntityId,
        pose: Pose,
        config: LocomotionConfig,
        camera: CameraConfig,
        network: &NetworkConfig,
        player_collision: bool,
    ) -> PhysicsResult<Self> {
        let radius = config.capsule_radius;
        let half_height = config.capsule_half_height();

        let body = registry.backend_mut().create_body(
            &BodyDesc::dynamic(Pose::from_position(pose.position))
                .with_mass(config.mass)
                .upright()
                .without_gravity()
                .with_ccd(),
        );
        // feet at the body origin
        let shape = ShapeDesc::new(Geometry::Capsule { radius, half_height }, Layer::Player)
            .with_offset(Pose::from_position(Vec3::Y * (half_height + radius)))
            .with_mask(Layer::Player.mask(player_collision))
            .with_material(frictionless(CombineMode::Min));
        registry.backend_mut().attach_shape(body, &shape)?;

        let base = Node::new(pose).into_ref();
        let node = base.clone();
        let capsule = registry.add_actor(
            body,
            ActorDesc::new().player(id).on_interpolate(move |position, _| {
                let mut node = node.borrow_mut();
                let rotation = node.world_pose().rotation;
                node.set_world_pose(position, rotation);
            }),
        )?;

        let (yaw, _, _) = pose.rotation.to_euler(EulerRot::YXZ);
        debug!(player = %id, actor = %capsule, "spawned local player");
        Ok(Self {
            id,
            camera: CameraController::new(camera, pose.position, yaw),
            config,
            capsule,
            base,
            state: LocomotionState::default(),
            effect: EffectState::new(),
            move_dir: Vec3::ZERO,
            fly_dir: Vec3::ZERO,
            axis: Vec3::ZERO,
            gaze: FORWARD,
            moving: false,
            running: false,
            jump_down: false,
            jump_pressed: false,
            descend_down: false,
            speaking: false,
            emote: None,
            capsule_disabled: false,
            sync: NetworkSync::new(network.network_rate),
        })
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn capsule(&self) -> ActorId {
        self.capsule
    }

    pub fn base(&self) -> &NodeRef {
        &self.base
    }

    /// Avatar root in world space
    pub fn pose(&self) -> Pose {
        self.base.borrow().world_pose()
    }

    pub fn state(&self) -> &LocomotionState {
        &self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode
    }

    pub fn effect(&self) -> Option<&Effect> {
        self.effect.current()
    }

    pub fn is_moving(&self) -> bool {
        self.moving
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn move_dir(&self) -> Vec3 {
        self.move_dir
    }

    pub fn fly_dir(&self) -> Vec3 {
        self.fly_dir
    }

    pub fn axis(&self) -> Vec3 {
        self.axis
    }

    pub fn gaze(&self) -> Vec3 {
        self.gaze
    }

    pub fn emote(&self) -> Option<&str> {
        self.emote.as_deref()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    fn anchor(&self, anchors: &Anchors) -> Option<Mat4> {
        self.effect.anchor_id().and_then(|id| anchors.get(id))
    }

    /// One fixed step of locomotion
    pub fn fixed_update<B: PhysicsBackend>(
        &mut self,
        ctx: &mut PlayerContext<'_, B>,
        dt: f32,
    ) -> PhysicsResult<()> {
        let anchored = self.anchor(ctx.anchors).is_some();
        if anchored != self.capsule_disabled {
            ctx.registry
                .set_simulation_enabled(self.capsule, !anchored)?;
            self.capsule_disabled = anchored;
        }

        if anchored {
            // pinned; late_update places us
        } else if !self.state.flying {
            self.walk(ctx.registry, dt)?;
        } else {
            self.fly(ctx.registry, ctx.builder, dt)?;
        }

        // double jump in build mode toggles flying
        if self.jump_pressed && ctx.builder {
            if ctx.time - self.state.last_jump_at < self.config.double_jump_window {
                self.toggle_flying(ctx.registry, None)?;
            }
            self.state.last_jump_at = ctx.time;
        }
        // a press is consumed by the first fixed step that sees it
        self.jump_pressed = false;
        Ok(())
    }

    fn walk<B: PhysicsBackend>(&mut self, registry: &mut ActorRegistry<B>, dt: f32) -> PhysicsResult<()> {
        if self.state.grounded {
            self.follow_platform(registry)?;
        } else {
            self.state.platform = None;
        }

        let config = &self.config;
        let state = &mut self.state;
        let pose = registry.pose(self.capsule)?;

        let sweep_radius = config.capsule_radius - config.sweep_inset;
        let hit = registry.sweep_sphere(
            sweep_radius,
            pose.position + Vec3::Y * (sweep_radius + config.sweep_lift),
            Vec3::NEG_Y,
            config.sweep_lift + config.sweep_reach,
            LayerMask::GROUND,
        )?;
        match hit {
            Some(hit) => {
                state.just_left_ground = false;
                state.grounded = true;
                state.ground_normal = hit.normal;
                state.ground_angle = Vec3::Y.angle_between(hit.normal).to_degrees();
            }
            None => {
                state.just_left_ground = state.grounded;
                state.grounded = false;
                state.ground_normal = Vec3::Y;
                state.ground_angle = 0.0;
            }
        }

        if state.grounded && state.ground_angle > config.max_slope {
            state.just_left_ground = false;
            state.grounded = false;
            state.ground_normal = Vec3::Y;
            state.ground_angle = 0.0;
            state.slipping = true;
        } else {
            state.slipping = false;
        }

        // grip what we stand on, slide off what we touch in the air
        let combine = if state.grounded {
            CombineMode::Max
        } else {
            CombineMode::Min
        };
        if state.friction != Some(combine) {
            registry.set_material(self.capsule, &frictionless(combine))?;
            state.friction = Some(combine);
        }

        if state.jumped && !state.grounded {
            state.jumped = false;
            state.jumping = true;
        }

        let base_y = self.base.borrow().world_pose().position.y;
        if !state.grounded && registry.linear_velocity(self.capsule)?.y < 0.0 {
            state.fall_timer += dt;
        } else {
            state.fall_timer = 0.0;
        }
        if state.fall_timer > config.fall_confirm && !state.falling {
            state.jumping = false;
            state.falling = true;
            state.fall_start_y = base_y;
        }
        if state.falling {
            state.fall_distance = state.fall_start_y - base_y;
        }
        if state.falling && state.grounded {
            state.falling = false;
        }
        if state.jumping && state.grounded {
            state.jumping = false;
        }

        if state.grounded {
            // our weight is switched off, so press dynamic platforms down by hand
            if let Some(track) = state.platform {
                if registry.kind(track.actor) == Some(BodyKind::Dynamic) {
                    let force = Vec3::new(0.0, -STANDARD_GRAVITY * config.platform_compensation, 0.0);
                    registry.add_force_at_point(track.actor, force, pose.position)?;
                }
            }
        } else {
            registry.add_force(self.capsule, Vec3::new(0.0, -config.effective_gravity(), 0.0))?;
        }

        let normal = state.ground_normal;
        let mut velocity = registry.linear_velocity(self.capsule)?;
        let perpendicular = normal * velocity.dot(normal);
        let parallel = (velocity - perpendicular) * (1.0 - config.ground_drag * dt);
        velocity = parallel + perpendicular;
        if state.grounded && !state.jumping {
            velocity -= normal * velocity.dot(normal);
        }
        if state.just_left_ground && !state.jumping {
            velocity.y = config.walk_off_velocity;
        }
        if state.slipping {
            velocity.y -= config.slip_velocity;
        }

        if let Some(push) = state.push.as_mut() {
            if !push.applied {
                push.applied = true;
                // an upward push leaves the ground like a jump
                if push.force.y != 0.0 {
                    state.jumped = true;
                    state.jumping = false;
                    state.falling = false;
                }
            }
            velocity += push.force;
            if !push.decay(config.push_drag, dt, config.push_cutoff) {
                state.push = None;
            }
        }
        registry.set_linear_velocity(self.capsule, velocity)?;

        let snare = self.effect.snare();
        if self.moving {
            let speed = if self.running {
                config.run_speed
            } else {
                config.walk_speed
            };
            let speed = speed * config.mass * (1.0 - snare);
            let slope = Quat::from_rotation_arc(Vec3::Y, normal);
            let force = slope * (self.move_dir * speed * config.move_force_scale);
            registry.add_force(self.capsule, force)?;
        }

        let jump = state.grounded
            && !state.jumping
            && self.jump_down
            && snare == 0.0
            && !self.effect.freeze();
        if jump {
            let mut velocity = registry.linear_velocity(self.capsule)?;
            velocity.y = config.jump_velocity();
            registry.set_linear_velocity(self.capsule, velocity)?;
            state.jumped = true;
        }
        Ok(())
    }

    /// Carry the capsule along with whatever it stood on last step
    fn follow_platform<B: PhysicsBackend>(&mut self, registry: &mut ActorRegistry<B>) -> PhysicsResult<()> {
        let pose = registry.pose(self.capsule)?;
        let hit = registry.raycast(
            pose.position + Vec3::Y * self.config.platform_probe_lift,
            Vec3::NEG_Y,
            self.config.platform_probe_distance,
            LayerMask::GROUND,
        )?;
        let actor = hit.and_then(|hit| hit.actor);
        if self.state.platform.map(|track| track.actor) != actor {
            self.state.platform = actor.and_then(|actor| {
                let prev = registry.pose(actor).ok()?.matrix();
                Some(PlatformTrack { actor, prev })
            });
        }

        let Some(track) = self.state.platform else {
            return Ok(());
        };
        let Ok(platform) = registry.pose(track.actor) else {
            self.state.platform = None;
            return Ok(());
        };
        let curr = platform.matrix();
        let delta = curr * track.prev.inverse();

        // the capsule never rotates; only the avatar turns, about Y
        let position = delta.transform_point3(pose.position);
        registry.move_actor(self.capsule, Pose::new(position, pose.rotation))?;
        let (_, delta_rotation, _) = delta.to_scale_rotation_translation();
        let (yaw, _, _) = delta_rotation.to_euler(EulerRot::YXZ);
        if yaw != 0.0 {
            let mut base = self.base.borrow_mut();
            let world = base.world_pose();
            base.set_world_pose(world.position, world.rotation * Quat::from_rotation_y(yaw));
        }

        self.state.platform = Some(PlatformTrack {
            actor: track.actor,
            prev: curr,
        });
        Ok(())
    }

    fn fly<B: PhysicsBackend>(
        &mut self,
        registry: &mut ActorRegistry<B>,
        builder: bool,
        dt: f32,
    ) -> PhysicsResult<()> {
        let config = &self.config;
        if self.moving || self.jump_down || self.descend_down {
            let thrust = if self.running {
                config.fly_force * config.fly_run_multiplier
            } else {
                config.fly_force
            };
            let mut force = self.fly_dir * thrust;
            if self.jump_down {
                force.y = thrust;
            } else if self.descend_down {
                force.y = -thrust;
            }
            registry.add_force(self.capsule, force)?;
        }

        let velocity = registry.linear_velocity(self.capsule)?;
        registry.add_force(self.capsule, velocity * (-config.fly_drag * dt))?;
        registry.set_angular_velocity(self.capsule, Vec3::ZERO)?;

        if !builder {
            self.toggle_flying(registry, Some(false))?;
        }
        Ok(())
    }

    /// Enter or leave flight; `None` flips the current state
    pub fn toggle_flying<B: PhysicsBackend>(
        &mut self,
        registry: &mut ActorRegistry<B>,
        value: Option<bool>,
    ) -> PhysicsResult<()> {
        let value = value.unwrap_or(!self.state.flying);
        if self.state.flying == value {
            return Ok(());
        }
        self.state.flying = value;
        if value {
            let mut velocity = registry.linear_velocity(self.capsule)?;
            velocity.y = 0.0;
            registry.set_linear_velocity(self.capsule, velocity)?;
        }
        self.state.last_jump_at = f32::NEG_INFINITY;
        debug!(player = %self.id, flying = value, "flying toggled");
        Ok(())
    }

    /// Render-rate update: look, zoom, movement intent, facing, animation
    /// mode and replication
    pub fn update(
        &mut self,
        anchors: &Anchors,
        input: &mut InputState,
        dt: f32,
        outbox: &mut dyn Outbox,
    ) {
        let xr = input.xr;
        let freeze = self.effect.freeze();
        let anchored = self.anchor(anchors).is_some();

        self.camera.look(input, dt);
        self.camera.zoom(input);

        match xr {
            Some(xr) => {
                self.jump_down = xr.jump_down;
                self.jump_pressed |= xr.jump_pressed;
                self.descend_down = false;
            }
            None => {
                self.jump_down = input.is_held(InputAction::Jump);
                self.jump_pressed |= input.is_just_pressed(InputAction::Jump);
                self.descend_down = input.is_held(InputAction::Descend);
            }
        }

        let mut analog = xr.is_some();
        let mut dir = Vec3::ZERO;
        if let Some(xr) = xr {
            dir.x = xr.left_stick.x;
            dir.z = xr.left_stick.y;
        } else if let Some(axis) = input.stick.as_mut().and_then(TouchStick::axis) {
            analog = true;
            dir.x = axis.x;
            dir.z = axis.y;
        } else {
            if input.is_held(InputAction::MoveForward) {
                dir.z -= 1.0;
            }
            if input.is_held(InputAction::MoveBackward) {
                dir.z += 1.0;
            }
            if input.is_held(InputAction::MoveLeft) {
                dir.x -= 1.0;
            }
            if input.is_held(InputAction::MoveRight) {
                dir.x += 1.0;
            }
        }
        self.moving = dir.length() > 0.0;

        if self.effect.cancellable() && (self.moving || self.jump_down) {
            self.set_effect(None, None, outbox);
        }
        if freeze || anchored {
            dir = Vec3::ZERO;
            self.moving = false;
        }

        self.running = self.moving
            && if analog {
                dir.length() > self.config.run_stick_threshold
            } else {
                input.is_held(InputAction::Sprint)
            };

        let dir = dir.normalize_or_zero();
        let (yaw, look) = match xr {
            Some(xr) => {
                let (head_yaw, _, _) = xr.head_rotation.to_euler(EulerRot::YXZ);
                (
                    head_yaw + self.camera.yaw,
                    Quat::from_rotation_y(self.camera.yaw) * xr.head_rotation,
                )
            }
            None => (self.camera.yaw, self.camera.rotation()),
        };
        self.fly_dir = look * dir;
        self.axis = dir;
        self.move_dir = Quat::from_rotation_y(yaw) * dir;

        if self.effect.turn() || self.moving || self.camera.is_first_person() {
            let alpha = 1.0 - self.config.facing_smoothing.powf(dt);
            let mut base = self.base.borrow_mut();
            let world = base.world_pose();
            let facing = world.rotation.slerp(Quat::from_rotation_y(yaw), alpha);
            base.set_world_pose(world.position, facing);
        }

        if self.emote.as_deref() != self.effect.emote() {
            self.emote = self.effect.emote().map(str::to_owned);
        }

        self.state.mode = self.state.select_mode(
            ModeInputs {
                emote: self.emote.is_some(),
                moving: self.moving,
                running: self.running,
                speaking: self.speaking,
            },
            self.config.fall_mode_distance,
        );

        self.gaze = look * FORWARD;
        if xr.is_none() && !self.camera.is_first_person() {
            let tilt_axis = look * Vec3::X;
            self.gaze = Quat::from_axis_angle(tilt_axis, GAZE_TILT.to_radians()) * self.gaze;
        }

        let pose = self.pose();
        let snapshot = Snapshot {
            position: pose.position,
            rotation: pose.rotation,
            mode: self.state.mode,
            axis: self.axis,
            gaze: self.gaze,
            emote: self.emote.clone(),
        };
        if let Some(diff) = self.sync.tick(self.id, dt, &snapshot) {
            outbox.send(Packet::EntityModified(diff));
        }

        if self.effect.tick(dt) {
            self.set_effect(None, None, outbox);
        }
    }

    /// Pin to the anchor, if any, then bring the camera along
    pub fn late_update<B: PhysicsBackend>(
        &mut self,
        registry: &mut ActorRegistry<B>,
        anchors: &Anchors,
        xr: bool,
        dt: f32,
    ) -> PhysicsResult<()> {
        if let Some(anchor) = self.anchor(anchors) {
            let pinned = Pose::from_matrix(&anchor);
            self.base
                .borrow_mut()
                .set_world_pose(pinned.position, pinned.rotation);
            let capsule = registry.pose(self.capsule)?;
            registry.snap(self.capsule, Pose::new(pinned.position, capsule.rotation))?;
        }
        let position = self.pose().position;
        self.camera.follow(position, xr, dt);
        self.camera.collide(registry);
        Ok(())
    }

    /// Move instantly, telling peers not to interpolate the jump
    pub fn teleport<B: PhysicsBackend>(
        &mut self,
        registry: &mut ActorRegistry<B>,
        position: Vec3,
        rotation_y: Option<f32>,
        outbox: &mut dyn Outbox,
    ) -> PhysicsResult<()> {
        let capsule = registry.pose(self.capsule)?;
        registry.snap(self.capsule, Pose::new(position, capsule.rotation))?;
        let pose = {
            let mut base = self.base.borrow_mut();
            let rotation = match rotation_y {
                Some(yaw) => Quat::from_rotation_y(yaw),
                None => base.world_pose().rotation,
            };
            base.set_world_pose(position, rotation);
            base.world_pose()
        };

        let mut diff = EntityModified::new(self.id);
        diff.p = Some(pose.position);
        diff.q = Some(pose.rotation);
        diff.t = Some(true);
        outbox.send(Packet::EntityModified(diff));

        self.camera.snap(position, rotation_y);
        debug!(player = %self.id, ?position, "teleported");
        Ok(())
    }

    /// Start, replace or clear (`None`) the active effect and relay it.
    /// Setting the effect that is already active does nothing.
    pub fn set_effect(
        &mut self,
        effect: Option<Effect>,
        on_end: Option<EffectEnd>,
        outbox: &mut dyn Outbox,
    ) {
        if !self.effect.set(effect.clone(), on_end) {
            return;
        }
        let mut diff = EntityModified::new(self.id);
        diff.ef = Some(effect);
        outbox.send(Packet::EntityModified(diff));
    }

    pub fn set_speaking(&mut self, speaking: bool) {
        self.speaking = speaking;
    }

    /// Add an external impulse-like push, merged with any push in progress
    pub fn push(&mut self, force: Vec3) {
        match self.state.push.as_mut() {
            Some(push) => push.force += force,
            None => self.state.push = Some(PushForce::new(force)),
        }
    }

    /// Apply a diff addressed to us by the server
    pub fn modify(&mut self, diff: &EntityModified) {
        if let Some(effect) = &diff.ef {
            self.effect.replace(effect.clone());
        }
    }

    pub fn destroy<B: PhysicsBackend>(self, registry: &mut ActorRegistry<B>) -> PhysicsResult<()> {
        registry.destroy(self.capsule)
    }
}

fn frictionless(combine: CombineMode) -> MaterialDesc {
    MaterialDesc::new(0.0, 0.0, 0.0).with_combine(combine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_physics::mock::{MockBackend, MockBody};
    use std::cell::Cell;
    use std::rc::Rc;

    const DT: f32 = 1.0 / 50.0;

    struct Rig {
        registry: ActorRegistry<MockBackend>,
        anchors: Anchors,
        player: LocalPlayer,
        floor: MockBody,
        outbox: Vec<Packet>,
        input: InputState,
        time: f32,
    }

    impl Rig {
        fn new() -> Self {
            let mut registry = ActorRegistry::new(MockBackend::new());
            let floor = slab(&mut registry, Vec3::new(0.0, -0.5, 0.0), BodyDesc::fixed, Layer::Environment);
            let player = LocalPlayer::spawn(
                &mut registry,
                EntityId::new(),
                Pose::IDENTITY,
                LocomotionConfig::default(),
                CameraConfig::default(),
                &NetworkConfig::default(),
                false,
            )
            .unwrap();
            Self {
                registry,
                anchors: Anchors::new(),
                player,
                floor,
                outbox: Vec::new(),
                input: InputState::new(),
                time: 0.0,
            }
        }

        fn step(&mut self, builder: bool) {
            self.locomote(builder);
            self.registry.step_end(DT);
            self.registry.interpolate(1.0);
        }

        /// Run locomotion for a step without simulating it yet
        fn locomote(&mut self, builder: bool) {
            self.time += DT;
            self.registry.step_begin();
            let mut ctx = PlayerContext {
                registry: &mut self.registry,
                anchors: &self.anchors,
                builder,
                time: self.time,
            };
            self.player.fixed_update(&mut ctx, DT).unwrap();
        }

        fn remove_floor(&mut self) {
            let floor = self.registry.actor_for_body(self.floor).unwrap();
            self.registry.destroy(floor).unwrap();
        }

        fn update(&mut self) {
            self.player
                .update(&self.anchors, &mut self.input, DT, &mut self.outbox);
            self.input.clear_frame();
        }

        fn velocity(&self) -> Vec3 {
            self.registry.linear_velocity(self.player.capsule()).unwrap()
        }

        fn position(&self) -> Vec3 {
            self.registry.pose(self.player.capsule()).unwrap().position
        }
    }

    fn slab(
        registry: &mut ActorRegistry<MockBackend>,
        center: Vec3,
        desc: fn(Pose) -> BodyDesc,
        layer: Layer,
    ) -> MockBody {
        let body = registry.backend_mut().create_body(&desc(Pose::from_position(center)));
        registry
            .backend_mut()
            .attach_shape(
                body,
                &ShapeDesc::new(Geometry::Box { half_extents: Vec3::new(10.0, 0.5, 10.0) }, layer),
            )
            .unwrap();
        registry.add_actor(body, ActorDesc::new()).unwrap();
        body
    }

    #[test]
    fn rests_on_a_flat_floor() {
        let mut rig = Rig::new();
        rig.step(false);
        rig.update();
        let state = rig.player.state();
        assert!(state.grounded);
        assert!(!state.slipping);
        assert!(rig.velocity().y.abs() < 1e-5);
        assert_eq!(rig.player.mode(), Mode::Idle);
        assert_eq!(state.friction, Some(CombineMode::Max));
    }

    #[test]
    fn jump_leaves_the_ground() {
        let mut rig = Rig::new();
        rig.step(false);
        rig.input.held.insert(InputAction::Jump);
        rig.update();
        rig.step(false);
        assert!((rig.velocity().y - 60f32.sqrt()).abs() < 1e-4);
        assert!(rig.player.state().jumped);

        rig.step(false);
        let state = rig.player.state();
        assert!(!state.grounded);
        assert!(state.jumping);
        assert!(!state.jumped);
        assert_eq!(state.friction, Some(CombineMode::Min));
        rig.update();
        assert_eq!(rig.player.mode(), Mode::Jump);
    }

    #[test]
    fn rides_a_moving_platform() {
        let mut rig = Rig::new();
        // swap the static floor for a kinematic platform
        rig.remove_floor();
        let platform = slab(&mut rig.registry, Vec3::new(0.0, -0.5, 0.0), BodyDesc::kinematic, Layer::Prop);
        let platform_id = rig.registry.actor_for_body(platform).unwrap();
        rig.step(false);
        rig.step(false);
        assert!(rig.player.state().grounded);
        let start = rig.position();

        rig.registry
            .set_kinematic_target(platform_id, Pose::from_position(Vec3::new(1.0, -0.5, 0.0)))
            .unwrap();
        rig.step(false);
        rig.step(false);
        let moved = rig.position() - start;
        assert!((moved - Vec3::X).length() < 1e-4, "moved {moved:?}");
        assert_eq!(rig.player.state().platform.map(|t| t.actor), Some(platform_id));
    }

    #[test]
    fn walking_off_an_edge_drops_at_once() {
        let mut rig = Rig::new();
        rig.step(false);
        assert!(rig.player.state().grounded);

        rig.remove_floor();
        rig.step(false);
        let state = rig.player.state();
        assert!(!state.grounded);
        assert!(state.just_left_ground);
        // walk-off velocity, then one step of capsule gravity
        let expected = -5.0 - 20.0 * DT;
        assert!((rig.velocity().y - expected).abs() < 1e-4, "vy {}", rig.velocity().y);
    }

    #[test]
    fn presses_down_on_dynamic_platforms() {
        let mut rig = Rig::new();
        rig.remove_floor();
        let raft = slab(
            &mut rig.registry,
            Vec3::new(0.0, -0.5, 0.0),
            |pose| BodyDesc::dynamic(pose).without_gravity(),
            Layer::Prop,
        );
        let raft_id = rig.registry.actor_for_body(raft).unwrap();
        rig.step(false);
        assert!(rig.player.state().grounded);

        rig.locomote(false);
        assert_eq!(rig.player.state().platform.map(|t| t.actor), Some(raft_id));
        let forces = &rig.registry.backend().state(raft).unwrap().point_forces;
        assert_eq!(forces.len(), 1);
        let (force, point) = forces[0];
        assert!((force - Vec3::new(0.0, -9.81 * 0.2, 0.0)).length() < 1e-5);
        assert!((point - rig.position()).length() < 1e-5);
    }

    #[test]
    fn push_decays_then_clears() {
        let mut rig = Rig::new();
        rig.step(false);
        rig.player.push(Vec3::new(10.0, 0.0, 0.0));
        for _ in 0..13 {
            rig.step(false);
        }
        assert!(rig.player.state().push.is_some());
        rig.step(false);
        assert!(rig.player.state().push.is_none());
        assert!(!rig.player.state().jumped);
    }

    #[test]
    fn upward_push_counts_as_a_jump() {
        let mut rig = Rig::new();
        rig.step(false);
        rig.player.push(Vec3::new(0.0, 5.0, 0.0));
        rig.step(false);
        assert!(rig.player.state().jumped);
        assert!(rig.velocity().y > 4.0);
    }

    #[test]
    fn steep_ground_slips() {
        let mut rig = Rig::new();
        let steep = Vec3::new(70f32.to_radians().sin(), 70f32.to_radians().cos(), 0.0);
        let floor = rig.floor;
        rig.registry.backend_mut().set_surface_normal(floor, steep);
        rig.step(false);
        let state = rig.player.state();
        assert!(state.slipping);
        assert!(!state.grounded);
        assert_eq!(state.ground_normal, Vec3::Y);
    }

    #[test]
    fn slipping_pulls_down_before_the_floor_catches_us() {
        let mut rig = Rig::new();
        let steep = Vec3::new(70f32.to_radians().sin(), 70f32.to_radians().cos(), 0.0);
        let floor = rig.floor;
        rig.registry.backend_mut().set_surface_normal(floor, steep);
        rig.locomote(false);
        assert!(rig.player.state().slipping);
        assert!(rig.velocity().y <= -0.5, "vy {}", rig.velocity().y);
    }

    #[test]
    fn camera_eye_stops_in_front_of_walls() {
        let mut rig = Rig::new();
        rig.step(false);
        rig.player
            .late_update(&mut rig.registry, &rig.anchors, false, DT)
            .unwrap();
        let camera = &rig.player.camera;
        let open = (camera.eye() - camera.position()).length();
        assert!((open - camera.zoom).abs() < 1e-4, "eye {open} behind the pivot");

        let wall = rig
            .registry
            .backend_mut()
            .create_body(&BodyDesc::fixed(Pose::from_position(Vec3::new(0.0, 1.0, 1.0))));
        rig.registry
            .backend_mut()
            .attach_shape(
                wall,
                &ShapeDesc::new(
                    Geometry::Box { half_extents: Vec3::new(5.0, 5.0, 0.25) },
                    Layer::Environment,
                ),
            )
            .unwrap();
        rig.registry.add_actor(wall, ActorDesc::new()).unwrap();

        rig.player
            .late_update(&mut rig.registry, &rig.anchors, false, DT)
            .unwrap();
        let camera = &rig.player.camera;
        assert!((camera.eye() - camera.position()).length() < 1.0);
    }

    #[test]
    fn walking_pushes_along_the_camera_forward() {
        let mut rig = Rig::new();
        rig.step(false);
        rig.input.held.insert(InputAction::MoveForward);
        rig.update();
        assert!(rig.player.is_moving());
        assert!(!rig.player.is_running());
        assert!((rig.player.move_dir() - Vec3::NEG_Z).length() < 1e-5);
        assert_eq!(rig.player.axis(), Vec3::NEG_Z);
        assert_eq!(rig.player.mode(), Mode::Walk);

        rig.step(false);
        assert!(rig.velocity().z < 0.0);

        rig.input.held.insert(InputAction::Sprint);
        rig.update();
        assert_eq!(rig.player.mode(), Mode::Run);
    }

    #[test]
    fn double_jump_toggles_flight_in_build_mode() {
        let mut rig = Rig::new();
        rig.step(true);
        rig.input.just_pressed.insert(InputAction::Jump);
        rig.update();
        rig.step(true);
        assert!(!rig.player.state().flying);

        rig.input.just_pressed.insert(InputAction::Jump);
        rig.update();
        rig.step(true);
        assert!(rig.player.state().flying);
        rig.update();
        assert_eq!(rig.player.mode(), Mode::Fly);

        // leaving build mode grounds us again
        rig.step(false);
        assert!(!rig.player.state().flying);
    }

    #[test]
    fn anchored_player_is_pinned() {
        let mut rig = Rig::new();
        let seat = Mat4::from_rotation_translation(Quat::from_rotation_y(1.0), Vec3::new(5.0, 2.0, 0.0));
        rig.anchors.set("seat", seat);
        rig.player.set_effect(
            Some(Effect {
                anchor_id: Some("seat".into()),
                ..Default::default()
            }),
            None,
            &mut rig.outbox,
        );
        assert!(matches!(
            rig.outbox.last(),
            Some(Packet::EntityModified(EntityModified { ef: Some(Some(_)), .. }))
        ));

        rig.step(false);
        let body = rig.registry.body(rig.player.capsule()).unwrap();
        assert!(!rig.registry.backend().state(body).unwrap().enabled);

        rig.input.held.insert(InputAction::MoveForward);
        rig.update();
        assert!(!rig.player.is_moving());

        rig.player
            .late_update(&mut rig.registry, &rig.anchors, false, DT)
            .unwrap();
        let pose = rig.player.pose();
        assert!((pose.position - Vec3::new(5.0, 2.0, 0.0)).length() < 1e-4);
        assert!((rig.position() - Vec3::new(5.0, 2.0, 0.0)).length() < 1e-4);

        rig.player.set_effect(None, None, &mut rig.outbox);
        rig.step(false);
        assert!(rig.registry.backend().state(body).unwrap().enabled);
    }

    #[test]
    fn movement_cancels_a_cancellable_effect() {
        let mut rig = Rig::new();
        let ended = Rc::new(Cell::new(false));
        let hook = ended.clone();
        rig.player.set_effect(
            Some(Effect {
                emote: Some("sit".into()),
                cancellable: true,
                ..Default::default()
            }),
            Some(Box::new(move || hook.set(true))),
            &mut rig.outbox,
        );
        rig.update();
        assert_eq!(rig.player.emote(), Some("sit"));
        assert_eq!(rig.player.mode(), Mode::Idle);

        rig.outbox.clear();
        rig.input.held.insert(InputAction::MoveRight);
        rig.update();
        assert!(ended.get());
        assert!(rig.player.effect().is_none());
        assert!(rig.outbox.iter().any(|packet| matches!(
            packet,
            Packet::EntityModified(EntityModified { ef: Some(None), .. })
        )));
    }

    #[test]
    fn teleport_snaps_and_announces() {
        let mut rig = Rig::new();
        rig.player
            .teleport(&mut rig.registry, Vec3::new(3.0, 0.0, 4.0), Some(1.5), &mut rig.outbox)
            .unwrap();
        assert_eq!(rig.position(), Vec3::new(3.0, 0.0, 4.0));
        assert_eq!(rig.player.camera.yaw, 1.5);
        let Some(Packet::EntityModified(diff)) = rig.outbox.last() else {
            panic!("no teleport diff");
        };
        assert!(diff.is_teleport());
        assert_eq!(diff.p, Some(Vec3::new(3.0, 0.0, 4.0)));
        let q = diff.q.unwrap();
        assert!(q.angle_between(Quat::from_rotation_y(1.5)) < 1e-4);
    }

    #[test]
    fn replicates_changes_at_the_network_rate() {
        let mut rig = Rig::new();
        rig.step(false);
        // the first due tick only records a baseline
        for _ in 0..7 {
            rig.update();
        }
        assert!(rig.outbox.is_empty());

        rig.player.set_speaking(true);
        for _ in 0..6 {
            rig.update();
        }
        assert!(rig.outbox.is_empty());
        rig.update();
        let Some(Packet::EntityModified(diff)) = rig.outbox.last() else {
            panic!("expected a diff");
        };
        assert_eq!(diff.m, Some(Mode::Talk.as_u8()));
        assert!(diff.p.is_none());
        assert!(diff.q.is_none());
    }
}
