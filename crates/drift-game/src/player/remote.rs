//! Players owned by other clients
//!
//! Position and orientation come from the network through jitter buffers;
//! the capsule is kinematic and only follows the rendered pose so local
//! bodies can collide with it.

use drift_core::{EntityId, Node, NodeRef, Pose};
use drift_net::{BufferedLerpQuat, BufferedLerpVec3, EntityModified, NetworkConfig};
use drift_physics::{
    ActorDesc, ActorId, ActorRegistry, BodyDesc, Geometry, Layer, PhysicsBackend, PhysicsResult,
    ShapeDesc,
};
use glam::{Mat4, Vec3};
use tracing::{debug, warn};

use crate::anchors::Anchors;

use super::effect::EffectState;
use super::{LocomotionConfig, Mode};

pub struct RemotePlayer {
    id: EntityId,
    base: NodeRef,
    body: ActorId,
    position: BufferedLerpVec3,
    rotation: BufferedLerpQuat,
    /// Bumped by every teleport; the next pushes discard buffered history
    teleport: u32,
    mode: Mode,
    axis: Vec3,
    gaze: Vec3,
    emote: Option<String>,
    effect: EffectState,
    body_active: bool,
}

impl RemotePlayer {
    pub fn spawn<B: PhysicsBackend>(
        registry: &mut ActorRegistry<B>,
        id: EntityId,
        pose: Pose,
        config: &LocomotionConfig,
        network: &NetworkConfig,
        player_collision: bool,
    ) -> PhysicsResult<Self> {
        let radius = config.capsule_radius;
        let half_height = config.capsule_half_height();
        let body = registry.backend_mut().create_body(&BodyDesc::kinematic(pose));
        let shape = ShapeDesc::new(Geometry::Capsule { radius, half_height }, Layer::Player)
            .with_offset(Pose::from_position(Vec3::Y * (half_height + radius)))
            .with_mask(Layer::Player.mask(player_collision));
        registry.backend_mut().attach_shape(body, &shape)?;
        let body = registry.add_actor(body, ActorDesc::new().player(id))?;

        let buffer = network.buffer_seconds();
        debug!(player = %id, actor = %body, "spawned remote player");
        Ok(Self {
            id,
            base: Node::new(pose).into_ref(),
            body,
            position: BufferedLerpVec3::new(pose.position, buffer),
            rotation: BufferedLerpQuat::new(pose.rotation, buffer),
            teleport: 0,
            mode: Mode::Idle,
            axis: Vec3::ZERO,
            gaze: Vec3::ZERO,
            emote: None,
            effect: EffectState::new(),
            body_active: true,
        })
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn body(&self) -> ActorId {
        self.body
    }

    pub fn base(&self) -> &NodeRef {
        &self.base
    }

    pub fn pose(&self) -> Pose {
        self.base.borrow().world_pose()
    }

    pub fn mode(&self) -> Mode {
        self.mode
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

    pub fn effect(&self) -> Option<&drift_net::Effect> {
        self.effect.current()
    }

    fn anchor(&self, anchors: &Anchors) -> Option<Mat4> {
        self.effect.anchor_id().and_then(|id| anchors.get(id))
    }

    /// Apply a state diff from the owning client
    pub fn modify<B: PhysicsBackend>(
        &mut self,
        registry: &mut ActorRegistry<B>,
        diff: &EntityModified,
    ) -> PhysicsResult<()> {
        if diff.is_teleport() {
            self.teleport = self.teleport.wrapping_add(1);
        }
        if let Some(p) = diff.p {
            self.position.push(p, self.teleport);
        }
        if let Some(q) = diff.q {
            self.rotation.push(q.normalize(), self.teleport);
        }
        if let Some(m) = diff.m {
            match Mode::from_u8(m) {
                Some(mode) => self.mode = mode,
                None => warn!(player = %self.id, mode = m, "ignoring unknown locomotion mode"),
            }
        }
        if let Some(a) = diff.a {
            self.axis = a;
        }
        if let Some(g) = diff.g {
            self.gaze = g;
        }
        if let Some(e) = &diff.e {
            self.emote = e.clone();
        }
        if let Some(effect) = &diff.ef {
            self.effect.replace(effect.clone());
            // anchored players ride their anchor and stop colliding
            let active = self.effect.anchor_id().is_none();
            if active != self.body_active {
                registry.set_simulation_enabled(self.body, active)?;
                self.body_active = active;
            }
        }
        Ok(())
    }

    /// Advance the jitter buffers and drive the capsule toward the result
    pub fn update<B: PhysicsBackend>(
        &mut self,
        registry: &mut ActorRegistry<B>,
        anchors: &Anchors,
        dt: f32,
    ) -> PhysicsResult<()> {
        if self.anchor(anchors).is_some() {
            return Ok(());
        }
        let position = self.position.update(dt);
        let rotation = self.rotation.update(dt);
        self.base.borrow_mut().set_world_pose(position, rotation);
        registry.set_kinematic_target(self.body, Pose::from_position(position))
    }

    pub fn late_update(&mut self, anchors: &Anchors) {
        let Some(anchor) = self.anchor(anchors) else {
            return;
        };
        self.position.snap();
        self.rotation.snap();
        let pinned = Pose::from_matrix(&anchor);
        self.base
            .borrow_mut()
            .set_world_pose(pinned.position, pinned.rotation);
    }

    pub fn destroy<B: PhysicsBackend>(mut self, registry: &mut ActorRegistry<B>) -> PhysicsResult<()> {
        self.effect.end();
        debug!(player = %self.id, "removed remote player");
        registry.destroy(self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_net::Effect;
    use drift_physics::mock::MockBackend;
    use glam::Quat;

    fn spawn(registry: &mut ActorRegistry<MockBackend>) -> RemotePlayer {
        RemotePlayer::spawn(
            registry,
            EntityId::new(),
            Pose::IDENTITY,
            &LocomotionConfig::default(),
            &NetworkConfig::default(),
            false,
        )
        .unwrap()
    }

    fn moved(id: EntityId, p: Vec3) -> EntityModified {
        let mut diff = EntityModified::new(id);
        diff.p = Some(p);
        diff
    }

    #[test]
    fn renders_behind_the_latest_snapshot() {
        let mut registry = ActorRegistry::new(MockBackend::new());
        let anchors = Anchors::new();
        let mut remote = spawn(&mut registry);
        let id = remote.id();

        remote.modify(&mut registry, &moved(id, Vec3::ZERO)).unwrap();
        remote.update(&mut registry, &anchors, 0.125).unwrap();
        remote.modify(&mut registry, &moved(id, Vec3::new(1.0, 0.0, 0.0))).unwrap();
        // 0.25 minus the 0.1875 delay lands halfway between the samples
        remote.update(&mut registry, &anchors, 0.125).unwrap();
        assert!((remote.pose().position.x - 0.5).abs() < 1e-4);

        // the capsule follows on the next step
        registry.step_end(0.02);
        assert!((registry.pose(remote.body()).unwrap().position.x - 0.5).abs() < 1e-4);
    }

    #[test]
    fn teleport_discards_history() {
        let mut registry = ActorRegistry::new(MockBackend::new());
        let anchors = Anchors::new();
        let mut remote = spawn(&mut registry);
        let id = remote.id();
        remote.modify(&mut registry, &moved(id, Vec3::ZERO)).unwrap();
        remote.update(&mut registry, &anchors, 0.1).unwrap();

        let mut jump = moved(id, Vec3::new(50.0, 0.0, 0.0));
        jump.q = Some(Quat::from_rotation_y(1.0));
        jump.t = Some(true);
        remote.modify(&mut registry, &jump).unwrap();
        remote.update(&mut registry, &anchors, 0.0).unwrap();
        let pose = remote.pose();
        assert!((pose.position - Vec3::new(50.0, 0.0, 0.0)).length() < 1e-4);
        assert!(pose.rotation.angle_between(Quat::from_rotation_y(1.0)) < 1e-4);
    }

    #[test]
    fn applies_animation_fields() {
        let mut registry = ActorRegistry::new(MockBackend::new());
        let mut remote = spawn(&mut registry);
        let mut diff = EntityModified::new(remote.id());
        diff.m = Some(Mode::Run.as_u8());
        diff.a = Some(Vec3::NEG_Z);
        diff.g = Some(Vec3::X);
        diff.e = Some(Some("wave".into()));
        remote.modify(&mut registry, &diff).unwrap();
        assert_eq!(remote.mode(), Mode::Run);
        assert_eq!(remote.axis(), Vec3::NEG_Z);
        assert_eq!(remote.gaze(), Vec3::X);
        assert_eq!(remote.emote(), Some("wave"));

        let mut bogus = EntityModified::new(remote.id());
        bogus.m = Some(42);
        remote.modify(&mut registry, &bogus).unwrap();
        assert_eq!(remote.mode(), Mode::Run);
    }

    #[test]
    fn anchored_remote_rides_the_anchor() {
        let mut registry = ActorRegistry::new(MockBackend::new());
        let mut anchors = Anchors::new();
        anchors.set("kart", Mat4::from_translation(Vec3::new(2.0, 1.0, -3.0)));
        let mut remote = spawn(&mut registry);

        let mut diff = EntityModified::new(remote.id());
        diff.ef = Some(Some(Effect {
            anchor_id: Some("kart".into()),
            ..Default::default()
        }));
        remote.modify(&mut registry, &diff).unwrap();
        let body = registry.body(remote.body()).unwrap();
        assert!(!registry.backend().state(body).unwrap().enabled);

        remote
            .modify(&mut registry, &moved(remote.id(), Vec3::new(9.0, 9.0, 9.0)))
            .unwrap();
        remote.update(&mut registry, &anchors, 1.0).unwrap();
        remote.late_update(&anchors);
        assert!((remote.pose().position - Vec3::new(2.0, 1.0, -3.0)).length() < 1e-5);

        let mut clear = EntityModified::new(remote.id());
        clear.ef = Some(None);
        remote.modify(&mut registry, &clear).unwrap();
        assert!(registry.backend().state(body).unwrap().enabled);
    }
}
