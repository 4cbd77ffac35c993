//! Frame scheduling for everything that moves
//!
//! A frame runs the fixed steps the accumulator owes (local locomotion, then
//! the simulation), blends interpolated actors, runs render-rate updates and
//! finally the late updates that pin anchored players and move the camera.

use std::collections::HashMap;

use drift_core::{EntityId, GameTime, Pose, TimeConfig};
use drift_net::{EntityModified, NetworkConfig, Outbox, Packet};
use drift_physics::{ActorRegistry, PhysicsBackend, PhysicsConfig, PhysicsResult};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::anchors::Anchors;
use crate::camera::CameraConfig;
use crate::input::InputState;
use crate::player::{LocalPlayer, LocomotionConfig, PlayerContext, RemotePlayer};

/// Everything a world needs to be tuned
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub time: TimeConfig,
    pub physics: PhysicsConfig,
    pub network: NetworkConfig,
    pub locomotion: LocomotionConfig,
    pub camera: CameraConfig,
}

pub struct World<B: PhysicsBackend> {
    pub registry: ActorRegistry<B>,
    pub time: GameTime,
    pub anchors: Anchors,
    /// Build mode; enables flying for the local player
    pub builder: bool,
    config: WorldConfig,
    local: Option<LocalPlayer>,
    remotes: HashMap<EntityId, RemotePlayer>,
    /// Fixed steps run by the last frame
    steps: u32,
}

impl<B: PhysicsBackend> World<B> {
    pub fn new(backend: B, config: WorldConfig) -> Self {
        Self {
            registry: ActorRegistry::new(backend),
            time: GameTime::new(config.time.clone()),
            anchors: Anchors::new(),
            builder: false,
            config,
            local: None,
            remotes: HashMap::new(),
            steps: 0,
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn local(&self) -> Option<&LocalPlayer> {
        self.local.as_ref()
    }

    pub fn local_mut(&mut self) -> Option<&mut LocalPlayer> {
        self.local.as_mut()
    }

    pub fn remote(&self, id: EntityId) -> Option<&RemotePlayer> {
        self.remotes.get(&id)
    }

    pub fn remotes(&self) -> impl Iterator<Item = &RemotePlayer> {
        self.remotes.values()
    }

    pub fn steps_last_frame(&self) -> u32 {
        self.steps
    }

    /// Create the local player, replacing any previous one
    pub fn spawn_local(&mut self, id: EntityId, pose: Pose) -> PhysicsResult<&mut LocalPlayer> {
        if let Some(previous) = self.local.take() {
            previous.destroy(&mut self.registry)?;
        }
        let player = LocalPlayer::spawn(
            &mut self.registry,
            id,
            pose,
            self.config.locomotion.clone(),
            self.config.camera.clone(),
            &self.config.network,
            self.config.physics.player_collision,
        )?;
        Ok(self.local.insert(player))
    }

    pub fn spawn_remote(&mut self, id: EntityId, pose: Pose) -> PhysicsResult<&mut RemotePlayer> {
        if let Some(previous) = self.remotes.remove(&id) {
            previous.destroy(&mut self.registry)?;
        }
        let remote = RemotePlayer::spawn(
            &mut self.registry,
            id,
            pose,
            &self.config.locomotion,
            &self.config.network,
            self.config.physics.player_collision,
        )?;
        Ok(self.remotes.entry(id).or_insert(remote))
    }

    /// Teleport the local player, if there is one
    pub fn teleport(
        &mut self,
        position: Vec3,
        rotation_y: Option<f32>,
        outbox: &mut dyn Outbox,
    ) -> PhysicsResult<()> {
        match self.local.as_mut() {
            Some(local) => local.teleport(&mut self.registry, position, rotation_y, outbox),
            None => Ok(()),
        }
    }

    /// Apply a packet from the relay.
    ///
    /// Diffs for an unknown entity spawn a remote player where the diff
    /// says it is.
    pub fn receive(&mut self, packet: &Packet) -> PhysicsResult<()> {
        match packet {
            Packet::EntityModified(diff) => self.apply(diff),
            Packet::EntityRemoved(id) => self.remove(*id),
        }
    }

    fn apply(&mut self, diff: &EntityModified) -> PhysicsResult<()> {
        if let Some(local) = self.local.as_mut().filter(|local| local.id() == diff.id) {
            local.modify(diff);
            return Ok(());
        }
        if !self.remotes.contains_key(&diff.id) {
            let pose = Pose::new(
                diff.p.unwrap_or(Vec3::ZERO),
                diff.q.map_or(Quat::IDENTITY, Quat::normalize),
            );
            self.spawn_remote(diff.id, pose)?;
        }
        match self.remotes.get_mut(&diff.id) {
            Some(remote) => remote.modify(&mut self.registry, diff),
            None => Ok(()),
        }
    }

    pub fn remove(&mut self, id: EntityId) -> PhysicsResult<()> {
        if let Some(remote) = self.remotes.remove(&id) {
            return remote.destroy(&mut self.registry);
        }
        if self.local.as_ref().is_some_and(|local| local.id() == id) {
            if let Some(local) = self.local.take() {
                local.destroy(&mut self.registry)?;
            }
            return Ok(());
        }
        debug!(entity = %id, "removal for unknown entity");
        Ok(())
    }

    /// Advance by one render frame of `raw_delta` seconds
    pub fn frame(&mut self, raw_delta: f32, input: &mut InputState, outbox: &mut dyn Outbox) {
        self.time.update(raw_delta);
        self.steps = self.time.fixed_steps();
        let dt = self.time.fixed_delta();

        if self.steps > 0 {
            self.registry.step_begin();
        }
        for _ in 0..self.steps {
            if let Some(local) = self.local.as_mut() {
                let mut ctx = PlayerContext {
                    registry: &mut self.registry,
                    anchors: &self.anchors,
                    builder: self.builder,
                    time: self.time.elapsed(),
                };
                if let Err(err) = local.fixed_update(&mut ctx, dt) {
                    error!(player = %local.id(), %err, "local fixed update failed");
                }
            }
            self.registry.step_end(dt);
        }
        self.registry.interpolate(self.time.fixed_interpolation());

        let delta = self.time.delta_time;
        if let Some(local) = self.local.as_mut() {
            local.update(&self.anchors, input, delta, outbox);
        }
        for remote in self.remotes.values_mut() {
            if let Err(err) = remote.update(&mut self.registry, &self.anchors, delta) {
                warn!(player = %remote.id(), %err, "remote update failed");
            }
        }

        if let Some(local) = self.local.as_mut() {
            let xr = input.xr.is_some();
            if let Err(err) = local.late_update(&mut self.registry, &self.anchors, xr, delta) {
                warn!(player = %local.id(), %err, "local late update failed");
            }
        }
        for remote in self.remotes.values_mut() {
            remote.late_update(&self.anchors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_net::Effect;
    use drift_physics::mock::MockBackend;
    use drift_physics::{ActorDesc, BodyDesc, Geometry, Layer, ShapeDesc};

    fn world() -> World<MockBackend> {
        let config = WorldConfig {
            time: TimeConfig {
                fixed_timestep: 0.25,
                max_delta_time: 1.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut world = World::new(MockBackend::new(), config);
        let floor = world
            .registry
            .backend_mut()
            .create_body(&BodyDesc::fixed(Pose::from_position(Vec3::new(0.0, -0.5, 0.0))));
        world
            .registry
            .backend_mut()
            .attach_shape(
                floor,
                &ShapeDesc::new(
                    Geometry::Box { half_extents: Vec3::new(10.0, 0.5, 10.0) },
                    Layer::Environment,
                ),
            )
            .unwrap();
        world.registry.add_actor(floor, ActorDesc::new()).unwrap();
        world
    }

    #[test]
    fn runs_the_fixed_steps_each_frame_owes() {
        let mut world = world();
        world.spawn_local(EntityId::new(), Pose::IDENTITY).unwrap();
        let mut input = InputState::new();
        let mut outbox = Vec::new();

        world.frame(0.375, &mut input, &mut outbox);
        assert_eq!(world.steps_last_frame(), 1);
        assert_eq!(world.time.fixed_interpolation(), 0.5);

        world.frame(0.375, &mut input, &mut outbox);
        assert_eq!(world.steps_last_frame(), 2);
        assert_eq!(world.time.fixed_interpolation(), 0.0);

        world.frame(0.125, &mut input, &mut outbox);
        assert_eq!(world.steps_last_frame(), 0);
        assert!(world.local().unwrap().state().grounded);
    }

    #[test]
    fn teleport_reaches_a_peer_through_the_wire() {
        let mut sender = world();
        let mut receiver = world();
        let id = EntityId::new();
        sender.spawn_local(id, Pose::IDENTITY).unwrap();

        let mut outbox = Vec::new();
        sender
            .teleport(Vec3::new(3.0, 0.0, 4.0), None, &mut outbox)
            .unwrap();
        assert_eq!(outbox.len(), 1);
        for packet in &outbox {
            let text = packet.encode().unwrap();
            receiver.receive(&Packet::decode(&text).unwrap()).unwrap();
        }

        let mut input = InputState::new();
        receiver.frame(0.0, &mut input, &mut Vec::new());
        let remote = receiver.remote(id).unwrap();
        assert!((remote.pose().position - Vec3::new(3.0, 0.0, 4.0)).length() < 1e-4);
        assert!(receiver.local().is_none());
    }

    #[test]
    fn removal_destroys_the_proxy() {
        let mut world = world();
        let id = EntityId::new();
        let mut diff = EntityModified::new(id);
        diff.p = Some(Vec3::new(1.0, 0.0, 0.0));
        world.receive(&Packet::EntityModified(diff)).unwrap();
        let body = world.remote(id).unwrap().body();
        assert!(world.registry.contains(body));

        world.receive(&Packet::EntityRemoved(id)).unwrap();
        assert!(world.remote(id).is_none());
        assert!(!world.registry.contains(body));
        // unknown ids are ignored
        world.receive(&Packet::EntityRemoved(id)).unwrap();
    }

    #[test]
    fn diffs_for_the_local_player_apply_the_effect() {
        let mut world = world();
        let id = EntityId::new();
        world.spawn_local(id, Pose::IDENTITY).unwrap();

        let mut diff = EntityModified::new(id);
        diff.ef = Some(Some(Effect {
            freeze: true,
            ..Default::default()
        }));
        world.receive(&Packet::EntityModified(diff)).unwrap();
        assert!(world.local().unwrap().effect().is_some_and(|e| e.freeze));
        assert_eq!(world.remotes().count(), 0);
    }
}
