//! Drift - headless locomotion and replication demo
//!
//! Runs two worlds side by side over rapier: a host that owns a walking,
//! jumping player and a peer that sees it as a remote player through a
//! loopback JSON link with random jitter.

mod settings;

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{Context, Result};
use drift_core::{EntityId, Pose};
use drift_game::{InputAction, InputHandler, InputState, World};
use drift_net::{Outbox, Packet};
use drift_physics::{
    ActorDesc, ActorId, BodyDesc, Geometry, Layer, PhysicsBackend, RapierBackend, ShapeDesc,
};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use settings::{DemoSettings, Settings};

/// Packets in flight, delivered once their arrival time has passed
struct Loopback {
    in_flight: VecDeque<(f32, String)>,
    rng: StdRng,
    now: f32,
    latency: f32,
    jitter: f32,
}

impl Loopback {
    fn new(settings: &DemoSettings) -> Self {
        Self {
            in_flight: VecDeque::new(),
            rng: StdRng::seed_from_u64(settings.seed),
            now: 0.0,
            latency: settings.latency,
            jitter: settings.jitter,
        }
    }

    /// Packets due by `now`, in send order
    fn deliver(&mut self, now: f32) -> Vec<Packet> {
        self.now = now;
        let mut due = Vec::new();
        // relays keep order per sender, so a late packet holds back later ones
        while let Some((at, _)) = self.in_flight.front() {
            if *at > now {
                break;
            }
            let Some((_, text)) = self.in_flight.pop_front() else {
                break;
            };
            match Packet::decode(&text) {
                Ok(packet) => due.push(packet),
                Err(e) => warn!("Dropping undecodable packet: {}", e),
            }
        }
        due
    }
}

impl Outbox for Loopback {
    fn send(&mut self, packet: Packet) {
        match packet.encode() {
            Ok(text) => {
                let delay = self.latency + self.rng.gen_range(0.0..=self.jitter);
                debug!(bytes = text.len(), delay, "sending packet");
                self.in_flight.push_back((self.now + delay, text));
            }
            Err(e) => warn!("Failed to encode packet: {}", e),
        }
    }
}

/// Static floor plus a trigger pad that logs who steps on it
fn build_level<B: PhysicsBackend>(world: &mut World<B>) -> Result<Rc<Cell<u32>>> {
    let registry = &mut world.registry;
    let floor = registry
        .backend_mut()
        .create_body(&BodyDesc::fixed(Pose::from_position(Vec3::new(0.0, -0.5, 0.0))));
    registry.backend_mut().attach_shape(
        floor,
        &ShapeDesc::new(
            Geometry::Box { half_extents: Vec3::new(50.0, 0.5, 50.0) },
            Layer::Environment,
        ),
    )?;
    registry.add_actor(floor, ActorDesc::new().tag("floor"))?;

    let visits = Rc::new(Cell::new(0));
    let counter = visits.clone();
    let pad = registry
        .backend_mut()
        .create_body(&BodyDesc::fixed(Pose::from_position(Vec3::new(0.0, 0.5, -4.0))));
    registry.backend_mut().attach_shape(
        pad,
        &ShapeDesc::new(
            Geometry::Box { half_extents: Vec3::new(1.0, 0.5, 1.0) },
            Layer::Environment,
        )
        .trigger(),
    )?;
    registry.add_actor(
        pad,
        ActorDesc::new().tag("pad").on_trigger_enter(move |event| {
            counter.set(counter.get() + 1);
            info!(player = ?event.player_id, "Player entered the pad");
            Ok(())
        }),
    )?;
    Ok(visits)
}

/// A kinematic platform bobbing up and down in front of the spawn point
fn build_elevator<B: PhysicsBackend>(world: &mut World<B>) -> Result<ActorId> {
    let registry = &mut world.registry;
    let body = registry
        .backend_mut()
        .create_body(&BodyDesc::kinematic(Pose::from_position(Vec3::new(0.0, 0.0, -10.0))));
    registry.backend_mut().attach_shape(
        body,
        &ShapeDesc::new(
            Geometry::Box { half_extents: Vec3::new(1.5, 0.25, 1.5) },
            Layer::Environment,
        ),
    )?;
    Ok(registry.add_actor(body, ActorDesc::new().tag("elevator"))?)
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    info!("Starting Drift demo...");
    let settings = Settings::load_or_init();
    let config = settings.world.clone();

    let mut host = World::new(RapierBackend::with_config(config.physics.clone()), config.clone());
    let mut peer = World::new(RapierBackend::with_config(config.physics.clone()), config);
    let visits = build_level(&mut host).context("Failed to build host level")?;
    build_level(&mut peer).context("Failed to build peer level")?;
    let elevator = build_elevator(&mut host).context("Failed to build elevator")?;

    let id = EntityId::new();
    host.spawn_local(id, Pose::IDENTITY)
        .context("Failed to spawn local player")?;

    let mut input = InputHandler::new();
    input.mouse_sensitivity = settings.input.mouse_sensitivity;
    input.invert_y = settings.input.invert_y;
    let mut idle = InputState::new();
    let mut link = Loopback::new(&settings.demo);

    let delta = 1.0 / settings.demo.frame_rate.max(1.0);
    let mut clock = 0.0;
    for frame in 0..settings.demo.frames {
        clock += delta;

        // walk forward for two seconds, hop once along the way, then idle
        input.set_action(InputAction::MoveForward, clock < 2.0);
        input.set_action(InputAction::Jump, frame == 45);

        let lift = Vec3::new(0.0, (clock * 0.8).sin().abs() * 2.0, -10.0);
        host.registry
            .set_kinematic_target(elevator, Pose::from_position(lift))
            .context("Failed to move elevator")?;

        link.now = clock;
        host.frame(delta, &mut input.state, &mut link);
        input.end_frame();

        for packet in link.deliver(clock) {
            peer.receive(&packet).context("Failed to apply packet")?;
        }
        peer.frame(delta, &mut idle, &mut Vec::new());

        if frame % 60 == 0 {
            if let (Some(local), Some(remote)) = (host.local(), peer.remote(id)) {
                let error = local.pose().position.distance(remote.pose().position);
                info!(
                    "t={:.2}s mode={:?} position={:?} remote lag={:.3}",
                    clock,
                    local.mode(),
                    local.pose().position,
                    error
                );
            }
        }
    }

    host.teleport(Vec3::new(0.0, 0.0, 5.0), Some(0.0), &mut link)
        .context("Failed to teleport")?;
    for packet in link.deliver(f32::INFINITY) {
        peer.receive(&packet).context("Failed to apply packet")?;
    }
    peer.frame(delta, &mut idle, &mut Vec::new());
    if let Some(remote) = peer.remote(id) {
        info!("Remote after teleport: {:?}", remote.pose().position);
    }

    info!("Pad visits: {}", visits.get());
    info!("Drift demo finished");
    Ok(())
}
