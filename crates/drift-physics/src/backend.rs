//! The narrow seam between the actor registry and a rigid-body engine.
//!
//! The registry never talks to rapier directly. It creates bodies, steps the
//! simulation, and runs queries through [`PhysicsBackend`], which keeps the
//! contact bookkeeping testable against [`crate::mock::MockBackend`].

use std::fmt::Debug;
use std::hash::Hash;

use drift_core::{Pose, Vec3};
use serde::{Deserialize, Serialize};

use crate::layers::{Layer, LayerMask};
use crate::PhysicsResult;

/// How a body is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyKind {
    /// Never moves
    Static,
    /// Posed externally through kinematic targets
    Kinematic,
    /// Driven by forces and the solver
    Dynamic,
}

/// Body creation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub pose: Pose,
    /// Total mass for dynamic bodies; `None` derives it from shape density
    pub mass: Option<f32>,
    /// Lock rotation about X and Z so the body stays upright
    pub upright: bool,
    /// Apply world gravity
    pub gravity: bool,
    /// Continuous collision detection
    pub ccd: bool,
}

impl BodyDesc {
    pub fn new(kind: BodyKind, pose: Pose) -> Self {
        Self {
            kind,
            pose,
            mass: None,
            upright: false,
            gravity: true,
            ccd: false,
        }
    }

    pub fn fixed(pose: Pose) -> Self {
        Self::new(BodyKind::Static, pose)
    }

    pub fn kinematic(pose: Pose) -> Self {
        Self::new(BodyKind::Kinematic, pose)
    }

    pub fn dynamic(pose: Pose) -> Self {
        Self::new(BodyKind::Dynamic, pose)
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn upright(mut self) -> Self {
        self.upright = true;
        self
    }

    pub fn without_gravity(mut self) -> Self {
        self.gravity = false;
        self
    }

    pub fn with_ccd(mut self) -> Self {
        self.ccd = true;
        self
    }
}

/// Collision geometry, expressed in the shape's local frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    /// Y-aligned capsule; `half_height` is half the distance between the
    /// centres of its end caps
    Capsule { radius: f32, half_height: f32 },
}

/// How two touching materials combine their coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CombineMode {
    #[default]
    Average,
    Min,
    Max,
    Multiply,
}

/// Surface material values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialDesc {
    pub static_friction: f32,
    pub dynamic_friction: f32,
    pub restitution: f32,
    pub combine: CombineMode,
}

impl MaterialDesc {
    pub const fn new(static_friction: f32, dynamic_friction: f32, restitution: f32) -> Self {
        Self {
            static_friction,
            dynamic_friction,
            restitution,
            combine: CombineMode::Average,
        }
    }

    pub const fn with_combine(mut self, combine: CombineMode) -> Self {
        self.combine = combine;
        self
    }
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self::new(0.2, 0.2, 0.2)
    }
}

/// Shape creation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeDesc {
    pub geometry: Geometry,
    /// Offset from the body origin
    pub offset: Pose,
    pub layer: Layer,
    /// Groups this shape collides with
    pub mask: LayerMask,
    /// Triggers report overlaps instead of generating contacts
    pub trigger: bool,
    pub material: MaterialDesc,
}

impl ShapeDesc {
    pub fn new(geometry: Geometry, layer: Layer) -> Self {
        Self {
            geometry,
            offset: Pose::IDENTITY,
            layer,
            mask: layer.mask(false),
            trigger: false,
            material: MaterialDesc::default(),
        }
    }

    pub fn with_offset(mut self, offset: Pose) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_mask(mut self, mask: LayerMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_material(mut self, material: MaterialDesc) -> Self {
        self.material = material;
        self
    }

    pub fn trigger(mut self) -> Self {
        self.trigger = true;
        self
    }
}

/// Whether a touch started or ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TouchStatus {
    Found,
    Lost,
}

/// A single contact point between two bodies
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactPoint {
    pub position: Vec3,
    pub normal: Vec3,
    pub impulse: Vec3,
}

/// A contact pair reported during a simulation step
#[derive(Debug, Clone, Copy)]
pub struct ContactPair<'a, B> {
    pub body0: B,
    pub body1: B,
    pub status: TouchStatus,
    /// One of the shapes was removed during the step
    pub removed: bool,
    pub points: &'a [ContactPoint],
}

/// A trigger overlap change reported during a simulation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPair<B> {
    /// Body owning the trigger shape
    pub trigger: B,
    /// Body that entered or left it
    pub other: B,
    pub status: TouchStatus,
    pub removed: bool,
}

/// Receives contact and trigger events while the backend steps
pub trait SimulationEventSink<B> {
    fn on_contact(&mut self, pair: ContactPair<'_, B>);
    fn on_trigger(&mut self, pair: TriggerPair<B>);
}

/// Closest hit of a raycast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit<B> {
    pub body: B,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Closest hit of a shape sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepHit<B> {
    pub body: B,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// A rigid-body engine the registry can drive
pub trait PhysicsBackend {
    /// Opaque reference to a native body
    type Body: Copy + Eq + Hash + Debug;
    /// Native material handle
    type Material: Copy + Debug;

    fn create_body(&mut self, desc: &BodyDesc) -> Self::Body;
    fn attach_shape(&mut self, body: Self::Body, shape: &ShapeDesc) -> PhysicsResult<()>;
    fn remove_body(&mut self, body: Self::Body);
    fn body_kind(&self, body: Self::Body) -> Option<BodyKind>;

    fn create_material(&mut self, desc: &MaterialDesc) -> Self::Material;
    /// Apply a material to every shape on the body
    fn set_material(&mut self, body: Self::Body, material: Self::Material) -> PhysicsResult<()>;

    fn pose(&self, body: Self::Body) -> Option<Pose>;
    /// Teleport a body
    fn set_pose(&mut self, body: Self::Body, pose: Pose) -> PhysicsResult<()>;
    /// Pose a kinematic body reaches at the end of the next step
    fn set_kinematic_target(&mut self, body: Self::Body, pose: Pose) -> PhysicsResult<()>;

    fn linear_velocity(&self, body: Self::Body) -> Option<Vec3>;
    fn set_linear_velocity(&mut self, body: Self::Body, velocity: Vec3) -> PhysicsResult<()>;
    fn set_angular_velocity(&mut self, body: Self::Body, velocity: Vec3) -> PhysicsResult<()>;
    /// Continuous force for the next step only
    fn add_force(&mut self, body: Self::Body, force: Vec3) -> PhysicsResult<()>;
    fn add_force_at_point(&mut self, body: Self::Body, force: Vec3, point: Vec3)
        -> PhysicsResult<()>;

    /// Take a body out of the simulation without destroying it
    fn set_simulation_enabled(&mut self, body: Self::Body, enabled: bool) -> PhysicsResult<()>;

    /// Advance the simulation, reporting touch changes to `sink` before returning
    fn simulate(&mut self, dt: f32, sink: &mut dyn SimulationEventSink<Self::Body>);
    /// Bodies that moved during the last step
    fn active_bodies(&self, out: &mut Vec<Self::Body>);

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<RaycastHit<Self::Body>>;

    fn sweep_sphere(
        &self,
        radius: f32,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: LayerMask,
    ) -> Option<SweepHit<Self::Body>>;

    /// Collect every body with a shape overlapping the sphere
    fn overlap_sphere(
        &self,
        radius: f32,
        origin: Vec3,
        mask: LayerMask,
        out: &mut Vec<Self::Body>,
    );
}
