//! Core value types shared by the physics, network, and game crates

use std::fmt;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for networked entities (players, apps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Create a new random entity ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an entity ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A rigid pose: world position plus unit orientation, no scale.
///
/// This is what physics bodies report and what interpolation blends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Pose with identity rotation
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Extract the rigid part of a matrix (scale is discarded)
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (_, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation: rotation.normalize(),
        }
    }

    /// Homogeneous matrix with unit scale
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// Position lerp plus rotation slerp
    pub fn interpolate(a: &Pose, b: &Pose, t: f32) -> Pose {
        Pose {
            position: a.position.lerp(b.position, t),
            rotation: a.rotation.slerp(b.rotation, t),
        }
    }

    /// Whether every component is finite
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }
}

/// Transform component representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform at the given position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a new transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Compute the local matrix for this transform
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Overwrite from a matrix, keeping whatever scale it carries
    pub fn set_from_matrix(&mut self, matrix: &Mat4) {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        self.position = position;
        self.rotation = rotation.normalize();
        self.scale = scale;
    }

    /// The rigid part of this transform
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    /// Get the forward direction (negative Z in local space)
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    /// Get the right direction (positive X in local space)
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Get the up direction (positive Y in local space)
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_matrix() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let matrix = transform.matrix();
        let translation = matrix.col(3).truncate();
        assert_eq!(translation, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_pose_matrix_roundtrip_drops_scale() {
        let rotation = Quat::from_rotation_y(0.7);
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            rotation,
            Vec3::new(4.0, 0.0, -1.0),
        );
        let pose = Pose::from_matrix(&matrix);
        assert!((pose.position - Vec3::new(4.0, 0.0, -1.0)).length() < 1e-5);
        assert!(pose.rotation.angle_between(rotation) < 1e-4);
    }

    #[test]
    fn test_pose_interpolate_midpoint() {
        let a = Pose::from_position(Vec3::ZERO);
        let b = Pose::new(Vec3::new(2.0, 0.0, 0.0), Quat::from_rotation_y(1.0));
        let mid = Pose::interpolate(&a, &b, 0.5);
        assert!((mid.position.x - 1.0).abs() < 1e-6);
        assert!((mid.rotation.angle_between(Quat::IDENTITY) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_entity_id_display_is_uuid() {
        let uuid = Uuid::new_v4();
        let id = EntityId::from_uuid(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
        assert_ne!(EntityId::new(), id);
    }
}
