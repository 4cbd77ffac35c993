//! Camera controller with pointer, touch, and XR look plus zoom

use drift_physics::{ActorRegistry, Layer, PhysicsBackend};
use glam::{EulerRot, Quat, Vec3};

use crate::input::InputState;

use super::CameraConfig;

const FORWARD: Vec3 = Vec3::NEG_Z;

/// Camera controller
///
/// `yaw`/`pitch` are the look the player asked for. The follow target sits
/// at the player's head (offset over the shoulder in third person) and the
/// rendered pose eases toward it each late update.
#[derive(Debug, Clone)]
pub struct CameraController {
    /// Configuration
    pub config: CameraConfig,
    /// Yaw rotation in radians (horizontal)
    pub yaw: f32,
    /// Pitch rotation in radians (vertical)
    pub pitch: f32,
    /// Orbit distance behind the pivot; 0 in first person
    pub zoom: f32,
    first_person: bool,
    xr_active: bool,
    did_snap_turn: bool,
    /// Where the pivot wants to be this frame
    target: Vec3,
    /// Rendered pivot position and orientation
    position: Vec3,
    rotation: Quat,
    /// Rendered eye, behind the pivot in third person
    eye: Vec3,
}

impl CameraController {
    /// Create a camera behind a player standing at `base`
    pub fn new(config: CameraConfig, base: Vec3, yaw: f32) -> Self {
        let mut camera = Self {
            yaw,
            pitch: config.initial_pitch.to_radians(),
            zoom: config.initial_zoom,
            first_person: false,
            xr_active: false,
            did_snap_turn: false,
            target: Vec3::ZERO,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            eye: Vec3::ZERO,
            config,
        };
        camera.snap(base, None);
        camera
    }

    /// The rotation quaternion the player is looking with
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// Get the camera's forward direction
    pub fn forward(&self) -> Vec3 {
        self.rotation() * FORWARD
    }

    /// Rendered pivot position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Rendered eye position, as of the last [`collide`](Self::collide)
    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    /// Rendered orientation
    pub fn rendered_rotation(&self) -> Quat {
        self.rotation
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn is_first_person(&self) -> bool {
        self.first_person
    }

    /// Integrate look input into yaw and pitch
    pub fn look(&mut self, input: &InputState, dt: f32) {
        if let Some(xr) = input.xr {
            // the headset owns pitch; only snap turns accumulate here
            self.pitch = 0.0;
            let snap = self.config.snap_turn.to_radians();
            let x = xr.right_stick.x;
            if x == 0.0 && self.did_snap_turn {
                self.did_snap_turn = false;
            } else if x > 0.0 && !self.did_snap_turn {
                self.yaw -= snap;
                self.did_snap_turn = true;
            } else if x < 0.0 && !self.did_snap_turn {
                self.yaw += snap;
                self.did_snap_turn = true;
            }
            return;
        }

        if input.cursor_captured {
            let speed = self.config.pointer_look_speed * dt;
            self.pitch -= input.mouse_delta.y * speed;
            self.yaw -= input.mouse_delta.x * speed;
        } else if let Some(pan) = input.pan {
            let speed = self.config.pan_look_speed * dt;
            self.pitch -= pan.delta.y * speed;
            self.yaw -= pan.delta.x * speed;
        }
        self.set_pitch(self.pitch);
    }

    /// Apply scroll zoom and the first/third person transitions
    pub fn zoom(&mut self, input: &InputState) {
        let xr = input.xr.is_some();
        if !xr {
            self.zoom -= input.scroll_delta * self.config.zoom_speed;
            self.zoom = self.zoom.clamp(self.config.min_zoom, self.config.max_zoom);
        }

        // XR is always first person
        if xr && !self.xr_active {
            self.zoom = 0.0;
            self.xr_active = true;
        } else if !xr && self.xr_active {
            self.zoom = 1.0;
            self.xr_active = false;
        }

        if self.zoom < 1.0 && !self.first_person {
            self.zoom = 0.0;
            self.first_person = true;
        } else if self.zoom > 0.0 && self.first_person {
            self.zoom = 1.0;
            self.first_person = false;
        }
    }

    /// Ease the rendered pose toward the player at `base`
    pub fn follow(&mut self, base: Vec3, xr: bool, dt: f32) {
        let mut target = base;
        if !xr {
            target.y += self.config.cam_height;
            if !self.first_person {
                let right = self.forward().cross(Vec3::Y).normalize_or_zero();
                target += right * self.config.shoulder_offset;
            }
        }
        self.target = target;

        if xr {
            self.position = target;
            self.rotation = self.rotation();
        } else {
            let t = 1.0 - (1.0 - self.config.follow_smoothing).powf(dt * 60.0);
            self.position = self.position.lerp(target, t);
            self.rotation = self.rotation.slerp(self.rotation(), t);
        }
    }

    /// Jump straight to the player, optionally facing a new yaw
    pub fn snap(&mut self, base: Vec3, yaw: Option<f32>) {
        if let Some(yaw) = yaw {
            self.yaw = yaw;
        }
        self.target = base + Vec3::Y * self.config.cam_height;
        self.position = self.target;
        self.rotation = self.rotation();
        self.eye = self.position;
    }

    /// Place the eye behind the pivot, pulled in front of any camera-layer
    /// geometry in between
    pub fn collide<B: PhysicsBackend>(&mut self, registry: &ActorRegistry<B>) {
        if self.first_person || self.zoom <= 0.0 {
            self.eye = self.position;
            return;
        }
        let back = self.rotation * Vec3::Z;
        let radius = self.config.collision_radius;
        let hit = registry
            .raycast(self.position, back, self.zoom + radius, Layer::Camera.mask(false))
            .ok()
            .flatten();
        let distance = match hit {
            Some(hit) => (hit.distance - radius).max(0.0),
            None => self.zoom,
        };
        self.eye = self.position + back * distance;
    }

    /// Set the camera pitch, clamped to the configured range
    pub fn set_pitch(&mut self, pitch: f32) {
        let pitch_min = self.config.pitch_min.to_radians();
        let pitch_max = self.config.pitch_max.to_radians();
        self.pitch = pitch.clamp(pitch_min, pitch_max);
    }
}
