use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the client that controls an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Directory handle of the entity an owner controls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorHandle(pub u32);

/// Positional and rotational state of a character.
///
/// The camera rotation is local to the body: the body carries yaw, the camera
/// carries pitch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub body_rotation: Quat,
    pub camera_rotation: Quat,
    pub position: Vec3,
}

impl Pose {
    pub fn new(body_rotation: Quat, camera_rotation: Quat, position: Vec3) -> Self {
        Self {
            body_rotation,
            camera_rotation,
            position,
        }
    }

    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..default()
        }
    }

    /// Where an owner's entity appears on first contact. Client and authority
    /// must agree on it.
    pub fn spawn_for(owner: OwnerId) -> Self {
        Self::at(Vec3::new(owner.0 as f32 * 2.0, 0.0, 0.0))
    }

    /// Compare two poses, either exactly (`tolerance == 0`) or within a
    /// per-component tolerance.
    pub fn matches(&self, other: &Pose, tolerance: f32) -> bool {
        if tolerance <= 0.0 {
            return self == other;
        }

        self.position.abs_diff_eq(other.position, tolerance)
            && self.body_rotation.abs_diff_eq(other.body_rotation, tolerance)
            && self.camera_rotation.abs_diff_eq(other.camera_rotation, tolerance)
    }

    /// Blend towards `other`. `t` is not clamped, values above 1 extrapolate.
    pub fn blend(&self, other: &Pose, t: f32) -> Pose {
        Pose {
            body_rotation: self.body_rotation.slerp(other.body_rotation, t),
            camera_rotation: self.camera_rotation.slerp(other.camera_rotation, t),
            position: self.position.lerp(other.position, t),
        }
    }
}
