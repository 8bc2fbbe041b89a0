use crate::error::Result;
use crate::game_logic::{ActorHandle, OwnerId, Pose, RawInput};
use crate::prediction::StateSnapshot;
use bevy::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One tick of control input, stamped with the sequence index it was
/// predicted at.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct InputSample {
    pub look_delta: Vec2,
    pub move_axes: Vec2,
    pub jump: bool,
    pub sprint: bool,
    pub delta_time: f32,
    pub sequence_index: u64,
    pub owner_id: OwnerId,
}

impl InputSample {
    pub fn from_raw(raw: RawInput, delta_time: f32, sequence_index: u64, owner_id: OwnerId) -> Self {
        Self {
            look_delta: raw.look_delta,
            move_axes: raw.move_axes,
            jump: raw.jump,
            sprint: raw.sprint,
            delta_time,
            sequence_index,
            owner_id,
        }
    }
}

/// Reduced pose broadcast to everyone except the owner. Only ever used for
/// interpolation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct RemoteActorInfo {
    pub body_rotation: Quat,
    pub camera_rotation: Quat,
    pub position: Vec3,
    pub actor_handle: ActorHandle,
    pub owner_id: OwnerId,
}

impl RemoteActorInfo {
    pub fn from_pose(pose: &Pose, actor_handle: ActorHandle, owner_id: OwnerId) -> Self {
        Self {
            body_rotation: pose.body_rotation,
            camera_rotation: pose.camera_rotation,
            position: pose.position,
            actor_handle,
            owner_id,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.body_rotation, self.camera_rotation, self.position)
    }
}

/// Messages from clients
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    PlayerInput {
        sample: InputSample,
        info: RemoteActorInfo,
    },
}

/// Messages from the authority
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    Snapshot { snapshot: StateSnapshot },
    RemoteActor { info: RemoteActorInfo },
}

/// Encode a message as one newline-terminated JSON line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    Ok(serde_json::to_string(message)? + "\n")
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T> {
    Ok(serde_json::from_str(line.trim_end())?)
}
