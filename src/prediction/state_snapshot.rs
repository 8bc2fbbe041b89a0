use crate::game_logic::{ActorHandle, OwnerId, Pose};
use crate::protocol::RemoteActorInfo;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Pose of one owner's entity at a specific tick
///
/// Used for:
/// - Storing predicted states for comparison with the authority
/// - The authoritative correction sent back to the owner
/// - Re-simulation starting point during reconciliation
///
/// `sequence_index` is `None` for captures that are not tied to a recorded
/// input (throwaway captures, empty history slots).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct StateSnapshot {
    pub body_rotation: Quat,
    pub camera_rotation: Quat,
    pub position: Vec3,
    pub sequence_index: Option<u64>,
    pub owner_id: OwnerId,
}

impl StateSnapshot {
    pub fn capture(pose: &Pose, sequence_index: Option<u64>, owner_id: OwnerId) -> Self {
        Self {
            body_rotation: pose.body_rotation,
            camera_rotation: pose.camera_rotation,
            position: pose.position,
            sequence_index,
            owner_id,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.body_rotation, self.camera_rotation, self.position)
    }

    /// Overwrite a pose with this snapshot
    pub fn apply_to(&self, pose: &mut Pose) {
        *pose = self.pose();
    }

    /// Field-by-field comparison of the pose part
    pub fn same_pose(&self, other: &StateSnapshot, tolerance: f32) -> bool {
        self.pose().matches(&other.pose(), tolerance)
    }

    /// Is this the entry recorded for `sequence_index` by `owner_id`?
    pub fn is_for(&self, sequence_index: u64, owner_id: OwnerId) -> bool {
        self.sequence_index == Some(sequence_index) && self.owner_id == owner_id
    }

    /// Reduced form broadcast to non-owners
    pub fn to_remote_info(&self, actor_handle: ActorHandle) -> RemoteActorInfo {
        RemoteActorInfo::from_pose(&self.pose(), actor_handle, self.owner_id)
    }

    /// Distance between two states (for logging correction size)
    pub fn distance_to(&self, other: &StateSnapshot) -> f32 {
        self.position.distance(other.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_calculation() {
        let a = StateSnapshot::capture(&Pose::at(Vec3::ZERO), Some(0), OwnerId(1));
        let b = StateSnapshot::capture(&Pose::at(Vec3::new(3.0, 4.0, 0.0)), Some(1), OwnerId(1));

        assert_eq!(a.distance_to(&b), 5.0);
    }

    #[test]
    fn test_same_pose_ignores_sequence() {
        let pose = Pose::at(Vec3::new(1.0, 2.0, 3.0));
        let a = StateSnapshot::capture(&pose, Some(4), OwnerId(1));
        let b = StateSnapshot::capture(&pose, None, OwnerId(1));

        assert!(a.same_pose(&b, 0.0));
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_for_checks_owner_and_index() {
        let snapshot = StateSnapshot::capture(&Pose::default(), Some(12), OwnerId(3));

        assert!(snapshot.is_for(12, OwnerId(3)));
        assert!(!snapshot.is_for(12, OwnerId(4)));
        assert!(!snapshot.is_for(4, OwnerId(3)));
        assert!(!StateSnapshot::default().is_for(0, OwnerId(0)));
    }

    #[test]
    fn test_remote_info_keeps_pose() {
        let pose = Pose::new(Quat::from_rotation_y(0.5), Quat::IDENTITY, Vec3::X);
        let snapshot = StateSnapshot::capture(&pose, Some(1), OwnerId(2));
        let info = snapshot.to_remote_info(ActorHandle(7));

        assert_eq!(info.pose(), pose);
        assert_eq!(info.owner_id, OwnerId(2));
        assert_eq!(info.actor_handle, ActorHandle(7));
    }
}
