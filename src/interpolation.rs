use crate::game_logic::{ActorHandle, OwnerId, Pose};
use crate::protocol::RemoteActorInfo;
use crate::server::ActorDirectory;
use bevy::prelude::*;
use std::collections::BTreeMap;

/// Buffers the two most recent states received for one remote owner
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InterpolationSlot {
    pub previous: RemoteActorInfo,
    pub newest: RemoteActorInfo,
    /// Seconds since `newest` arrived
    pub elapsed: f32,
}

impl InterpolationSlot {
    pub fn new(info: RemoteActorInfo) -> Self {
        Self {
            previous: info,
            newest: info,
            elapsed: 0.0,
        }
    }

    pub fn push_state(&mut self, info: RemoteActorInfo) {
        self.previous = self.newest;
        self.newest = info;
        self.elapsed = 0.0;
    }

    /// Blend factor: 0 at `previous`, 1 at `newest`, above 1 extrapolates
    pub fn alpha(&self, tick_interval: f32) -> f32 {
        if tick_interval > 0.0 {
            self.elapsed / tick_interval
        } else {
            1.0
        }
    }

    pub fn blended(&self, tick_interval: f32) -> Pose {
        self.previous
            .pose()
            .blend(&self.newest.pose(), self.alpha(tick_interval))
    }
}

/// Display pose computed for one remote owner this frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InterpolatedPose {
    pub owner_id: OwnerId,
    pub actor_handle: ActorHandle,
    pub pose: Pose,
    pub t: f32,
}

/// Smooths remote entities between the reduced states the authority sends,
/// one slot per remote owner. Purely cosmetic.
pub struct RemoteInterpolator {
    slots: BTreeMap<OwnerId, InterpolationSlot>,
    tick_interval: f32,
}

impl RemoteInterpolator {
    pub fn new(tick_interval: f32) -> Self {
        Self {
            slots: BTreeMap::new(),
            tick_interval,
        }
    }

    pub fn from_hz(tick_rate_hz: f32) -> Self {
        Self::new(1.0 / tick_rate_hz)
    }

    pub fn tick_interval(&self) -> f32 {
        self.tick_interval
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, owner: OwnerId) -> Option<&InterpolationSlot> {
        self.slots.get(&owner)
    }

    pub fn on_receive(&mut self, info: RemoteActorInfo) {
        match self.slots.get_mut(&info.owner_id) {
            Some(slot) => slot.push_state(info),
            None => {
                debug!("first state for remote {}", info.owner_id);
                self.slots.insert(info.owner_id, InterpolationSlot::new(info));
            }
        }
    }

    /// Advance every slot by one local frame and blend
    pub fn tick(&mut self, delta: f32) -> Vec<InterpolatedPose> {
        for slot in self.slots.values_mut() {
            slot.elapsed += delta;
        }

        self.slots
            .iter()
            .map(|(owner, slot)| InterpolatedPose {
                owner_id: *owner,
                actor_handle: slot.newest.actor_handle,
                pose: slot.blended(self.tick_interval),
                t: slot.alpha(self.tick_interval),
            })
            .collect()
    }

    /// Current display pose for one owner, without advancing time
    pub fn sample(&self, owner: OwnerId) -> Option<Pose> {
        self.slots
            .get(&owner)
            .map(|slot| slot.blended(self.tick_interval))
    }

    /// Place blended poses on the entities they belong to
    pub fn apply<D: ActorDirectory>(&self, poses: &[InterpolatedPose], directory: &mut D) -> usize {
        let mut applied = 0;

        for interpolated in poses {
            let Some(handle) = directory.resolve(interpolated.owner_id) else {
                debug!(
                    "no actor for remote {}, skipping interpolated pose",
                    interpolated.owner_id
                );
                continue;
            };
            if directory.set_pose(handle, interpolated.pose) {
                applied += 1;
            }
        }

        applied
    }

    pub fn forget(&mut self, owner: OwnerId) -> bool {
        self.slots.remove(&owner).is_some()
    }
}
