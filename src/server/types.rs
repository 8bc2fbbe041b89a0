use crate::game_logic::{ActorHandle, OwnerId, Pose};
use bevy::prelude::*;
use std::collections::BTreeMap;

/// Maps owners to the entities they control and holds those entities' poses.
///
/// Injected into whoever needs to place poses on entities; registration is
/// lazy, on first contact with an owner.
pub trait ActorDirectory {
    /// Handle for `owner`, registering it if unseen. `None` when the owner
    /// cannot be registered.
    fn resolve(&mut self, owner: OwnerId) -> Option<ActorHandle>;

    /// Handle for an already registered owner
    fn lookup(&self, owner: OwnerId) -> Option<ActorHandle>;

    /// Forget an owner, returning the handle it held
    fn release(&mut self, owner: OwnerId) -> Option<ActorHandle>;

    /// Every registered owner, in a stable order
    fn broadcast_targets(&self) -> Vec<OwnerId>;

    fn pose(&self, handle: ActorHandle) -> Option<Pose>;

    /// Returns false if the handle is not in use
    fn set_pose(&mut self, handle: ActorHandle, pose: Pose) -> bool;
}

struct ActorEntry {
    owner: OwnerId,
    pose: Pose,
}

/// In-memory [`ActorDirectory`] with a fixed number of actor slots
pub struct ActorRegistry {
    owners: BTreeMap<OwnerId, ActorHandle>,
    actors: Vec<Option<ActorEntry>>,
    max_actors: usize,
}

impl ActorRegistry {
    pub fn new(max_actors: usize) -> Self {
        Self {
            owners: BTreeMap::new(),
            actors: Vec::new(),
            max_actors,
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn owner_of(&self, handle: ActorHandle) -> Option<OwnerId> {
        self.entry(handle).map(|entry| entry.owner)
    }

    /// Pose of the entity `owner` controls, if registered
    pub fn pose_of(&self, owner: OwnerId) -> Option<Pose> {
        self.lookup(owner).and_then(|handle| self.pose(handle))
    }

    fn entry(&self, handle: ActorHandle) -> Option<&ActorEntry> {
        self.actors.get(handle.0 as usize).and_then(Option::as_ref)
    }
}

impl ActorDirectory for ActorRegistry {
    fn resolve(&mut self, owner: OwnerId) -> Option<ActorHandle> {
        if let Some(handle) = self.owners.get(&owner) {
            return Some(*handle);
        }

        if self.owners.len() >= self.max_actors {
            warn!(
                "actor directory full ({} actors), cannot register {}",
                self.max_actors, owner
            );
            return None;
        }

        let entry = ActorEntry {
            owner,
            pose: Pose::spawn_for(owner),
        };
        // Reuse the first free slot before growing
        let index = match self.actors.iter().position(Option::is_none) {
            Some(index) => {
                self.actors[index] = Some(entry);
                index
            }
            None => {
                self.actors.push(Some(entry));
                self.actors.len() - 1
            }
        };

        let handle = ActorHandle(index as u32);
        self.owners.insert(owner, handle);
        info!("registered {} as actor {}", owner, handle.0);
        Some(handle)
    }

    fn lookup(&self, owner: OwnerId) -> Option<ActorHandle> {
        self.owners.get(&owner).copied()
    }

    fn release(&mut self, owner: OwnerId) -> Option<ActorHandle> {
        let handle = self.owners.remove(&owner)?;
        if let Some(slot) = self.actors.get_mut(handle.0 as usize) {
            *slot = None;
        }
        info!("released {} (actor {})", owner, handle.0);
        Some(handle)
    }

    fn broadcast_targets(&self) -> Vec<OwnerId> {
        self.owners.keys().copied().collect()
    }

    fn pose(&self, handle: ActorHandle) -> Option<Pose> {
        self.entry(handle).map(|entry| entry.pose)
    }

    fn set_pose(&mut self, handle: ActorHandle, pose: Pose) -> bool {
        match self.actors.get_mut(handle.0 as usize) {
            Some(Some(entry)) => {
                entry.pose = pose;
                true
            }
            _ => false,
        }
    }
}
