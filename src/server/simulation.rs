use crate::error::{Result, SyncError};
use crate::game_logic::{ActorHandle, MotionModel, OwnerId, Pose};
use crate::prediction::StateSnapshot;
use crate::protocol::{ClientMessage, InputSample, RemoteActorInfo};
use crate::server::ActorDirectory;
use crate::tick::{TickClock, TickSubscription};
use crate::transport::Transport;
use bevy::prelude::*;
use std::collections::{HashMap, VecDeque};

/// Outcome of one authority tick
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Owners whose input was simulated this tick, first-seen order
    pub processed: Vec<OwnerId>,
    /// Every snapshot produced this tick
    pub snapshots: Vec<StateSnapshot>,
    /// Snapshot for the player hosted in this process, delivered by direct call
    pub local_snapshot: Option<StateSnapshot>,
    /// Reduced infos addressed to the player hosted in this process
    pub local_remote_infos: Vec<RemoteActorInfo>,
}

/// Authoritative simulation, run once per fixed tick
///
/// Inputs are queued as they arrive and drained all at once on the next
/// tick. Every owner with input this tick gets its full snapshot; every
/// other connected owner gets the reduced form.
pub struct AuthorityTickProcessor<D, M, T> {
    directory: D,
    motion: M,
    transport: T,
    queue: VecDeque<InputSample>,
    last_processed: HashMap<OwnerId, u64>,
    authoritative: HashMap<OwnerId, Pose>,
    active: Vec<OwnerId>,
    local_owner: Option<OwnerId>,
    tick: u64,
    subscription: Option<TickSubscription>,
}

impl<D, M, T> AuthorityTickProcessor<D, M, T>
where
    D: ActorDirectory,
    M: MotionModel,
    T: Transport,
{
    pub fn new(directory: D, motion: M, transport: T) -> Self {
        Self {
            directory,
            motion,
            transport,
            queue: VecDeque::new(),
            last_processed: HashMap::new(),
            authoritative: HashMap::new(),
            active: Vec::new(),
            local_owner: None,
            tick: 0,
            subscription: None,
        }
    }

    /// Host a player inside the authority process. Its entity is always
    /// considered active and its traffic bypasses the transport.
    pub fn with_local_owner(mut self, owner: OwnerId) -> Result<Self> {
        self.connect(owner)?;
        self.local_owner = Some(owner);
        self.mark_active(owner);
        Ok(self)
    }

    pub fn local_owner(&self) -> Option<OwnerId> {
        self.local_owner
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut D {
        &mut self.directory
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn queued_inputs(&self) -> usize {
        self.queue.len()
    }

    pub fn last_processed(&self, owner: OwnerId) -> Option<u64> {
        self.last_processed.get(&owner).copied()
    }

    /// Last pose this authority computed for `owner`
    pub fn authoritative_pose(&self, owner: OwnerId) -> Option<Pose> {
        self.authoritative.get(&owner).copied()
    }

    /// Register an owner as a broadcast target
    pub fn connect(&mut self, owner: OwnerId) -> Result<ActorHandle> {
        let handle = self
            .directory
            .resolve(owner)
            .ok_or(SyncError::DirectoryFull(owner))?;
        if !self.authoritative.contains_key(&owner) {
            let pose = self.directory.pose(handle).unwrap_or_default();
            self.authoritative.insert(owner, pose);
        }
        Ok(handle)
    }

    /// Forget an owner and any input it still has queued
    pub fn disconnect(&mut self, owner: OwnerId) {
        if self.local_owner == Some(owner) {
            warn!("refusing to disconnect the hosted {}", owner);
            return;
        }
        self.directory.release(owner);
        self.last_processed.remove(&owner);
        self.authoritative.remove(&owner);
        self.active.retain(|active| *active != owner);
        self.queue.retain(|sample| sample.owner_id != owner);
    }

    /// Queue an input for the next tick, registering unseen owners first
    pub fn enqueue(&mut self, sample: InputSample) -> Result<()> {
        self.connect(sample.owner_id)?;
        self.queue.push_back(sample);
        Ok(())
    }

    /// Handle one decoded client message
    pub fn receive(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::PlayerInput { sample, info } => {
                if info.owner_id != sample.owner_id {
                    debug!(
                        "input from {} carries info for {}",
                        sample.owner_id, info.owner_id
                    );
                }
                if let Err(err) = self.enqueue(sample) {
                    warn!(
                        "dropping input {} from {}: {}",
                        sample.sequence_index, sample.owner_id, err
                    );
                }
            }
        }
    }

    /// Subscribe to a tick clock; [`Self::pump`] then runs one tick per
    /// clock tick
    pub fn on_attach(&mut self, clock: &TickClock) {
        if self.subscription.is_some() {
            debug!("authority re-attached, dropping previous tick subscription");
        }
        self.subscription = Some(clock.subscribe());
    }

    pub fn on_detach(&mut self) {
        self.subscription = None;
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Run every tick the attached clock fired since the last pump
    pub fn pump(&mut self) -> Vec<TickReport> {
        let fired = match self.subscription.as_mut() {
            Some(subscription) => subscription.drain(),
            None => return Vec::new(),
        };
        fired.into_iter().map(|_| self.tick()).collect()
    }

    /// Drain inputs, simulate, snapshot, broadcast
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let mut report = TickReport {
            tick: self.tick,
            ..default()
        };

        // Hosting a player means other entities carry interpolated display
        // poses; simulate from ground truth and put the display poses back
        // afterwards for anyone who did not move this tick.
        let displayed = if self.local_owner.is_some() {
            self.force_authoritative_poses()
        } else {
            Vec::new()
        };

        report.processed = self.drain_inputs();

        let produced = self.build_snapshots();
        let local_owner = self.local_owner;
        self.active.retain(|owner| Some(*owner) == local_owner);

        self.fan_out(&produced, &mut report);
        report.snapshots = produced.into_iter().map(|(snapshot, _)| snapshot).collect();

        for (owner, handle, pose) in displayed {
            if !report.processed.contains(&owner) {
                self.directory.set_pose(handle, pose);
            }
        }

        report
    }

    fn mark_active(&mut self, owner: OwnerId) {
        if !self.active.contains(&owner) {
            self.active.push(owner);
        }
    }

    /// Save display poses of non-local entities and reset them to the last
    /// authoritative pose
    fn force_authoritative_poses(&mut self) -> Vec<(OwnerId, ActorHandle, Pose)> {
        let mut displayed = Vec::new();

        for owner in self.directory.broadcast_targets() {
            if Some(owner) == self.local_owner {
                continue;
            }
            let Some(handle) = self.directory.lookup(owner) else {
                continue;
            };
            let Some(current) = self.directory.pose(handle) else {
                continue;
            };
            if let Some(authoritative) = self.authoritative.get(&owner) {
                self.directory.set_pose(handle, *authoritative);
            }
            displayed.push((owner, handle, current));
        }

        displayed
    }

    fn drain_inputs(&mut self) -> Vec<OwnerId> {
        let mut processed = Vec::new();
        let inputs: Vec<InputSample> = self.queue.drain(..).collect();

        for sample in inputs {
            let owner = sample.owner_id;
            let Some(handle) = self.directory.resolve(owner) else {
                warn!("no actor for {}, skipping input {}", owner, sample.sequence_index);
                continue;
            };

            let mut pose = self
                .authoritative
                .get(&owner)
                .copied()
                .or_else(|| self.directory.pose(handle))
                .unwrap_or_else(|| Pose::spawn_for(owner));
            self.motion.apply_input(&mut pose, &sample);

            self.directory.set_pose(handle, pose);
            self.authoritative.insert(owner, pose);
            self.last_processed.insert(owner, sample.sequence_index);
            self.mark_active(owner);
            if !processed.contains(&owner) {
                processed.push(owner);
            }
        }

        processed
    }

    fn build_snapshots(&self) -> Vec<(StateSnapshot, RemoteActorInfo)> {
        self.active
            .iter()
            .filter_map(|owner| {
                let handle = self.directory.lookup(*owner)?;
                let pose = self
                    .authoritative
                    .get(owner)
                    .copied()
                    .or_else(|| self.directory.pose(handle))?;
                let sequence = self.last_processed.get(owner).copied().unwrap_or(0);
                let snapshot = StateSnapshot::capture(&pose, Some(sequence), *owner);
                Some((snapshot, snapshot.to_remote_info(handle)))
            })
            .collect()
    }

    fn fan_out(&mut self, produced: &[(StateSnapshot, RemoteActorInfo)], report: &mut TickReport) {
        let targets = self.directory.broadcast_targets();

        for (snapshot, info) in produced {
            if Some(snapshot.owner_id) == self.local_owner {
                report.local_snapshot = Some(*snapshot);
            } else if let Err(err) = self.transport.send_to_owner(snapshot) {
                warn!("failed to send snapshot to {}: {}", snapshot.owner_id, err);
            }

            for target in targets.iter().filter(|target| **target != snapshot.owner_id) {
                if Some(*target) == self.local_owner {
                    report.local_remote_infos.push(*info);
                } else if let Err(err) = self.transport.send_to_other(info, *target) {
                    warn!(
                        "failed to send {} info to {}: {}",
                        info.owner_id, target, err
                    );
                }
            }
        }
    }
}
