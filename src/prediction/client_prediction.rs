use crate::config::SyncConfig;
use crate::game_logic::{ActorHandle, InputDevice, MotionModel, OwnerId, Pose};
use crate::prediction::{HistoryBuffer, Reconciliation, ReconciliationEngine, StateSnapshot};
use crate::protocol::{InputSample, RemoteActorInfo};
use crate::transport::Transport;
use bevy::prelude::*;
use std::collections::VecDeque;

/// Counters describing how well prediction tracks the authority
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PredictionStats {
    pub frames: u64,
    pub confirmations: u64,
    pub corrections: u64,
    pub inputs_replayed: u64,
    pub overwritten: u64,
    pub not_recorded: u64,
    /// Positional miss of the most recent correction
    pub last_error: f32,
}

impl PredictionStats {
    fn record(&mut self, outcome: &Reconciliation) {
        match outcome {
            Reconciliation::Confirmed => self.confirmations += 1,
            Reconciliation::Corrected { replayed, error } => {
                self.corrections += 1;
                self.inputs_replayed += *replayed as u64;
                self.last_error = *error;
            }
            Reconciliation::HistoryOverwritten => self.overwritten += 1,
            Reconciliation::NotRecorded => self.not_recorded += 1,
        }
    }
}

/// Client-side predictor for the locally controlled entity
///
/// Each frame it:
/// - Applies authoritative snapshots queued since the last frame
/// - Samples the input device and moves the local pose immediately
/// - Records the input and resulting pose in the history buffer
/// - Sends the input to the authority
///
/// Collaborators are fixed at construction: the input device, the motion
/// model (identical to the authority's) and the outbound transport.
pub struct LocalPredictor<I, M, T> {
    owner_id: OwnerId,
    actor_handle: ActorHandle,
    pose: Pose,
    history: HistoryBuffer,
    pending: VecDeque<StateSnapshot>,
    tolerance: f32,
    stats: PredictionStats,
    input: I,
    motion: M,
    transport: T,
}

impl<I, M, T> LocalPredictor<I, M, T>
where
    I: InputDevice,
    M: MotionModel,
    T: Transport,
{
    pub fn new(
        owner_id: OwnerId,
        actor_handle: ActorHandle,
        spawn: Pose,
        config: &SyncConfig,
        input: I,
        motion: M,
        transport: T,
    ) -> Self {
        Self {
            owner_id,
            actor_handle,
            pose: spawn,
            history: HistoryBuffer::new(config.history_capacity),
            pending: VecDeque::new(),
            tolerance: config.reconcile_tolerance,
            stats: PredictionStats::default(),
            input,
            motion,
            transport,
        }
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn stats(&self) -> &PredictionStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Snapshots waiting for the next frame boundary
    pub fn pending_corrections(&self) -> usize {
        self.pending.len()
    }

    /// Sample the input device and stamp the current sequence index
    pub fn collect_input(&mut self, delta: f32) -> InputSample {
        let raw = self.input.poll(delta);
        InputSample::from_raw(raw, delta, self.history.current_sequence(), self.owner_id)
    }

    /// Move the local pose by one input
    pub fn apply_input(&mut self, sample: &InputSample) {
        self.motion.apply_input(&mut self.pose, sample);
    }

    /// Record `sample` and the pose it produced, then advance the counter
    pub fn store_local_state(&mut self, sample: InputSample) -> StateSnapshot {
        let snapshot =
            StateSnapshot::capture(&self.pose, Some(sample.sequence_index), self.owner_id);
        self.history.record_input(sample);
        self.history.record_state(snapshot);
        self.history.advance();
        snapshot
    }

    /// Our own pose in broadcast form
    pub fn reduced_self_info(&self) -> RemoteActorInfo {
        RemoteActorInfo::from_pose(&self.pose, self.actor_handle, self.owner_id)
    }

    /// Fire-and-forget: failures are logged, never retried
    pub fn send_input(&mut self, sample: &InputSample, info: &RemoteActorInfo) {
        if let Err(err) = self.transport.send_to_authority(sample, info) {
            warn!(
                "failed to send input {} for {}: {}",
                sample.sequence_index, self.owner_id, err
            );
        }
    }

    /// Queue an authoritative snapshot; it is applied at the next frame
    /// boundary, never in the middle of a predict/store step.
    pub fn on_authoritative_state(&mut self, snapshot: StateSnapshot) {
        if snapshot.owner_id != self.owner_id {
            warn!(
                "{} received a snapshot addressed to {}, ignoring",
                self.owner_id, snapshot.owner_id
            );
            return;
        }
        self.pending.push_back(snapshot);
    }

    /// Check one snapshot against history right away
    pub fn reconcile(&mut self, snapshot: &StateSnapshot) -> Reconciliation {
        let outcome = ReconciliationEngine::reconcile(
            snapshot,
            &mut self.history,
            &mut self.pose,
            &self.motion,
            self.tolerance,
        );
        self.stats.record(&outcome);
        outcome
    }

    /// Reconcile every queued snapshot in arrival order
    ///
    /// A delayed older snapshot is still checked against its own tick.
    pub fn apply_pending_corrections(&mut self) -> Vec<Reconciliation> {
        let mut outcomes = Vec::with_capacity(self.pending.len());
        while let Some(snapshot) = self.pending.pop_front() {
            outcomes.push(self.reconcile(&snapshot));
        }
        outcomes
    }

    /// Run one client frame: corrections, then collect, predict, store, send
    pub fn frame(&mut self, delta: f32) -> InputSample {
        self.apply_pending_corrections();

        let sample = self.collect_input(delta);
        self.apply_input(&sample);
        self.store_local_state(sample);

        let info = self.reduced_self_info();
        self.send_input(&sample, &info);

        self.stats.frames += 1;
        sample
    }
}
