use crate::game_logic::{MotionModel, OwnerId, Pose};
use crate::prediction::{HistoryBuffer, StateSnapshot};
use bevy::prelude::*;

/// What happened when an authoritative snapshot was checked against history
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reconciliation {
    /// Prediction matched the authority, nothing to do
    Confirmed,
    /// Prediction diverged: pose reset to the authority and `replayed`
    /// inputs re-applied. `error` is the positional miss.
    Corrected { replayed: usize, error: f32 },
    /// The snapshot's tick has been lapped by newer history (round trip
    /// longer than the buffer). The pose snapped to the authority without
    /// replay.
    HistoryOverwritten,
    /// The snapshot refers to a tick this client has not recorded
    NotRecorded,
}

/// Compares authoritative state with prediction and re-simulates on mismatch
///
/// When the authority sends a snapshot, this engine:
/// 1. Looks up what we predicted at that sequence number
/// 2. If the poses differ, restarts from the authority's pose
/// 3. Re-applies every input recorded after it, oldest first
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    /// Reconcile `pose` (the live predicted pose) with `authoritative`
    ///
    /// Corrected states are written back into `history` so that later
    /// snapshots for already corrected ticks compare against the fixed
    /// prediction.
    pub fn reconcile<M: MotionModel>(
        authoritative: &StateSnapshot,
        history: &mut HistoryBuffer,
        pose: &mut Pose,
        motion: &M,
        tolerance: f32,
    ) -> Reconciliation {
        let Some(index) = authoritative.sequence_index else {
            return Reconciliation::NotRecorded;
        };

        if index >= history.current_sequence() {
            return Reconciliation::NotRecorded;
        }

        let Some(predicted) = history.state_at(index).copied() else {
            warn!(
                "snapshot for tick {} arrived after its history slot was reused (capacity {}), snapping to authority",
                index,
                history.capacity()
            );
            authoritative.apply_to(pose);
            return Reconciliation::HistoryOverwritten;
        };

        if !predicted.is_for(index, authoritative.owner_id) {
            warn!(
                "snapshot for {} checked against history of {}, ignoring",
                authoritative.owner_id, predicted.owner_id
            );
            return Reconciliation::NotRecorded;
        }

        if predicted.same_pose(authoritative, tolerance) {
            return Reconciliation::Confirmed;
        }

        let owner_id = predicted.owner_id;
        let error = predicted.distance_to(authoritative);
        authoritative.apply_to(pose);
        history.record_state(StateSnapshot::capture(pose, Some(index), owner_id));

        let replayed = Self::replay_after(index, history, pose, motion, owner_id);

        debug!(
            "corrected {} at tick {}: miss {:.4}, replayed {} inputs",
            owner_id, index, error, replayed
        );

        Reconciliation::Corrected { replayed, error }
    }

    /// Re-apply every input recorded after `index`, rewriting the matching
    /// state entries as it goes. Returns how many inputs were applied.
    fn replay_after<M: MotionModel>(
        index: u64,
        history: &mut HistoryBuffer,
        pose: &mut Pose,
        motion: &M,
        owner_id: OwnerId,
    ) -> usize {
        let mut replayed = 0;

        for sequence in history.replay_range(index) {
            let Some(sample) = history.input_at(sequence).copied() else {
                warn!("input for tick {} missing during replay, stopping early", sequence);
                break;
            };

            motion.apply_input(pose, &sample);
            history.record_state(StateSnapshot::capture(pose, Some(sequence), owner_id));
            replayed += 1;
        }

        replayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::CharacterMotion;
    use crate::protocol::InputSample;

    const OWNER: OwnerId = OwnerId(1);

    fn predict(history: &mut HistoryBuffer, pose: &mut Pose, motion: &CharacterMotion, ticks: usize) {
        for i in 0..ticks {
            let sample = InputSample {
                move_axes: Vec2::new(0.5, 1.0),
                look_delta: Vec2::new((i % 3) as f32, 0.0),
                delta_time: 0.02,
                sequence_index: history.current_sequence(),
                owner_id: OWNER,
                ..default()
            };
            motion.apply_input(pose, &sample);
            history.record_input(sample);
            history.record_state(StateSnapshot::capture(pose, Some(sample.sequence_index), OWNER));
            history.advance();
        }
    }

    #[test]
    fn test_matching_snapshot_is_confirmed() {
        let motion = CharacterMotion::default();
        let mut history = HistoryBuffer::new(16);
        let mut pose = Pose::default();
        predict(&mut history, &mut pose, &motion, 5);

        let authoritative = *history.state_at(2).unwrap();
        let before = pose;
        let outcome =
            ReconciliationEngine::reconcile(&authoritative, &mut history, &mut pose, &motion, 0.0);

        assert_eq!(outcome, Reconciliation::Confirmed);
        assert_eq!(pose, before);
    }

    #[test]
    fn test_mismatch_replays_later_inputs() {
        let motion = CharacterMotion::default();
        let mut history = HistoryBuffer::new(16);
        let mut pose = Pose::default();
        predict(&mut history, &mut pose, &motion, 6);

        let mut authoritative = *history.state_at(1).unwrap();
        authoritative.position.y += 2.0;
        authoritative.body_rotation = Quat::from_rotation_y(0.4);

        // Expected: authoritative pose, then inputs 2..=5 in order
        let mut expected = authoritative.pose();
        for i in 2..6 {
            motion.apply_input(&mut expected, history.input_at(i).unwrap());
        }

        let outcome =
            ReconciliationEngine::reconcile(&authoritative, &mut history, &mut pose, &motion, 0.0);

        assert!(matches!(outcome, Reconciliation::Corrected { replayed: 4, .. }));
        assert_eq!(pose, expected);
        assert_eq!(history.state_at(5).unwrap().pose(), expected);
        assert_eq!(history.state_at(1).unwrap().pose(), authoritative.pose());
    }

    #[test]
    fn test_correction_of_latest_tick_replays_nothing() {
        let motion = CharacterMotion::default();
        let mut history = HistoryBuffer::new(16);
        let mut pose = Pose::default();
        predict(&mut history, &mut pose, &motion, 3);

        let mut authoritative = *history.state_at(2).unwrap();
        authoritative.position.x -= 1.0;

        let outcome =
            ReconciliationEngine::reconcile(&authoritative, &mut history, &mut pose, &motion, 0.0);

        assert!(matches!(outcome, Reconciliation::Corrected { replayed: 0, .. }));
        assert_eq!(pose, authoritative.pose());
    }

    #[test]
    fn test_tolerance_absorbs_small_error() {
        let motion = CharacterMotion::default();
        let mut history = HistoryBuffer::new(16);
        let mut pose = Pose::default();
        predict(&mut history, &mut pose, &motion, 3);

        let mut authoritative = *history.state_at(1).unwrap();
        authoritative.position.x += 1e-4;

        let outcome =
            ReconciliationEngine::reconcile(&authoritative, &mut history, &mut pose, &motion, 1e-3);
        assert_eq!(outcome, Reconciliation::Confirmed);
    }

    #[test]
    fn test_future_tick_is_not_recorded() {
        let motion = CharacterMotion::default();
        let mut history = HistoryBuffer::new(16);
        let mut pose = Pose::default();
        predict(&mut history, &mut pose, &motion, 2);

        let authoritative = StateSnapshot::capture(&Pose::at(Vec3::ONE), Some(7), OWNER);
        let before = pose;
        let outcome =
            ReconciliationEngine::reconcile(&authoritative, &mut history, &mut pose, &motion, 0.0);

        assert_eq!(outcome, Reconciliation::NotRecorded);
        assert_eq!(pose, before);
    }

    #[test]
    fn test_replay_wraps_around_the_ring() {
        let motion = CharacterMotion::default();
        let mut history = HistoryBuffer::new(4);
        let mut pose = Pose::default();
        predict(&mut history, &mut pose, &motion, 7);

        // Tick 3 sits in the last slot; ticks 4..=6 live in slots 0..=2
        let mut authoritative = *history.state_at(3).unwrap();
        authoritative.position.z += 3.0;

        let mut expected = authoritative.pose();
        for i in 4..7 {
            motion.apply_input(&mut expected, history.input_at(i).unwrap());
        }

        let outcome =
            ReconciliationEngine::reconcile(&authoritative, &mut history, &mut pose, &motion, 0.0);

        assert!(matches!(outcome, Reconciliation::Corrected { replayed: 3, .. }));
        assert_eq!(pose, expected);
        assert_eq!(history.state_at(6).unwrap().pose(), expected);
        assert!(history.state_at(2).is_none());
    }

    #[test]
    fn test_snapshot_for_another_owner_is_ignored() {
        let motion = CharacterMotion::default();
        let mut history = HistoryBuffer::new(8);
        let mut pose = Pose::default();
        predict(&mut history, &mut pose, &motion, 3);

        let authoritative = StateSnapshot::capture(&Pose::at(Vec3::ONE), Some(1), OwnerId(9));
        let before = pose;
        let outcome =
            ReconciliationEngine::reconcile(&authoritative, &mut history, &mut pose, &motion, 0.0);

        assert_eq!(outcome, Reconciliation::NotRecorded);
        assert_eq!(pose, before);
    }

    #[test]
    fn test_round_trip_longer_than_capacity_is_surfaced() {
        let motion = CharacterMotion::default();
        let mut history = HistoryBuffer::new(4);
        let mut pose = Pose::default();
        predict(&mut history, &mut pose, &motion, 10);

        let authoritative = StateSnapshot::capture(&Pose::at(Vec3::new(9.0, 0.0, 0.0)), Some(3), OWNER);
        let outcome =
            ReconciliationEngine::reconcile(&authoritative, &mut history, &mut pose, &motion, 0.0);

        assert_eq!(outcome, Reconciliation::HistoryOverwritten);
        assert_eq!(pose, authoritative.pose());
    }
}
