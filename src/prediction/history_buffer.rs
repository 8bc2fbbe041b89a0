use crate::prediction::StateSnapshot;
use crate::protocol::InputSample;
use std::ops::Range;

/// Two parallel ring buffers of inputs and predicted states for reconciliation
///
/// Slot `i % capacity` of both arrays is written at tick `i`, so an input and
/// the state it produced always share a slot. Entries are never removed, only
/// overwritten once the counter laps the buffer. A slot says nothing about
/// freshness: use [`HistoryBuffer::input_at`] / [`HistoryBuffer::state_at`],
/// which check the entry's own sequence index.
pub struct HistoryBuffer {
    inputs: Vec<Option<InputSample>>,
    states: Vec<StateSnapshot>,
    capacity: usize,
    next_sequence: u64,
}

impl HistoryBuffer {
    /// Create a history buffer with a fixed capacity
    ///
    /// Size it well above the round trip measured in client frames: 1024
    /// frames covers ~17 seconds at 60fps.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inputs: vec![None; capacity],
            states: vec![StateSnapshot::default(); capacity],
            capacity,
            next_sequence: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&self, index: u64) -> usize {
        (index % self.capacity as u64) as usize
    }

    /// Sequence index the next recorded tick will carry
    pub fn current_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Most recent index that has been recorded and advanced past
    pub fn latest_recorded(&self) -> Option<u64> {
        self.next_sequence.checked_sub(1)
    }

    pub fn record_input(&mut self, sample: InputSample) {
        let slot = self.slot(sample.sequence_index);
        self.inputs[slot] = Some(sample);
    }

    /// Unsequenced snapshots have no slot and are not stored
    pub fn record_state(&mut self, snapshot: StateSnapshot) {
        if let Some(index) = snapshot.sequence_index {
            let slot = self.slot(index);
            self.states[slot] = snapshot;
        }
    }

    /// Raw slot read, whatever tick last wrote it
    pub fn input(&self, index: u64) -> Option<&InputSample> {
        self.inputs[self.slot(index)].as_ref()
    }

    /// Raw slot read, whatever tick last wrote it
    pub fn state(&self, index: u64) -> &StateSnapshot {
        &self.states[self.slot(index)]
    }

    /// The input recorded at exactly `index`, if the slot still holds it
    pub fn input_at(&self, index: u64) -> Option<&InputSample> {
        self.input(index)
            .filter(|sample| sample.sequence_index == index)
    }

    /// The state recorded at exactly `index`, if the slot still holds it
    pub fn state_at(&self, index: u64) -> Option<&StateSnapshot> {
        let state = self.state(index);
        (state.sequence_index == Some(index)).then_some(state)
    }

    /// Move on to the next tick and return its sequence index
    pub fn advance(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    /// Whether `index` has been recorded and not yet lapped
    pub fn is_retained(&self, index: u64) -> bool {
        index < self.next_sequence && self.next_sequence - index <= self.capacity as u64
    }

    /// Indices strictly after `after` up to the most recent one, oldest first
    ///
    /// Used for re-simulation during reconciliation: the authority confirmed
    /// tick N, everything after N gets replayed. Counting runs on the
    /// unwrapped counter so the walk stays in order across the ring boundary.
    pub fn replay_range(&self, after: u64) -> Range<u64> {
        let start = after.saturating_add(1).min(self.next_sequence);
        start..self.next_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::{OwnerId, Pose};
    use bevy::prelude::*;

    fn record_tick(buffer: &mut HistoryBuffer, x: f32) -> u64 {
        let index = buffer.current_sequence();
        buffer.record_input(InputSample {
            move_axes: Vec2::new(x, 0.0),
            sequence_index: index,
            owner_id: OwnerId(1),
            ..default()
        });
        buffer.record_state(StateSnapshot::capture(
            &Pose::at(Vec3::new(x, 0.0, 0.0)),
            Some(index),
            OwnerId(1),
        ));
        buffer.advance();
        index
    }

    #[test]
    fn test_input_and_state_stay_paired() {
        let mut buffer = HistoryBuffer::new(8);
        for i in 0..8 {
            record_tick(&mut buffer, i as f32);
        }

        for i in 0..8u64 {
            let input = buffer.input_at(i).unwrap();
            let state = buffer.state_at(i).unwrap();
            assert_eq!(input.move_axes.x, state.position.x);
        }
    }

    #[test]
    fn test_wraparound_overwrites_and_is_detected() {
        let mut buffer = HistoryBuffer::new(4);
        for i in 0..6 {
            record_tick(&mut buffer, i as f32);
        }

        // Slot 1 now holds tick 5
        assert_eq!(buffer.state(1).sequence_index, Some(5));
        assert!(buffer.state_at(1).is_none());
        assert!(buffer.input_at(1).is_none());
        assert!(!buffer.is_retained(1));
        assert!(buffer.is_retained(2));
        assert_eq!(buffer.state_at(5).unwrap().position.x, 5.0);
    }

    #[test]
    fn test_unrecorded_index_is_not_fresh() {
        let mut buffer = HistoryBuffer::new(4);
        record_tick(&mut buffer, 0.0);

        assert!(buffer.state_at(3).is_none());
        assert!(buffer.input_at(3).is_none());
        assert!(!buffer.is_retained(3));
    }

    #[test]
    fn test_unsequenced_state_is_not_recorded() {
        let mut buffer = HistoryBuffer::new(4);
        buffer.record_state(StateSnapshot::capture(&Pose::at(Vec3::ONE), None, OwnerId(1)));

        assert_eq!(*buffer.state(0), StateSnapshot::default());
    }

    #[test]
    fn test_replay_range_across_ring_boundary() {
        let mut buffer = HistoryBuffer::new(4);
        for i in 0..7 {
            record_tick(&mut buffer, i as f32);
        }

        let replay: Vec<u64> = buffer.replay_range(4).collect();
        assert_eq!(replay, vec![5, 6]);

        // Slots 1, 2 in ring order, 5, 6 in tick order
        let xs: Vec<f32> = replay
            .iter()
            .map(|i| buffer.input_at(*i).unwrap().move_axes.x)
            .collect();
        assert_eq!(xs, vec![5.0, 6.0]);
    }

    #[test]
    fn test_replay_range_empty_when_up_to_date() {
        let mut buffer = HistoryBuffer::new(4);
        assert_eq!(buffer.latest_recorded(), None);
        assert!(buffer.replay_range(0).is_empty());

        record_tick(&mut buffer, 0.0);
        record_tick(&mut buffer, 1.0);
        assert_eq!(buffer.latest_recorded(), Some(1));
        assert!(buffer.replay_range(1).is_empty());
        assert!(buffer.replay_range(10).is_empty());
    }
}
