use crate::config::MotionSettings;
use crate::game_logic::{
    Pose, JUMP_SPEED, LOOK_SENSITIVITY, MAX_PITCH, MOVE_SPEED, SPRINT_MULTIPLIER,
};
use crate::protocol::InputSample;
use bevy::prelude::*;

/// Turns one input sample into a pose change.
///
/// Client and authority must run the same implementation with the same
/// settings: any divergence shows up as a correction on every tick.
pub trait MotionModel {
    fn apply_movement(&self, pose: &mut Pose, delta: f32, move_axes: Vec2, jump: bool, sprint: bool);

    fn apply_look(&self, pose: &mut Pose, look_delta: Vec2, delta: f32);

    /// Look first, then move along the new heading.
    fn apply_input(&self, pose: &mut Pose, sample: &InputSample) {
        self.apply_look(pose, sample.look_delta, sample.delta_time);
        self.apply_movement(
            pose,
            sample.delta_time,
            sample.move_axes,
            sample.jump,
            sample.sprint,
        );
    }
}

/// First-person character motion: yaw on the body, pitch on the camera,
/// planar movement relative to the body heading.
///
/// Only depends on rotation and input, so a positional offset in the start
/// pose carries through unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct CharacterMotion {
    pub move_speed: f32,
    pub sprint_multiplier: f32,
    pub jump_speed: f32,
    pub look_sensitivity: f32,
    pub max_pitch: f32,
}

impl Default for CharacterMotion {
    fn default() -> Self {
        Self {
            move_speed: MOVE_SPEED,
            sprint_multiplier: SPRINT_MULTIPLIER,
            jump_speed: JUMP_SPEED,
            look_sensitivity: LOOK_SENSITIVITY,
            max_pitch: MAX_PITCH,
        }
    }
}

impl From<&MotionSettings> for CharacterMotion {
    fn from(settings: &MotionSettings) -> Self {
        Self {
            move_speed: settings.move_speed,
            sprint_multiplier: settings.sprint_multiplier,
            jump_speed: settings.jump_speed,
            look_sensitivity: settings.look_sensitivity,
            max_pitch: settings.max_pitch,
        }
    }
}

impl MotionModel for CharacterMotion {
    fn apply_movement(&self, pose: &mut Pose, delta: f32, move_axes: Vec2, jump: bool, sprint: bool) {
        // x strafes, y walks forward (-Z)
        let mut wish_dir = Vec3::new(move_axes.x, 0.0, -move_axes.y);
        if wish_dir.length_squared() > 1.0 {
            wish_dir = wish_dir.normalize();
        }

        let speed = if sprint {
            self.move_speed * self.sprint_multiplier
        } else {
            self.move_speed
        };

        pose.position += pose.body_rotation * wish_dir * speed * delta;

        if jump {
            pose.position.y += self.jump_speed * delta;
        }
    }

    fn apply_look(&self, pose: &mut Pose, look_delta: Vec2, delta: f32) {
        if look_delta == Vec2::ZERO {
            return;
        }

        let yaw = -look_delta.x * self.look_sensitivity * delta;
        pose.body_rotation = (Quat::from_rotation_y(yaw) * pose.body_rotation).normalize();

        let (pitch, _, _) = pose.camera_rotation.to_euler(EulerRot::XYZ);
        let pitch = (pitch - look_delta.y * self.look_sensitivity * delta)
            .clamp(-self.max_pitch, self.max_pitch);
        pose.camera_rotation = Quat::from_rotation_x(pitch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::OwnerId;

    fn sample(move_axes: Vec2, look_delta: Vec2) -> InputSample {
        InputSample {
            look_delta,
            move_axes,
            jump: false,
            sprint: false,
            delta_time: 0.02,
            sequence_index: 0,
            owner_id: OwnerId(1),
        }
    }

    #[test]
    fn test_same_input_same_result() {
        let motion = CharacterMotion::default();
        let input = sample(Vec2::new(0.3, 1.0), Vec2::new(12.0, -4.0));
        let start = Pose::at(Vec3::new(3.0, 0.0, -1.0));

        let mut a = start;
        let mut b = start;
        motion.apply_input(&mut a, &input);
        motion.apply_input(&mut b, &input);

        assert_eq!(a, b);
    }

    #[test]
    fn test_forward_moves_along_negative_z() {
        let motion = CharacterMotion::default();
        let mut pose = Pose::default();
        motion.apply_input(&mut pose, &sample(Vec2::new(0.0, 1.0), Vec2::ZERO));

        assert!(pose.position.z < 0.0);
        assert!((pose.position.z + MOVE_SPEED * 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_sprint_and_jump() {
        let motion = CharacterMotion::default();
        let mut pose = Pose::default();
        motion.apply_movement(&mut pose, 0.1, Vec2::new(1.0, 0.0), true, true);

        assert!((pose.position.x - MOVE_SPEED * SPRINT_MULTIPLIER * 0.1).abs() < 1e-5);
        assert!((pose.position.y - JUMP_SPEED * 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_pitch_is_clamped() {
        let motion = CharacterMotion::default();
        let mut pose = Pose::default();
        for _ in 0..200 {
            motion.apply_look(&mut pose, Vec2::new(0.0, -500.0), 0.05);
        }

        let (pitch, _, _) = pose.camera_rotation.to_euler(EulerRot::XYZ);
        assert!(pitch <= MAX_PITCH + 1e-4);
    }

    #[test]
    fn test_motion_is_translation_invariant() {
        let motion = CharacterMotion::default();
        let input = sample(Vec2::new(1.0, 1.0), Vec2::new(5.0, 0.0));
        let offset = Vec3::new(10.0, 0.0, 5.0);

        let mut a = Pose::default();
        let mut b = Pose::at(offset);
        motion.apply_input(&mut a, &input);
        motion.apply_input(&mut b, &input);

        assert!((b.position - a.position).abs_diff_eq(offset, 1e-5));
        assert_eq!(a.body_rotation, b.body_rotation);
    }
}
