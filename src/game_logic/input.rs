use bevy::prelude::*;

/// One frame of raw intent from a control device.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawInput {
    pub look_delta: Vec2,
    pub move_axes: Vec2,
    pub jump: bool,
    pub sprint: bool,
}

impl RawInput {
    pub fn walk(move_axes: Vec2) -> Self {
        Self {
            move_axes,
            ..default()
        }
    }
}

/// Source of raw intent, polled once per client frame.
pub trait InputDevice {
    fn poll(&mut self, delta: f32) -> RawInput;
}

/// Plays a fixed list of intents in a loop. Used by bots and tests.
#[derive(Clone, Debug)]
pub struct ScriptedInput {
    script: Vec<RawInput>,
    cursor: usize,
}

impl ScriptedInput {
    pub fn new(script: Vec<RawInput>) -> Self {
        Self { script, cursor: 0 }
    }

    pub fn idle() -> Self {
        Self::new(Vec::new())
    }

    /// Walk forward while turning, so the bot traces a circle.
    pub fn circle(turn: f32) -> Self {
        Self::new(vec![RawInput {
            look_delta: Vec2::new(turn, 0.0),
            move_axes: Vec2::Y,
            ..default()
        }])
    }

    /// Strafe back and forth, sprinting and jumping on the return leg.
    pub fn zigzag(frames_per_leg: usize) -> Self {
        let mut script = vec![RawInput::walk(Vec2::X); frames_per_leg];
        script.extend(vec![
            RawInput {
                move_axes: Vec2::NEG_X,
                sprint: true,
                jump: true,
                ..default()
            };
            frames_per_leg
        ]);
        Self::new(script)
    }
}

impl InputDevice for ScriptedInput {
    fn poll(&mut self, _delta: f32) -> RawInput {
        if self.script.is_empty() {
            return RawInput::default();
        }

        let input = self.script[self.cursor];
        self.cursor = (self.cursor + 1) % self.script.len();
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_loops() {
        let mut device = ScriptedInput::zigzag(2);
        let polled: Vec<RawInput> = (0..5).map(|_| device.poll(0.016)).collect();

        assert_eq!(polled[0].move_axes, Vec2::X);
        assert_eq!(polled[2].move_axes, Vec2::NEG_X);
        assert!(polled[3].sprint);
        assert_eq!(polled[4], polled[0]);
    }

    #[test]
    fn test_idle_device_yields_default() {
        let mut device = ScriptedInput::idle();
        assert_eq!(device.poll(0.016), RawInput::default());
    }
}
