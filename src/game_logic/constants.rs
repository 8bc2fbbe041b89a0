// Network and simulation timing
pub const TICK_RATE_HZ: f32 = 25.0; // 40ms authority tick
pub const CLIENT_TIMESTEP: f32 = 1.0 / 60.0;

// History sizing: must stay well above the expected round trip in client frames
pub const HISTORY_CAPACITY: usize = 1024;
pub const MAX_ACTORS: usize = 64;

// Motion constants
pub const MOVE_SPEED: f32 = 5.0;
pub const SPRINT_MULTIPLIER: f32 = 1.6;
pub const JUMP_SPEED: f32 = 4.0;
pub const LOOK_SENSITIVITY: f32 = 0.12;
pub const MAX_PITCH: f32 = 1.45; // just under 90 degrees
