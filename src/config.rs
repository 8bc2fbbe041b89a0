use crate::error::{Result, SyncError};
use crate::game_logic::{
    CLIENT_TIMESTEP, HISTORY_CAPACITY, JUMP_SPEED, LOOK_SENSITIVITY, MAX_ACTORS, MAX_PITCH,
    MOVE_SPEED, SPRINT_MULTIPLIER, TICK_RATE_HZ,
};
use bevy::prelude::*;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Tuning shared by the motion model on both sides of the wire.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    pub move_speed: f32,
    pub sprint_multiplier: f32,
    pub jump_speed: f32,
    pub look_sensitivity: f32,
    pub max_pitch: f32,
}

impl Default for MotionSettings {
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

/// Simulated network conditions for the loopback transport.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoopbackSettings {
    /// One-way latency in seconds.
    pub latency: f32,
    /// Extra random delay in seconds, uniform in `[0, jitter]`.
    pub jitter: f32,
    pub seed: u64,
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self {
            latency: 0.05,
            jitter: 0.0,
            seed: 7,
        }
    }
}

/// Global settings for prediction, reconciliation and interpolation.
#[derive(Resource, Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub history_capacity: usize,
    pub tick_rate_hz: f32,
    pub client_timestep: f32,
    pub max_actors: usize,
    /// 0.0 means authoritative and predicted poses must match exactly.
    pub reconcile_tolerance: f32,
    pub motion: MotionSettings,
    pub loopback: LoopbackSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_capacity: HISTORY_CAPACITY,
            tick_rate_hz: TICK_RATE_HZ,
            client_timestep: CLIENT_TIMESTEP,
            max_actors: MAX_ACTORS,
            reconcile_tolerance: 0.0,
            motion: MotionSettings::default(),
            loopback: LoopbackSettings::default(),
        }
    }
}

impl SyncConfig {
    /// Load settings from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SyncError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SyncConfig =
            serde_json::from_str(&text).map_err(|source| SyncError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(SyncError::InvalidConfig(
                "history_capacity must be at least 1".into(),
            ));
        }
        if !(self.tick_rate_hz > 0.0) {
            return Err(SyncError::InvalidConfig(format!(
                "tick_rate_hz must be positive, got {}",
                self.tick_rate_hz
            )));
        }
        if !(self.client_timestep > 0.0) {
            return Err(SyncError::InvalidConfig(format!(
                "client_timestep must be positive, got {}",
                self.client_timestep
            )));
        }
        if self.reconcile_tolerance < 0.0 {
            return Err(SyncError::InvalidConfig(
                "reconcile_tolerance cannot be negative".into(),
            ));
        }
        if self.loopback.latency < 0.0 || self.loopback.jitter < 0.0 {
            return Err(SyncError::InvalidConfig(
                "loopback latency and jitter cannot be negative".into(),
            ));
        }

        // Rough round trip in client frames; history must outlive it.
        let round_trip = 2.0 * (self.loopback.latency + self.loopback.jitter) + self.tick_interval();
        let frames = (round_trip / self.client_timestep).ceil() as usize;
        if frames >= self.history_capacity {
            warn!(
                "history capacity {} does not cover a round trip of ~{} frames, corrections may be lost",
                self.history_capacity, frames
            );
        }

        Ok(())
    }

    /// Seconds between authority ticks.
    pub fn tick_interval(&self) -> f32 {
        1.0 / self.tick_rate_hz
    }
}
