//! Client-side prediction, authoritative reconciliation and remote
//! interpolation for a multiplayer character controller.
//!
//! Clients move their own entity immediately and keep a history of inputs
//! and resulting poses. The authority simulates the same inputs on a fixed
//! tick and sends back what it computed; clients that predicted wrong snap to
//! the authoritative pose and replay newer inputs. Entities owned by other
//! clients are blended between the two most recent reduced states.

pub mod config;
pub mod error;
pub mod game_logic;
pub mod interpolation;
pub mod prediction;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tick;
pub mod transport;

pub use error::{Result, SyncError};
