pub mod components;
pub mod constants;
pub mod input;
pub mod physics;

pub use components::*;
pub use constants::*;
pub use input::*;
pub use physics::*;
