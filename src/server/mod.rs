pub mod simulation;
pub mod types;

pub use simulation::*;
pub use types::*;
