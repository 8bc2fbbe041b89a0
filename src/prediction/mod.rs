// Client-side prediction with authoritative reconciliation
//
// 1. Client predicts its own movement locally for instant feedback
// 2. Every input and resulting pose is kept in a fixed-size history
// 3. The authority stays in charge and reports the pose it computed per tick
// 4. On mismatch the client restarts from that pose and replays newer inputs

pub mod client_prediction;
pub mod history_buffer;
pub mod reconciliation;
pub mod state_snapshot;

pub use client_prediction::{LocalPredictor, PredictionStats};
pub use history_buffer::HistoryBuffer;
pub use reconciliation::{Reconciliation, ReconciliationEngine};
pub use state_snapshot::StateSnapshot;
