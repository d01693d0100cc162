//! Pipeline execution engine

pub mod cancel;
pub mod engine;
pub mod retry;
pub mod stage_runner;

pub use cancel::CancelSignal;
pub use engine::Engine;
pub use retry::with_retry;
