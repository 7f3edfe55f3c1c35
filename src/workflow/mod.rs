pub mod checkpoint;
pub mod orchestrator;
pub mod retry;
pub mod stages;
pub mod state;
pub mod validate;

pub use orchestrator::{Orchestrator, RunOutcome};
