mod error;
mod events;
mod runner;
mod state;
mod steps;

pub use error::ExecutionError;
pub use events::{EngineEvent, ExecutionProgress, ProgressStatus, RunStatus};
pub use runner::ExecutionEngine;
pub use state::{RunState, ScenarioCatalog};
