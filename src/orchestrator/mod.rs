pub mod machine;
pub mod state;

pub use machine::PipelineOrchestrator;
pub use state::{DeveloperProfile, PipelineState, StateManager};
