//! Capture workflow: the per-attempt state machine and the orchestrator
//! that runs it over the camera, surface and submission layers.

mod orchestrator;
mod state;
#[cfg(test)]
mod tests;

pub use orchestrator::CaptureWorkflow;
pub use state::{transition, Trigger, WorkflowFailure, WorkflowState};
