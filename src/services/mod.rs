//! Services: the stateful orchestration logic built on top of the domain
//! model and ports.

pub mod merge_serializer;
pub mod orchestrator;
pub mod reconciler;
pub mod scripted_driver;
pub mod state_store;

pub use merge_serializer::MergeSerializer;
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use reconciler::Reconciler;
pub use scripted_driver::{ScriptedDriver, ScriptedOutcome};
pub use state_store::StateStore;
