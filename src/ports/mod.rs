//! Ports: narrow async traits for every external collaborator the core
//! depends on. No port implementation lives in this crate beyond the
//! in-memory test fakes kept alongside each trait's tests and the scripted
//! driver in [`crate::services::scripted_driver`] — production adapters
//! (HTTP clients, Redis, an actual LM) are deliberately out of scope.

pub mod conflict;
pub mod context_engine;
pub mod driver;
pub mod event_sink;
pub mod kv_store;
pub mod llm;
pub mod runner;
pub mod workspace;

pub use conflict::{ConflictResolver, FixAgent};
pub use context_engine::ContextEngine;
pub use driver::{DriverResult, DriverTask, TaskDriver};
pub use event_sink::{EventSink, NullEventSink};
pub use kv_store::KeyValueStore;
pub use llm::ChatCompletionClient;
pub use runner::{RunOutcome, RunStatus, RunnerService};
pub use workspace::{MergeToMainResult, UpdateFromMainResult, WorkspaceService};
