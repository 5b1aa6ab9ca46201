//! Task-graph orchestrator and per-project merge serializer for an
//! AI-agent-driven code generation pipeline.
//!
//! This crate owns scheduling, retry, state persistence, and merge
//! mutual-exclusion; it never touches a filesystem, calls a language model,
//! parses a goal into tasks, or serves HTTP itself — those are the job of
//! the ports in [`ports`] and whatever binary wires concrete adapters to
//! them.

pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod ports;
pub mod services;

pub use error::{OrchestratorError, OrchestratorResult};
pub use services::{MergeSerializer, Orchestrator, OrchestratorSettings, Reconciler, StateStore};
