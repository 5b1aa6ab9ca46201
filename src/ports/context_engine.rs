//! Context-engine port: retrieval over prior generations/codebases.
//!
//! Every call site treats failure as non-fatal: a context lookup that
//! errors simply yields no extra context, it never aborts the caller.

use async_trait::async_trait;

use crate::error::OrchestratorResult;

#[derive(Debug, Clone)]
pub struct ContextMatch {
    pub file_path: String,
    pub snippet: String,
    pub score: f32,
}

#[async_trait]
pub trait ContextEngine: Send + Sync {
    async fn query(&self, project_id: &str, query: &str, limit: usize) -> OrchestratorResult<Vec<ContextMatch>>;
}
