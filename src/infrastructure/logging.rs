//! Structured logging init, trimmed from `infrastructure/logging/logger.rs`:
//! stdout-only `tracing-subscriber` with an `EnvFilter`, no file rotation
//! and no secret-scrubbing layer — this crate never sees LM prompts or
//! credentials directly, so those concerns belong to the binaries that
//! wire in real collaborators.

use tracing_subscriber::{fmt, EnvFilter};

use crate::infrastructure::config::OrchestratorConfig;

/// Initializes the global tracing subscriber. Safe to call once per
/// process; a second call is a no-op (the underlying `try_init` just
/// returns an error that we ignore).
pub fn init(config: &OrchestratorConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    let result = if config.log_format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}
