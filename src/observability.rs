//! # Observability
//!
//! Tracing subscriber setup. Logs go to stderr; stdout is reserved for the
//! resource state printed by the CLI.

use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::config::PipelineConfig;

/// Filter used when `RUST_LOG` is unset
fn default_filter(config: &PipelineConfig) -> String {
    format!("sops_gitops={}", config.log_level.to_lowercase())
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `LOG_LEVEL`. Returns `false` when a subscriber was
/// already installed (tests, embedding callers).
pub fn init_tracing(config: &PipelineConfig) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config).into());

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Tracing subscriber init returned error (may already be initialized): {}", e);
            false
        }
    }
}
