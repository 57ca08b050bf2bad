//! Tracing subscriber setup for binaries and tests.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigError;
use crate::types::Result;

/// Installs a global `fmt` subscriber filtered by `directives`
/// (`RUST_LOG` syntax, e.g. `"itergraph=debug"`).
pub fn init_logging(directives: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(directives)
                .map_err(|e| ConfigError::Invalid(format!("invalid log filter: {e}")))?,
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| ConfigError::Invalid("logging already initialized".into()).into())
}
