//! Tracing subscriber setup for binaries and tests embedding the engine.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Environment variable holding an `EnvFilter` directive string.
pub const LOG_ENV: &str = "GITIT_LOG";

/// Install a global fmt subscriber filtered by `GITIT_LOG` (default `info`).
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init() -> Result<(), TryInitError> {
    init_with_default(LevelFilter::INFO)
}

/// Like [`init`] with an explicit default level for when `GITIT_LOG` is unset.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_with_default(level: LevelFilter) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let fmt = fmt::layer()
        .with_target(true)
        .with_thread_names(false)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(fmt)
        .with(env_filter)
        .try_init()
}
