//! Process-wide `tracing` subscriber setup.
//!
//! The library crates only emit events. Binaries and tests call
//! [`init`] once to print them.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the filter directive, e.g.
/// `SLUICE_LOG=sluice_engine=debug`.
pub const LOG_ENV: &str = "SLUICE_LOG";

/// Filter used when [`LOG_ENV`] is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install a formatted subscriber filtered by [`LOG_ENV`].
///
/// Idempotent. If another global subscriber is already installed it is
/// left in place.
pub fn init() {
    INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!(filter_env = LOG_ENV, "logging initialised");
        } else {
            tracing::debug!("global subscriber already set; keeping it");
        }
    });
}
