//! Logging setup utilities for CONSIA binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The default filter covers the server library crate, this crate and the
/// binary itself. `RUST_LOG` replaces it entirely when set.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "consia_server")
/// * `default_log_level` - The default log level (e.g., "debug", "info")
///
/// # Examples
///
/// ```no_run
/// use consia_shared::logger::setup_logger;
///
/// setup_logger("consia_server", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    let binary_target = binary_name.replace('-', "_");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "consia_server={level},{shared}={level},{binary}={level},tower_http=info",
                    level = default_log_level,
                    shared = env!("CARGO_PKG_NAME").replace('-', "_"),
                    binary = binary_target,
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
}
