//! Tracing initialization and configuration.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Filter used when `MODELWATCH_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str =
    "modelwatch_core=info,modelwatch_storage=info,modelwatch_datamart=info";

/// Initialize the Modelwatch tracing/logging system.
///
/// Reads the `MODELWATCH_LOG` environment variable for per-crate log levels.
/// Format: `MODELWATCH_LOG=modelwatch_datamart=debug,modelwatch_storage=warn`
///
/// Idempotent; later calls do nothing.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("MODELWATCH_LOG")
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        // A subscriber may already be installed by the host process.
        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter)
            .try_init();
    });
}
