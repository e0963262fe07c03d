//! Tracing initialization

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "GAME_TELEMETRY_LOG";

/// Install a stderr subscriber filtered by `GAME_TELEMETRY_LOG`.
///
/// Format: `GAME_TELEMETRY_LOG=game_telemetry=debug,reqwest=warn`.
/// Falls back to `game_telemetry=info`. Does nothing when the host already
/// installed a global subscriber, and is safe to call more than once.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new("game_telemetry=info"));

        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .with(filter)
            .try_init();
    });
}
