//! Telemetry probe - Binary Entry Point
//!
//! Starts a pipeline from the environment and emits one design event per
//! flush interval until interrupted. Useful for checking keys, endpoint and
//! on-disk queue behaviour without a game.
//!
//! Required: `GAME_TELEMETRY_KEY`, `GAME_TELEMETRY_SECRET`.
//! Optional: `GAME_TELEMETRY_ENDPOINT`, `GAME_TELEMETRY_DATA_DIR`,
//! `GAME_TELEMETRY_GZIP`, `GAME_TELEMETRY_LOG`.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use game_telemetry::logging::init_tracing;
use game_telemetry::{Pipeline, PipelineConfig, PipelineError, PipelineResult};

const TICK: Duration = Duration::from_secs(5);

fn main() -> PipelineResult<()> {
    init_tracing();

    let game_key = env::var("GAME_TELEMETRY_KEY")
        .map_err(|_| PipelineError::invalid("game_key", "GAME_TELEMETRY_KEY is not set"))?;
    let game_secret = env::var("GAME_TELEMETRY_SECRET")
        .map_err(|_| PipelineError::invalid("game_secret", "GAME_TELEMETRY_SECRET is not set"))?;

    let config = PipelineConfig::from_env()
        .with_keys(game_key, game_secret)
        .with_build(concat!("probe-", env!("CARGO_PKG_VERSION")));
    let pipeline = Pipeline::start(config)?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)) {
        error!(error = %e, "could not install Ctrl+C handler");
    }

    info!("probe running, press Ctrl+C to stop");
    let mut tick: u64 = 0;
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(TICK);
        if !running.load(Ordering::SeqCst) {
            break;
        }
        tick += 1;
        pipeline.add_design_event("probe:heartbeat", Some(tick as f64));
        if let Some(session_id) = pipeline.context().session_id() {
            info!(tick, session_id = %session_id, "heartbeat queued");
        }
    }

    let drained = pipeline.shutdown();
    info!(drained, "probe stopped");
    Ok(())
}
