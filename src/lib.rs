//! Game Telemetry
//!
//! An embeddable analytics client for games. Events are validated on the
//! caller's thread, annotated with session context, kept in a durable
//! on-disk queue and shipped to a collector in signed, gzip-compressed
//! batches by a single background worker.
//!
//! # Features
//!
//! - **Validation**: Business, resource, progression, design and error events
//! - **Durable**: Append-only journal survives crashes and restarts
//! - **Ordered**: One worker executes every task in submission order
//! - **Authenticated**: HMAC-SHA256 signed requests with optional gzip
//! - **Self-reporting**: Rate-limited `sdk_error` events for internal failures
//!
//! # Modules
//!
//! - `types`: Event model, custom fields, queued records, error taxonomy
//! - `validation`: Stateless rule checks
//! - `event_store`: Bounded persistent queue of annotated events
//! - `context`: Session state machine and persisted identity
//! - `transport`: Collector trait and HTTP implementation
//! - `scheduler`: Task queue and the worker loop
//! - `pipeline`: Public facade tying it all together
//! - `config`: Settings and environment overrides
//!
//! # Example
//!
//! ```no_run
//! use game_telemetry::{Pipeline, PipelineConfig};
//!
//! fn main() -> game_telemetry::PipelineResult<()> {
//!     game_telemetry::logging::init_tracing();
//!
//!     let config = PipelineConfig::new("gamekey123", "secret456")
//!         .with_data_dir("./telemetry")
//!         .with_build("1.0.0");
//!     let pipeline = Pipeline::start(config)?;
//!
//!     pipeline.add_design_event("tutorial:step:1", None);
//!     pipeline.add_business_event("USD", 99, "gems", "starter_pack", Some("shop"));
//!     pipeline.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod event_store;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod transport;
pub mod types;
pub mod utils;
pub mod validation;

// Re-export commonly used items at crate root
pub use config::{DeviceInfo, PipelineConfig};
pub use context::{ContextHandle, SessionState};
pub use error::{PipelineError, PipelineResult};
pub use event_store::{EventStore, StoreError, StoreStats};
pub use pipeline::{Pipeline, RemoteConfigsListener, SessionHooks};
pub use transport::{Collector, HttpCollector, HttpResponseKind};
pub use types::{
    CustomFields, CustomValue, DimensionSlot, ErrorSeverity, FlowType, GameEvent,
    ProgressionStatus, SdkError, StoreLimits,
};
pub use validation::ProgressionOrderPolicy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
