//! Utility functions and helpers
//!
//! Timestamps and crash-safe file writes.

pub mod atomic;
pub mod time;

pub use atomic::{atomic_write, atomic_write_with, cleanup_temp_files};
pub use time::{adjusted_timestamp, current_timestamp, server_time_offset};
