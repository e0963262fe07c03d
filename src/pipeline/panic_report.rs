//! Process-wide panic hook feeding critical error events to a pipeline

use std::any::Any;
use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::scheduler::{PushOutcome, Task, TaskQueue};
use crate::validation::MAX_LONG_STRING_LENGTH;

/// Panics reported per process; later ones only reach the previous hook
pub const MAX_PANIC_REPORTS: u32 = 5;

static TARGET: Lazy<Mutex<Weak<TaskQueue>>> = Lazy::new(|| Mutex::new(Weak::new()));
static REPORTED: AtomicU32 = AtomicU32::new(0);
static INSTALL: Once = Once::new();

/// Point the hook at `queue`, installing it on first use
pub(crate) fn install(queue: &Arc<TaskQueue>) {
    *TARGET.lock() = Arc::downgrade(queue);
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
            let thread = std::thread::current();
            let message = describe_panic(info.payload(), thread.name(), location.as_deref());
            report(message);
            previous(info);
        }));
    });
}

fn report(message: String) {
    // The panicking thread may hold the lock; skip rather than deadlock
    let Some(queue) = TARGET.try_lock().and_then(|target| target.upgrade()) else {
        return;
    };
    if REPORTED.fetch_add(1, Ordering::SeqCst) >= MAX_PANIC_REPORTS {
        return;
    }
    if queue.push(Task::ReportPanic(message)) == PushOutcome::Closed {
        REPORTED.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Error event message for a panic, cut to the long-string limit
fn describe_panic(
    payload: &(dyn Any + Send),
    thread: Option<&str>,
    location: Option<&str>,
) -> String {
    let reason = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("Box<dyn Any>");

    let mut message = format!(
        "Uncaught panic in thread '{}' at {}: {}\nStack trace:\n{}",
        thread.unwrap_or("<unnamed>"),
        location.unwrap_or("<unknown>"),
        reason,
        Backtrace::force_capture()
    );
    if let Some((cut, _)) = message.char_indices().nth(MAX_LONG_STRING_LENGTH) {
        message.truncate(cut);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_panic_reads_str_and_string_payloads() {
        let message = describe_panic(&"boom", Some("main"), Some("src/lib.rs:1:1"));
        assert!(message.starts_with("Uncaught panic in thread 'main' at src/lib.rs:1:1: boom\n"));

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        let message = describe_panic(owned.as_ref(), None, None);
        assert!(message.contains("'<unnamed>' at <unknown>: owned boom"));

        let opaque: Box<dyn Any + Send> = Box::new(42_u8);
        assert!(describe_panic(opaque.as_ref(), None, None).contains(": Box<dyn Any>"));
    }

    #[test]
    fn test_describe_panic_fits_long_string_limit() {
        let reason = "é".repeat(MAX_LONG_STRING_LENGTH + 10);
        let message = describe_panic(&reason, None, None);
        assert_eq!(message.chars().count(), MAX_LONG_STRING_LENGTH);
    }
}
