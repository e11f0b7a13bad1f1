//! Panic isolation for plugin calls.
//!
//! A panicking plugin must not take down the manager or a pipeline pass.
//! Calls are wrapped in `catch_unwind` and panics become
//! [`PluginError::Panic`]. This relies on the `unwind` panic strategy.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{PluginError, PluginResult};

/// Run `f`, converting a panic into an error.
pub fn guarded<T>(label: &str, f: impl FnOnce() -> T) -> PluginResult<T> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| {
        let message = panic_message(panic.as_ref());
        tracing::error!(plugin = label, message = %message, "Plugin panicked");
        PluginError::Panic(message)
    })
}

/// Run a fallible `f`, converting a panic into an error.
pub fn guarded_result<T>(label: &str, f: impl FnOnce() -> PluginResult<T>) -> PluginResult<T> {
    guarded(label, f).and_then(|result| result)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
