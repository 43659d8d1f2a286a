//! Graceful interruption of a running sync
//!
//! SIGINT/SIGTERM raise a process-wide flag; the engine checks it after each
//! committed window, so an interrupt never loses more than the window in
//! flight. A second signal exits at once.

use std::sync::atomic::{AtomicBool, Ordering};

/// Exit status for an interrupted run (128 + SIGINT)
pub const EXIT_INTERRUPTED: u8 = 130;

/// Global shutdown flag, set by the signal handlers
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Clear a previous request (embedders running several syncs in one process)
pub fn reset_shutdown() {
    shutdown_flag().store(false, Ordering::Relaxed);
}

/// Route SIGINT and SIGTERM to the shutdown flag.
///
/// First signal: finish and commit the current window, then stop.
/// Second signal: exit immediately with [`EXIT_INTERRUPTED`].
pub fn install_signal_handlers() -> std::io::Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        // SAFETY: the handler only swaps an atomic and calls `_exit`, both
        // async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    signal_hook::low_level::exit(i32::from(EXIT_INTERRUPTED));
                }
            })?;
        }
    }
    log::debug!("Signal handlers installed");
    Ok(())
}
