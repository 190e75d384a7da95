pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod policy;
pub mod readiness;
pub mod server;

// Debug-build printing helper for low-level bookkeeping traces.
// Usage: tprintln!("session.issue user={}", id);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
