//! Logging macros that vanish without the `tracing` feature.
//!
//! ```bash
//! # default build: no logging code is emitted
//! cargo build --release
//!
//! # structural operations logged at debug, payload-lock contention at trace
//! RUST_LOG=rbindex=trace cargo test --features tracing
//! ```

#![allow(unused_macros, unused_imports)]

/// Per-operation detail (lock contention, drains). No-op without `tracing`.
#[cfg(feature = "tracing")]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

/// Structural changes (insert, replace, remove, teardown). No-op without `tracing`.
#[cfg(feature = "tracing")]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

pub(crate) use debug_log;
pub(crate) use trace_log;
