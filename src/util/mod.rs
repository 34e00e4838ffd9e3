//! Utility modules: reconnect jitter, timeout.

pub mod jitter;
pub mod timeout;

pub use jitter::jittered;
pub use timeout::with_timeout;
