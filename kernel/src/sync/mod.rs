//! Synchronization primitives shared across subsystems.

pub mod once_lock;

pub use once_lock::{GlobalState, LazyLock, OnceLock};
