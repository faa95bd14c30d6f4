//! Shared tracing setup for the Watchpost binaries.

pub mod tracing;

pub use self::tracing::init;
