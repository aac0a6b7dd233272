//! Async runtime support for the prefetch pipeline
//!
//! A dedicated Tokio runtime for synchronous callers and the broadcast
//! signal used to stop background producers.

pub mod executor;
pub mod shutdown;

pub use executor::{LoaderRuntime, RuntimeConfig};
pub use shutdown::ShutdownSignal;
