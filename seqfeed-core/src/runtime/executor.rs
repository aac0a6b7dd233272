//! Tokio runtime for synchronous callers
//!
//! Hosts prefetch producers for training loops that are not themselves
//! async. Batch assembly runs on the runtime's blocking pool, so the
//! async worker count stays small.

use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};

use crate::data::{DataLoader, PrefetchLoader};
use crate::error::{Result, SeqfeedError};

/// Configuration for the loader runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Async worker threads
    pub worker_threads: usize,
    /// Upper bound on blocking threads (one per active producer)
    pub max_blocking_threads: usize,
    /// Thread name prefix
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            worker_threads: (cpus / 2).max(2),
            max_blocking_threads: cpus.max(4),
            thread_name: "seqfeed-loader".into(),
        }
    }
}

/// Dedicated runtime owning prefetch producers
pub struct LoaderRuntime {
    runtime: Runtime,
    config: RuntimeConfig,
}

impl LoaderRuntime {
    /// Create a new runtime with the given configuration
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.max_blocking_threads)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| SeqfeedError::Internal {
                message: format!("Failed to create loader runtime: {}", e),
            })?;

        Ok(Self { runtime, config })
    }

    /// Start prefetching `loader` on this runtime
    pub fn prefetch(&self, loader: DataLoader) -> PrefetchLoader {
        PrefetchLoader::spawn(loader, &self.handle())
    }

    /// Run a future, blocking until complete
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Get the runtime handle
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Shut down, giving blocked producers time to observe their signal
    pub fn shutdown(self) {
        self.runtime.shutdown_timeout(Duration::from_secs(30));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_creation() {
        let config = RuntimeConfig {
            worker_threads: 2,
            ..RuntimeConfig::default()
        };
        let runtime = LoaderRuntime::new(config).unwrap();

        assert_eq!(runtime.config().worker_threads, 2);

        let task = runtime.handle().spawn(async { 40 + 2 });
        let result = runtime.block_on(task).unwrap();

        assert_eq!(result, 42);
        runtime.shutdown();
    }
}
