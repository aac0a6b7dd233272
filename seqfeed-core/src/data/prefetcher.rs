//! Background batch prefetching
//!
//! A producer drives a [`DataLoader`] on a blocking worker thread and pushes
//! steps into a bounded channel; the channel bound is the backpressure.

use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use super::loader::{DataLoader, Step};
use crate::error::{Result, SeqfeedError};
use crate::runtime::ShutdownSignal;

/// Producer half: owns the loader and fills the queue
pub struct Prefetcher {
    loader: DataLoader,
    sender: mpsc::Sender<Result<Step>>,
    shutdown: broadcast::Receiver<()>,
}

impl Prefetcher {
    pub fn new(
        loader: DataLoader,
        sender: mpsc::Sender<Result<Step>>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            loader,
            sender,
            shutdown,
        }
    }

    /// Run the producer loop on the current thread.
    ///
    /// Must not be called from an async context: sends block when the
    /// queue is full.
    pub fn run(mut self) {
        debug!(
            "Prefetcher starting at epoch {:.4}",
            self.loader.epoch_detail()
        );

        loop {
            if self.shutdown_requested() {
                debug!("Prefetcher: shutdown requested, stopping");
                let _ = self.sender.blocking_send(Err(SeqfeedError::ShutdownInProgress));
                break;
            }

            let Some(item) = self.loader.next_step() else {
                debug!("Prefetcher: loader exhausted");
                break;
            };

            let failed = item.is_err();
            if self.sender.blocking_send(item).is_err() {
                debug!("Prefetcher: consumer dropped, stopping");
                break;
            }
            if failed {
                warn!("Prefetcher: loader failed, stopping");
                break;
            }
        }

        self.loader.close();
    }

    fn shutdown_requested(&mut self) -> bool {
        match self.shutdown.try_recv() {
            Err(TryRecvError::Empty) => false,
            Ok(()) | Err(TryRecvError::Lagged(_)) | Err(TryRecvError::Closed) => true,
        }
    }
}

/// Consumer half: dequeues prefetched steps
pub struct PrefetchLoader {
    receiver: mpsc::Receiver<Result<Step>>,
    producer: Option<JoinHandle<()>>,
    runtime: Handle,
    signal: ShutdownSignal,
    epoch_detail: f64,
}

impl PrefetchLoader {
    /// Start prefetching on `runtime`'s blocking pool
    pub fn spawn(loader: DataLoader, runtime: &Handle) -> Self {
        let queue_size = loader.config().prefetch.queue_size.max(1);
        let epoch_detail = loader.epoch_detail();
        let (sender, receiver) = mpsc::channel(queue_size);
        let signal = ShutdownSignal::new();

        let prefetcher = Prefetcher::new(loader, sender, signal.subscribe());
        let producer = runtime.spawn_blocking(move || prefetcher.run());

        debug!("Prefetch queue started with capacity {}", queue_size);

        Self {
            receiver,
            producer: Some(producer),
            runtime: runtime.clone(),
            signal,
            epoch_detail,
        }
    }

    /// Start prefetching on the ambient runtime.
    ///
    /// Panics outside a tokio runtime, like `tokio::spawn`.
    pub fn start(loader: DataLoader) -> Self {
        Self::spawn(loader, &Handle::current())
    }

    /// Next prefetched step, waiting while the queue is empty
    pub async fn next_step(&mut self) -> Option<Result<Step>> {
        match self.receiver.recv().await {
            Some(item) => Some(self.observe(item)),
            None => {
                let producer = self.producer.take()?;
                producer_outcome(producer.await)
            }
        }
    }

    /// Blocking variant of [`next_step`](Self::next_step) for synchronous
    /// callers outside the runtime
    pub fn blocking_next(&mut self) -> Option<Result<Step>> {
        match self.receiver.blocking_recv() {
            Some(item) => Some(self.observe(item)),
            None => {
                let producer = self.producer.take()?;
                producer_outcome(self.runtime.block_on(producer))
            }
        }
    }

    /// Progress of the last dequeued step
    pub fn epoch_detail(&self) -> f64 {
        self.epoch_detail
    }

    /// Signal that stops the producer at its next batch boundary
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Stop the producer, discard queued steps and join the worker
    pub async fn shutdown(mut self) -> Result<()> {
        self.begin_shutdown();
        while self.receiver.recv().await.is_some() {}
        match self.producer.take() {
            Some(producer) => join_result(producer.await),
            None => Ok(()),
        }
    }

    /// Blocking variant of [`shutdown`](Self::shutdown)
    pub fn blocking_shutdown(mut self) -> Result<()> {
        self.begin_shutdown();
        while self.receiver.blocking_recv().is_some() {}
        match self.producer.take() {
            Some(producer) => join_result(self.runtime.block_on(producer)),
            None => Ok(()),
        }
    }

    fn begin_shutdown(&mut self) {
        debug!("Shutting down prefetch queue at epoch {:.4}", self.epoch_detail);
        self.signal.shutdown();
        self.receiver.close();
    }

    fn observe(&mut self, item: Result<Step>) -> Result<Step> {
        if let Ok(step) = &item {
            self.epoch_detail = step.epoch_detail;
        }
        item
    }
}

impl Drop for PrefetchLoader {
    fn drop(&mut self) {
        self.signal.shutdown();
        self.receiver.close();
    }
}

fn join_result(joined: std::result::Result<(), JoinError>) -> Result<()> {
    joined.map_err(|e| SeqfeedError::ProducerFailed {
        reason: e.to_string(),
    })
}

fn producer_outcome(joined: std::result::Result<(), JoinError>) -> Option<Result<Step>> {
    join_result(joined).err().map(Err)
}
